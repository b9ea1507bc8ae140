//! Metric-datapoint classification into domain samples.
//!
//! Each recognized metric name maps to one [`SampleKind`]; unknown names
//! and unrecognized dispatch attributes (token `type`, line-change
//! `type`) are ignored at debug.

use crate::otlp::AttrBag;

/// A classified metric datapoint.
#[derive(Debug, Clone)]
pub struct MetricSample {
    pub timestamp_ns: u64,
    pub kind: SampleKind,
}

#[derive(Debug, Clone)]
pub enum SampleKind {
    /// USD cost increment for one model.
    Cost { model: String, usd: f64 },
    /// Token-count increment, dispatched by the `type` attribute.
    Tokens {
        model: String,
        kind: TokenKind,
        count: f64,
    },
    /// Lines-of-code change.
    Lines { change: LineChange, count: f64 },
    /// Commit counter increment.
    Commits { count: f64 },
    /// Pull-request counter increment; the client emits two aliases.
    PullRequests { name: PrCounterName, count: f64 },
    /// Session start marker; the value carries no information.
    SessionStart,
    /// Total active time in seconds, reported as an absolute value.
    ActiveTime { seconds: f64 },
    /// Accept/reject decision on a code-edit tool.
    CodeEditDecision {
        tool: String,
        decision: String,
        language: String,
        count: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Input,
    Output,
    CacheRead,
    CacheCreation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineChange {
    Added,
    Removed,
}

/// Which of the two pull-request metric aliases produced a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrCounterName {
    Pr,
    PullRequest,
}

/// Classify one datapoint of a named metric.
pub fn classify(
    metric_name: &str,
    value: f64,
    timestamp_ns: u64,
    attrs: &AttrBag,
) -> Option<MetricSample> {
    let kind = match metric_name {
        "claude_code.cost.usage" => SampleKind::Cost {
            model: attrs.str_or_unknown("model"),
            usd: value,
        },
        "claude_code.token.usage" => {
            let kind = match attrs.get_str("type") {
                Some("input") => TokenKind::Input,
                Some("output") => TokenKind::Output,
                Some("cacheRead") => TokenKind::CacheRead,
                Some("cacheCreation") => TokenKind::CacheCreation,
                other => {
                    tracing::debug!(token_type = ?other, "Ignoring token metric with unknown type");
                    return None;
                }
            };
            SampleKind::Tokens {
                model: attrs.str_or_unknown("model"),
                kind,
                count: value,
            }
        }
        "claude_code.lines_of_code.count" => {
            let change = match attrs.get_str("type") {
                Some("added") => LineChange::Added,
                Some("removed") => LineChange::Removed,
                other => {
                    tracing::debug!(change_type = ?other, "Ignoring line-count metric with unknown type");
                    return None;
                }
            };
            SampleKind::Lines {
                change,
                count: value,
            }
        }
        "claude_code.commit.count" => SampleKind::Commits { count: value },
        "claude_code.pr.count" => SampleKind::PullRequests {
            name: PrCounterName::Pr,
            count: value,
        },
        "claude_code.pull_request.count" => SampleKind::PullRequests {
            name: PrCounterName::PullRequest,
            count: value,
        },
        "claude_code.session.count" => SampleKind::SessionStart,
        "claude_code.active_time.total" => SampleKind::ActiveTime { seconds: value },
        "claude_code.code_edit_tool.decision" => SampleKind::CodeEditDecision {
            tool: attrs.str_or_unknown("tool"),
            decision: attrs.str_or_unknown("decision"),
            language: attrs.str_or_unknown("language"),
            count: value,
        },
        other => {
            tracing::debug!(metric = other, "Ignoring unrecognized metric");
            return None;
        }
    };

    Some(MetricSample { timestamp_ns, kind })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::otlp::KeyValue;

    fn bag(json: &str) -> AttrBag {
        let attrs: Vec<KeyValue> = serde_json::from_str(json).unwrap();
        AttrBag::decode(&attrs)
    }

    #[test]
    fn classifies_cost() {
        let attrs = bag(r#"[{"key":"model","value":{"stringValue":"m-opus"}}]"#);
        let sample = classify("claude_code.cost.usage", 0.25, 9, &attrs).unwrap();
        assert_eq!(sample.timestamp_ns, 9);
        match sample.kind {
            SampleKind::Cost { model, usd } => {
                assert_eq!(model, "m-opus");
                assert_eq!(usd, 0.25);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[rstest]
    #[case("input", TokenKind::Input)]
    #[case("output", TokenKind::Output)]
    #[case("cacheRead", TokenKind::CacheRead)]
    #[case("cacheCreation", TokenKind::CacheCreation)]
    fn classifies_token_types(#[case] attr: &str, #[case] expected: TokenKind) {
        let attrs = bag(&format!(
            r#"[{{"key":"type","value":{{"stringValue":"{attr}"}}}}]"#
        ));
        let sample = classify("claude_code.token.usage", 100.0, 1, &attrs).unwrap();
        match sample.kind {
            SampleKind::Tokens { kind, count, .. } => {
                assert_eq!(kind, expected);
                assert_eq!(count, 100.0);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn unknown_token_type_is_ignored() {
        let attrs = bag(r#"[{"key":"type","value":{"stringValue":"reasoning"}}]"#);
        assert!(classify("claude_code.token.usage", 1.0, 1, &attrs).is_none());
    }

    #[rstest]
    #[case("added", LineChange::Added)]
    #[case("removed", LineChange::Removed)]
    fn classifies_line_changes(#[case] attr: &str, #[case] expected: LineChange) {
        let attrs = bag(&format!(
            r#"[{{"key":"type","value":{{"stringValue":"{attr}"}}}}]"#
        ));
        let sample = classify("claude_code.lines_of_code.count", 4.0, 1, &attrs).unwrap();
        match sample.kind {
            SampleKind::Lines { change, count } => {
                assert_eq!(change, expected);
                assert_eq!(count, 4.0);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[rstest]
    #[case("claude_code.pr.count", PrCounterName::Pr)]
    #[case("claude_code.pull_request.count", PrCounterName::PullRequest)]
    fn both_pull_request_aliases_map_identically(
        #[case] metric: &str,
        #[case] expected: PrCounterName,
    ) {
        let sample = classify(metric, 1.0, 1, &AttrBag::default()).unwrap();
        match sample.kind {
            SampleKind::PullRequests { name, count } => {
                assert_eq!(name, expected);
                assert_eq!(count, 1.0);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn classifies_code_edit_decision() {
        let attrs = bag(
            r#"[
                {"key":"tool","value":{"stringValue":"Edit"}},
                {"key":"decision","value":{"stringValue":"reject"}},
                {"key":"language","value":{"stringValue":"rust"}}
            ]"#,
        );
        let sample = classify("claude_code.code_edit_tool.decision", 1.0, 1, &attrs).unwrap();
        match sample.kind {
            SampleKind::CodeEditDecision {
                tool,
                decision,
                language,
                count,
            } => {
                assert_eq!(tool, "Edit");
                assert_eq!(decision, "reject");
                assert_eq!(language, "rust");
                assert_eq!(count, 1.0);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn unknown_metric_is_ignored() {
        assert!(classify("claude_code.memory.usage", 1.0, 1, &AttrBag::default()).is_none());
    }
}
