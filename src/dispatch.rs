//! Envelope dispatch: OTLP envelopes in, session mutations out.
//!
//! For each record the handler merges resource attributes under the
//! record's own, resolves the session key, obtains the session from the
//! registry, and hands the record to the mappers. The whole path is
//! synchronous and never waits on backend delivery.

use crate::{
    mapper::{self, event, metric},
    otlp::{AttrBag, LogsEnvelope, MetricsEnvelope},
    session::{now_ns, registry::SessionRegistry},
};

/// Apply a logs envelope to the session registry.
pub fn dispatch_logs(registry: &SessionRegistry, envelope: &LogsEnvelope) {
    for resource in &envelope.resource_logs {
        let resource_attrs = resource
            .resource
            .as_ref()
            .map(|r| AttrBag::decode(&r.attributes))
            .unwrap_or_default();

        for scope in &resource.scope_logs {
            for record in &scope.log_records {
                let mut attrs = AttrBag::decode(&record.attributes);
                attrs.merge_under(&resource_attrs);

                let timestamp_ns = mapper::resolve_timestamp_ns(&attrs, record.time_unix_nano);
                let Some(key) = resolve_session_key(&attrs, timestamp_ns) else {
                    tracing::debug!("Skipping log record with no session key");
                    continue;
                };

                let session = registry.get_or_create(&key, &attrs);
                let mut session = session.lock();
                match record.body_str() {
                    Some(body) => {
                        if let Some(evt) = event::classify(body, timestamp_ns, &attrs) {
                            session.ingest_event(evt, &attrs, registry.sink().as_ref());
                        }
                    }
                    None => tracing::debug!(session = %key, "Log record has no string body"),
                }
                session.touch(now_ns());
            }
        }
    }
}

/// Apply a metrics envelope to the session registry.
pub fn dispatch_metrics(registry: &SessionRegistry, envelope: &MetricsEnvelope) {
    for resource in &envelope.resource_metrics {
        let resource_attrs = resource
            .resource
            .as_ref()
            .map(|r| AttrBag::decode(&r.attributes))
            .unwrap_or_default();

        for scope in &resource.scope_metrics {
            for metric_record in &scope.metrics {
                for point in metric_record.data_points() {
                    let mut attrs = AttrBag::decode(&point.attributes);
                    attrs.merge_under(&resource_attrs);

                    let timestamp_ns = mapper::resolve_timestamp_ns(&attrs, point.time_unix_nano);
                    let Some(key) = resolve_session_key(&attrs, timestamp_ns) else {
                        tracing::debug!(
                            metric = %metric_record.name,
                            "Skipping datapoint with no session key"
                        );
                        continue;
                    };

                    let session = registry.get_or_create(&key, &attrs);
                    let mut session = session.lock();
                    if let Some(sample) =
                        metric::classify(&metric_record.name, point.value(), timestamp_ns, &attrs)
                    {
                        session.ingest_metric(sample, &attrs, registry.sink().as_ref());
                    }
                    session.touch(now_ns());
                }
            }
        }
    }
}

/// Derive the session key for a record.
///
/// `session.id` wins when present; otherwise records fall back to the
/// sanitized user email suffixed with the UTC hour of the record, so
/// un-keyed telemetry from one user still groups into hourly sessions.
/// Records with neither attribute have no key and are skipped.
pub fn resolve_session_key(attrs: &AttrBag, timestamp_ns: u64) -> Option<String> {
    if let Some(id) = attrs.get_str("session.id").filter(|s| !s.is_empty()) {
        return Some(id.to_string());
    }

    let email = attrs.get_str("user.email").filter(|s| !s.is_empty())?;
    Some(format!(
        "{}-{}",
        sanitize_key_part(email),
        iso_hour(timestamp_ns)
    ))
}

/// Replace every character outside `[A-Za-z0-9-]` with `-`.
fn sanitize_key_part(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

fn iso_hour(timestamp_ns: u64) -> String {
    mapper::nanos_to_datetime(timestamp_ns)
        .format("%Y-%m-%dT%H")
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::langfuse::{TelemetrySink, testing::RecordingSink};
    use crate::otlp::KeyValue;

    fn registry_with_sink() -> (Arc<RecordingSink>, SessionRegistry) {
        let sink = Arc::new(RecordingSink::new());
        let registry = SessionRegistry::new(
            Arc::clone(&sink) as Arc<dyn TelemetrySink>,
            Duration::from_secs(3600),
        );
        (sink, registry)
    }

    fn bag(json: &str) -> AttrBag {
        let attrs: Vec<KeyValue> = serde_json::from_str(json).unwrap();
        AttrBag::decode(&attrs)
    }

    #[test]
    fn session_key_prefers_session_id() {
        let attrs = bag(
            r#"[
                {"key":"session.id","value":{"stringValue":"s1"}},
                {"key":"user.email","value":{"stringValue":"a.b@x.com"}}
            ]"#,
        );
        assert_eq!(resolve_session_key(&attrs, 0).as_deref(), Some("s1"));
    }

    #[test]
    fn session_key_falls_back_to_email_and_hour() {
        // 2024-01-15T10:30:45.123Z
        let ts = 1_705_314_645_123_000_000;
        let attrs = bag(r#"[{"key":"user.email","value":{"stringValue":"a.b@x.com"}}]"#);
        assert_eq!(
            resolve_session_key(&attrs, ts).as_deref(),
            Some("a-b-x-com-2024-01-15T10")
        );
    }

    #[test]
    fn session_key_absent_without_id_or_email() {
        assert!(resolve_session_key(&AttrBag::default(), 0).is_none());
    }

    #[test]
    fn keyless_records_leave_the_registry_untouched() {
        let (sink, registry) = registry_with_sink();
        let envelope: LogsEnvelope = serde_json::from_str(
            r#"{"resourceLogs":[{"scopeLogs":[{"logRecords":[{
                "timeUnixNano":"1",
                "body":{"stringValue":"claude_code.user_prompt"},
                "attributes":[{"key":"prompt_length","value":{"intValue":1}}]
            }]}]}]}"#,
        )
        .unwrap();

        dispatch_logs(&registry, &envelope);

        assert_eq!(registry.len(), 0);
        assert!(sink.calls().is_empty());
    }

    #[test]
    fn resource_level_session_id_applies_to_records() {
        let (sink, registry) = registry_with_sink();
        let envelope: LogsEnvelope = serde_json::from_str(
            r#"{"resourceLogs":[{
                "resource":{"attributes":[{"key":"session.id","value":{"stringValue":"res-1"}}]},
                "scopeLogs":[{"logRecords":[{
                    "timeUnixNano":"1",
                    "body":{"stringValue":"claude_code.user_prompt"},
                    "attributes":[
                        {"key":"prompt","value":{"stringValue":"hello"}},
                        {"key":"prompt_length","value":{"intValue":5}}
                    ]
                }]}]
            }]}"#,
        )
        .unwrap();

        dispatch_logs(&registry, &envelope);

        assert_eq!(registry.len(), 1);
        let traces = sink.traces();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].1.session_id, "res-1");
    }

    #[test]
    fn unknown_bodies_still_create_and_touch_the_session() {
        let (sink, registry) = registry_with_sink();
        let envelope: LogsEnvelope = serde_json::from_str(
            r#"{"resourceLogs":[{"scopeLogs":[{"logRecords":[{
                "timeUnixNano":"1",
                "body":{"stringValue":"claude_code.something_new"},
                "attributes":[{"key":"session.id","value":{"stringValue":"s1"}}]
            }]}]}]}"#,
        )
        .unwrap();

        dispatch_logs(&registry, &envelope);

        assert_eq!(registry.len(), 1);
        assert!(sink.calls().is_empty());
    }

    #[test]
    fn metric_datapoints_mutate_their_sessions() {
        let (_, registry) = registry_with_sink();
        let envelope: MetricsEnvelope = serde_json::from_str(
            r#"{"resourceMetrics":[{"scopeMetrics":[{"metrics":[{
                "name":"claude_code.token.usage",
                "sum":{"dataPoints":[
                    {
                        "timeUnixNano":"1",
                        "asInt":"100",
                        "attributes":[
                            {"key":"session.id","value":{"stringValue":"s1"}},
                            {"key":"type","value":{"stringValue":"input"}},
                            {"key":"model","value":{"stringValue":"m"}}
                        ]
                    },
                    {
                        "timeUnixNano":"2",
                        "asInt":"40",
                        "attributes":[
                            {"key":"session.id","value":{"stringValue":"s1"}},
                            {"key":"type","value":{"stringValue":"output"}},
                            {"key":"model","value":{"stringValue":"m"}}
                        ]
                    }
                ]}
            }]}]}]}"#,
        )
        .unwrap();

        dispatch_metrics(&registry, &envelope);

        let session = registry.get_or_create("s1", &AttrBag::default());
        let tokens = session.lock().tokens();
        assert_eq!(tokens.input, 100);
        assert_eq!(tokens.output, 40);
    }
}
