//! Per-session aggregation state and conversation lifecycle.
//!
//! A [`Session`] owns every piece of mutable state for one session key:
//! identity attributes, running aggregates, the current conversation
//! trace, and the finalization flag. All mutation happens under the
//! session's own lock (owned by the registry) and never awaits; backend
//! emission is a fire-and-forget enqueue on the sink.
//!
//! Conversations are bounded by user prompts: each prompt opens a new
//! backend trace (`conversation-<N>`) which stays current until the next
//! prompt or finalization. A trace is never explicitly closed on the
//! backend.

pub mod registry;
pub mod scoring;

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::{
    langfuse::{
        EventDraft, GenerationDraft, ObservationLevel, ScoreDraft, TelemetrySink, TokenUsage,
        TraceDraft, TraceHandle,
    },
    mapper::{
        ApiRequest, ClientEvent, EventKind, LineChange, MetricSample, PrCounterName, SampleKind,
        TokenKind, nanos_to_datetime,
    },
    otlp::AttrBag,
};

/// Window within which an event-recorded cost suppresses a cost metric
/// for the same model, and within which the two pull-request metric
/// aliases are considered duplicates.
const COST_DEDUP_WINDOW_NS: u64 = 2_000_000_000;

/// Current wall clock in Unix nanoseconds.
pub(crate) fn now_ns() -> u64 {
    Utc::now().timestamp_nanos_opt().map(|n| n.max(0) as u64).unwrap_or(0)
}

/// Identity attributes, populated first-write-wins from ingested records.
#[derive(Debug, Clone, Default)]
pub struct SessionIdentity {
    pub organization_id: Option<String>,
    pub user_account_uuid: Option<String>,
    pub user_email: Option<String>,
    pub terminal_type: Option<String>,
    pub app_version: Option<String>,
}

impl SessionIdentity {
    /// Fill unset fields from an attribute bag. Conflicting values for
    /// already-set fields are ignored and logged at debug.
    fn absorb(&mut self, attrs: &AttrBag) {
        Self::first_write(&mut self.organization_id, attrs, "organization.id");
        Self::first_write(&mut self.user_account_uuid, attrs, "user.account_uuid");
        Self::first_write(&mut self.user_email, attrs, "user.email");
        Self::first_write(&mut self.terminal_type, attrs, "terminal.type");
        Self::first_write(&mut self.app_version, attrs, "app.version");
    }

    fn first_write(slot: &mut Option<String>, attrs: &AttrBag, key: &str) {
        let Some(incoming) = attrs.get_str(key).filter(|s| !s.is_empty()) else {
            return;
        };
        match slot {
            None => *slot = Some(incoming.to_string()),
            Some(existing) if existing != incoming => {
                tracing::debug!(
                    attribute = key,
                    existing = %existing,
                    incoming = %incoming,
                    "Ignoring conflicting identity attribute"
                );
            }
            Some(_) => {}
        }
    }

    fn metadata(&self) -> serde_json::Value {
        json!({
            "organizationId": self.organization_id,
            "userAccountUuid": self.user_account_uuid,
            "userEmail": self.user_email,
            "terminalType": self.terminal_type,
            "appVersion": self.app_version,
        })
    }
}

/// Monotonic token counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenTotals {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_creation: u64,
}

impl TokenTotals {
    pub fn total(&self) -> u64 {
        self.input + self.output + self.cache_read + self.cache_creation
    }

    fn add(&mut self, kind: TokenKind, count: u64) {
        match kind {
            TokenKind::Input => self.input += count,
            TokenKind::Output => self.output += count,
            TokenKind::CacheRead => self.cache_read += count,
            TokenKind::CacheCreation => self.cache_creation += count,
        }
    }
}

/// Per-model usage rollup.
#[derive(Debug, Clone, Default)]
pub struct ModelUsage {
    pub tokens: TokenTotals,
    pub cost_usd: f64,
}

/// One tool decision, from either the log-event or the metric path.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDecisionRecord {
    pub tool: String,
    pub decision: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<f64>,
    pub timestamp: chrono::DateTime<Utc>,
}

/// All mutable state for one session key.
#[derive(Debug)]
pub struct Session {
    key: String,
    identity: SessionIdentity,

    created_ns: u64,
    last_activity_ns: u64,

    total_cost_usd: f64,
    tokens: TokenTotals,
    per_model: HashMap<String, ModelUsage>,
    lines_added: u64,
    lines_removed: u64,
    commit_count: u64,
    pr_count: u64,
    active_time_seconds: f64,
    tool_decisions: Vec<ToolDecisionRecord>,
    tool_result_count: u64,
    api_error_count: u64,
    api_call_count: u64,
    started: bool,

    conversation_index: u64,
    current_trace_handle: Option<TraceHandle>,

    /// model → timestamp of the last event-recorded cost, for metric
    /// cost dedup.
    recent_event_costs: HashMap<String, u64>,
    /// Last pull-request metric seen, for alias duplicate detection.
    last_pr_metric: Option<(PrCounterName, u64)>,

    finalized: bool,
}

impl Session {
    pub fn new(key: impl Into<String>, first_seen: &AttrBag, now: u64) -> Self {
        let mut identity = SessionIdentity::default();
        identity.absorb(first_seen);

        Self {
            key: key.into(),
            identity,
            created_ns: now,
            last_activity_ns: now,
            total_cost_usd: 0.0,
            tokens: TokenTotals::default(),
            per_model: HashMap::new(),
            lines_added: 0,
            lines_removed: 0,
            commit_count: 0,
            pr_count: 0,
            active_time_seconds: 0.0,
            tool_decisions: Vec::new(),
            tool_result_count: 0,
            api_error_count: 0,
            api_call_count: 0,
            started: false,
            conversation_index: 0,
            current_trace_handle: None,
            recent_event_costs: HashMap::new(),
            last_pr_metric: None,
            finalized: false,
        }
    }

    pub fn last_activity_ns(&self) -> u64 {
        self.last_activity_ns
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Record activity for idle-timeout purposes.
    pub fn touch(&mut self, now: u64) {
        self.last_activity_ns = now;
    }

    /// Apply a classified log event: update aggregates, drive the
    /// conversation lifecycle, and emit backend entities.
    pub fn ingest_event(&mut self, event: ClientEvent, attrs: &AttrBag, sink: &dyn TelemetrySink) {
        if self.finalized {
            tracing::debug!(session = %self.key, "Dropping event for finalized session");
            return;
        }
        self.identity.absorb(attrs);
        self.last_activity_ns = now_ns();

        match event.kind {
            EventKind::UserPrompt {
                prompt,
                prompt_length,
            } => {
                self.open_conversation(&prompt, prompt_length, event.timestamp_ns, sink);
            }
            EventKind::ApiRequest(request) => {
                self.apply_api_request(request, event.timestamp_ns, sink);
            }
            EventKind::ApiError {
                model,
                error_message,
                status_code,
                request_id,
            } => {
                self.api_error_count += 1;
                if let Some(trace) = &self.current_trace_handle {
                    sink.event(
                        trace,
                        EventDraft {
                            name: "api-error".into(),
                            timestamp: nanos_to_datetime(event.timestamp_ns),
                            input: None,
                            output: Some(json!({
                                "error": error_message,
                                "statusCode": status_code,
                            })),
                            metadata: Some(json!({
                                "model": model,
                                "requestId": request_id,
                            })),
                            level: ObservationLevel::Error,
                        },
                    );
                }
            }
            EventKind::ToolResult {
                tool_name,
                success,
                duration_ms,
            } => {
                self.tool_result_count += 1;
                if let Some(trace) = &self.current_trace_handle {
                    sink.event(
                        trace,
                        EventDraft {
                            name: format!("tool-{tool_name}"),
                            timestamp: nanos_to_datetime(event.timestamp_ns),
                            input: None,
                            output: Some(json!({
                                "success": success,
                                "durationMs": duration_ms,
                            })),
                            metadata: None,
                            level: ObservationLevel::Default,
                        },
                    );
                }
            }
            EventKind::ToolDecision {
                tool_name,
                decision,
                source,
            } => {
                let level = decision_level(&decision);
                self.tool_decisions.push(ToolDecisionRecord {
                    tool: tool_name.clone(),
                    decision: decision.clone(),
                    source: Some(source.clone()),
                    language: None,
                    count: None,
                    timestamp: nanos_to_datetime(event.timestamp_ns),
                });
                if let Some(trace) = &self.current_trace_handle {
                    sink.event(
                        trace,
                        EventDraft {
                            name: "tool-decision".into(),
                            timestamp: nanos_to_datetime(event.timestamp_ns),
                            input: Some(json!({
                                "tool": tool_name,
                                "decision": decision,
                                "source": source,
                            })),
                            output: None,
                            metadata: None,
                            level,
                        },
                    );
                }
            }
        }
    }

    /// Apply a classified metric sample.
    pub fn ingest_metric(&mut self, sample: MetricSample, attrs: &AttrBag, sink: &dyn TelemetrySink) {
        if self.finalized {
            tracing::debug!(session = %self.key, "Dropping metric for finalized session");
            return;
        }
        self.identity.absorb(attrs);
        self.last_activity_ns = now_ns();

        match sample.kind {
            SampleKind::Cost { model, usd } => {
                // Event-derived cost is authoritative: a metric within the
                // dedup window of an event-recorded cost for the same
                // model would double count.
                if let Some(&event_ns) = self.recent_event_costs.get(&model)
                    && sample.timestamp_ns.abs_diff(event_ns) <= COST_DEDUP_WINDOW_NS
                {
                    tracing::debug!(
                        session = %self.key,
                        model = %model,
                        usd,
                        "Skipping cost metric already covered by an api_request event"
                    );
                    return;
                }
                self.total_cost_usd += usd;
                self.per_model.entry(model).or_default().cost_usd += usd;
            }
            SampleKind::Tokens { model, kind, count } => {
                let count = count.max(0.0) as u64;
                self.tokens.add(kind, count);
                self.per_model.entry(model).or_default().tokens.add(kind, count);
            }
            SampleKind::Lines { change, count } => {
                let count = count.max(0.0) as u64;
                match change {
                    LineChange::Added => self.lines_added += count,
                    LineChange::Removed => self.lines_removed += count,
                }
            }
            SampleKind::Commits { count } => {
                self.commit_count += count.max(0.0) as u64;
            }
            SampleKind::PullRequests { name, count } => {
                if let Some((last_name, last_ns)) = self.last_pr_metric
                    && last_name != name
                    && sample.timestamp_ns.abs_diff(last_ns) <= COST_DEDUP_WINDOW_NS
                {
                    tracing::debug!(
                        session = %self.key,
                        "Both pull-request metric aliases reported within the duplicate window"
                    );
                }
                self.last_pr_metric = Some((name, sample.timestamp_ns));
                self.pr_count += count.max(0.0) as u64;
            }
            SampleKind::SessionStart => {
                self.started = true;
            }
            SampleKind::ActiveTime { seconds } => {
                // Reported as an absolute total: last-wins, not additive.
                self.active_time_seconds = seconds;
            }
            SampleKind::CodeEditDecision {
                tool,
                decision,
                language,
                count,
            } => {
                let level = decision_level(&decision);
                self.tool_decisions.push(ToolDecisionRecord {
                    tool: tool.clone(),
                    decision: decision.clone(),
                    source: None,
                    language: Some(language.clone()),
                    count: Some(count),
                    timestamp: nanos_to_datetime(sample.timestamp_ns),
                });
                if let Some(trace) = &self.current_trace_handle {
                    sink.event(
                        trace,
                        EventDraft {
                            name: "code-edit-decision".into(),
                            timestamp: nanos_to_datetime(sample.timestamp_ns),
                            input: Some(json!({
                                "tool": tool,
                                "decision": decision,
                                "language": language,
                            })),
                            output: None,
                            metadata: None,
                            level,
                        },
                    );
                }
            }
        }
    }

    fn open_conversation(
        &mut self,
        prompt: &str,
        prompt_length: i64,
        timestamp_ns: u64,
        sink: &dyn TelemetrySink,
    ) -> TraceHandle {
        self.conversation_index += 1;
        let handle = sink.trace(TraceDraft {
            name: format!("conversation-{}", self.conversation_index),
            session_id: self.key.clone(),
            timestamp: nanos_to_datetime(timestamp_ns),
            input: Some(json!({
                "prompt": prompt,
                "length": prompt_length,
            })),
            output: None,
            metadata: Some(self.identity.metadata()),
        });
        tracing::debug!(
            session = %self.key,
            conversation = self.conversation_index,
            trace = %handle,
            "Opened conversation"
        );
        // The previous trace is left as-is on the backend.
        self.current_trace_handle = Some(handle.clone());
        handle
    }

    fn apply_api_request(&mut self, request: ApiRequest, timestamp_ns: u64, sink: &dyn TelemetrySink) {
        let trace = match self.current_trace_handle.clone() {
            Some(trace) => trace,
            // Orphan generation: open a synthetic conversation to attach it to.
            None => self.open_conversation("", 0, timestamp_ns, sink),
        };

        let input = request.input_tokens.max(0) as u64;
        let output = request.output_tokens.max(0) as u64;
        let cache_read = request.cache_read_tokens.max(0) as u64;
        let cache_creation = request.cache_creation_tokens.max(0) as u64;

        self.tokens.input += input;
        self.tokens.output += output;
        self.tokens.cache_read += cache_read;
        self.tokens.cache_creation += cache_creation;

        let usage = self.per_model.entry(request.model.clone()).or_default();
        usage.tokens.input += input;
        usage.tokens.output += output;
        usage.tokens.cache_read += cache_read;
        usage.tokens.cache_creation += cache_creation;

        if let Some(cost) = request.cost_usd {
            self.total_cost_usd += cost;
            usage.cost_usd += cost;
            self.recent_event_costs
                .insert(request.model.clone(), timestamp_ns);
        }
        self.api_call_count += 1;

        let start = nanos_to_datetime(timestamp_ns);
        let end = nanos_to_datetime(
            timestamp_ns + request.duration_ms.max(0) as u64 * 1_000_000,
        );

        sink.generation(
            &trace,
            GenerationDraft {
                name: request.model.clone(),
                model: request.model,
                start_time: start,
                end_time: end,
                usage: TokenUsage::new(request.input_tokens, request.output_tokens),
                metadata: Some(json!({
                    "cost": request.cost_usd,
                    "cache": {
                        "read": request.cache_read_tokens,
                        "creation": request.cache_creation_tokens,
                    },
                    "requestId": request.request_id,
                })),
            },
        );
    }

    /// Emit the session summary trace with its two scores.
    ///
    /// Idempotent: the second and later calls are no-ops. After
    /// finalization no further ingest mutates this session.
    pub fn finalize(&mut self, sink: &dyn TelemetrySink) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        self.current_trace_handle = None;

        let summary = json!({
            "conversationCount": self.conversation_index,
            "apiCallCount": self.api_call_count,
            "toolCallCount": self.tool_result_count,
            "totalCost": self.total_cost_usd,
            "totalTokens": self.tokens.total(),
            "cacheTokens": {
                "read": self.tokens.cache_read,
                "creation": self.tokens.cache_creation,
            },
            "additionalMetrics": {
                "activeTime": self.active_time_seconds,
                "commitCount": self.commit_count,
                "pullRequestCount": self.pr_count,
                "toolDecisions": self.tool_decisions,
            },
        });

        let trace = sink.trace(TraceDraft {
            name: "session-summary".into(),
            session_id: self.key.clone(),
            timestamp: nanos_to_datetime(self.last_activity_ns),
            input: None,
            output: Some(summary),
            metadata: Some(self.identity.metadata()),
        });

        let rejections = self
            .tool_decisions
            .iter()
            .filter(|d| d.decision != "accept")
            .count() as u64;
        let quality = scoring::quality(self.api_error_count, rejections);
        sink.score(
            &trace,
            ScoreDraft {
                name: "quality".into(),
                value: quality.value,
                comment: Some(quality.comment),
            },
        );

        let efficiency = scoring::efficiency(scoring::EfficiencyInputs {
            input_tokens: self.tokens.input,
            output_tokens: self.tokens.output,
            cache_read_tokens: self.tokens.cache_read,
            cache_creation_tokens: self.tokens.cache_creation,
            total_cost_usd: self.total_cost_usd,
            api_call_count: self.api_call_count,
        });
        sink.score(
            &trace,
            ScoreDraft {
                name: "efficiency".into(),
                value: efficiency.value,
                comment: Some(efficiency.comment),
            },
        );

        tracing::info!(
            session = %self.key,
            conversations = self.conversation_index,
            api_calls = self.api_call_count,
            tool_calls = self.tool_result_count,
            total_tokens = self.tokens.total(),
            total_cost_usd = self.total_cost_usd,
            lifetime_secs = self.last_activity_ns.saturating_sub(self.created_ns) / 1_000_000_000,
            "Session finalized"
        );
    }
}

/// Aggregate introspection for tests and diagnostics.
#[allow(dead_code)]
impl Session {
    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn tokens(&self) -> TokenTotals {
        self.tokens
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.total_cost_usd
    }

    pub fn api_call_count(&self) -> u64 {
        self.api_call_count
    }

    pub fn conversation_index(&self) -> u64 {
        self.conversation_index
    }

    pub fn current_trace_handle(&self) -> Option<&TraceHandle> {
        self.current_trace_handle.as_ref()
    }

    pub fn model_usage(&self, model: &str) -> Option<&ModelUsage> {
        self.per_model.get(model)
    }
}

fn decision_level(decision: &str) -> ObservationLevel {
    if decision == "accept" {
        ObservationLevel::Default
    } else {
        ObservationLevel::Warning
    }
}
