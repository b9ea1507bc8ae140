//! Backend sink abstraction over the Langfuse ingestion API.
//!
//! The session core talks to Langfuse exclusively through the
//! [`TelemetrySink`] trait: entity creation is a non-blocking enqueue and
//! delivery is best-effort on a background worker, so a slow or
//! unavailable backend can never stall ingest. Transport failures are
//! swallowed and logged; they must not raise into the session core.

pub mod client;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Identifier of a backend trace, handed back by [`TelemetrySink::trace`]
/// and used to attach observations and scores.
///
/// Handles are generated client-side (delivery is asynchronous), so they
/// are valid immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceHandle(String);

impl TraceHandle {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TraceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observation severity, using Langfuse's level vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObservationLevel {
    Default,
    Warning,
    Error,
}

/// A trace to be created on the backend.
#[derive(Debug, Clone)]
pub struct TraceDraft {
    pub name: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub metadata: Option<Value>,
}

/// Token usage attached to a generation. `unit` is always `"TOKENS"`.
#[derive(Debug, Clone, Serialize)]
pub struct TokenUsage {
    pub input: i64,
    pub output: i64,
    pub total: i64,
    pub unit: &'static str,
}

impl TokenUsage {
    pub fn new(input: i64, output: i64) -> Self {
        Self {
            input,
            output,
            total: input + output,
            unit: "TOKENS",
        }
    }
}

/// A model invocation observation.
#[derive(Debug, Clone)]
pub struct GenerationDraft {
    pub name: String,
    pub model: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub usage: TokenUsage,
    pub metadata: Option<Value>,
}

/// A discrete observation (tool result, decision, error).
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub metadata: Option<Value>,
    pub level: ObservationLevel,
}

/// A numeric score attached to a trace.
#[derive(Debug, Clone)]
pub struct ScoreDraft {
    pub name: String,
    pub value: f64,
    pub comment: Option<String>,
}

/// Destination for backend entities.
///
/// All creation calls are fire-and-forget: they enqueue and return. Call
/// order is preserved per trace handle so observations arrive in the
/// order the session emitted them. `flush` bounds the wait for pending
/// deliveries and reports whether the queue fully drained.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    fn trace(&self, draft: TraceDraft) -> TraceHandle;

    fn generation(&self, trace: &TraceHandle, draft: GenerationDraft);

    fn event(&self, trace: &TraceHandle, draft: EventDraft);

    fn score(&self, trace: &TraceHandle, draft: ScoreDraft);

    async fn flush(&self, timeout: Duration) -> bool;
}
