//! Health endpoint for probes and monitoring.

use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;

use crate::AppState;

/// Health status response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    /// Overall status; the bridge has no hard dependencies, so this is
    /// `"healthy"` whenever the process is serving.
    pub status: &'static str,
    /// Seconds since startup.
    pub uptime: u64,
    /// Sessions currently live in the registry.
    pub sessions: usize,
    /// Ingest requests received since startup.
    pub request_count: u64,
    /// Ingest requests rejected as malformed since startup.
    pub error_count: u64,
    /// Langfuse delivery mode; entities are queued fire-and-forget.
    pub langfuse: &'static str,
}

#[tracing::instrument(name = "health.check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthStatus {
        status: "healthy",
        uptime: state.started_at.elapsed().as_secs(),
        sessions: state.registry.len(),
        request_count: state.stats.requests(),
        error_count: state.stats.errors(),
        langfuse: "connected",
    })
}
