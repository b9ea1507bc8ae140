//! OTLP ingest endpoints: `POST /v1/logs`, `/v1/metrics`, `/v1/traces`.
//!
//! Well-formed envelopes are always acknowledged with OTLP's
//! partial-success body; backend delivery is decoupled and best-effort.
//! Malformed JSON gets 400 and counts toward `errorCount`.

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use http::StatusCode;
use serde_json::json;

use crate::{
    AppState, dispatch,
    otlp::{LogsEnvelope, MetricsEnvelope},
};

fn partial_success() -> Response {
    (StatusCode::OK, Json(json!({"partialSuccess": {}}))).into_response()
}

fn bad_request(state: &AppState, error: serde_json::Error) -> Response {
    state.stats.record_error();
    tracing::debug!(error = %error, "Rejecting malformed OTLP payload");
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": error.to_string()})),
    )
        .into_response()
}

#[tracing::instrument(name = "ingest.logs", skip_all)]
pub async fn ingest_logs(State(state): State<AppState>, body: Bytes) -> Response {
    state.stats.record_request();
    match serde_json::from_slice::<LogsEnvelope>(&body) {
        Ok(envelope) => {
            dispatch::dispatch_logs(&state.registry, &envelope);
            partial_success()
        }
        Err(e) => bad_request(&state, e),
    }
}

#[tracing::instrument(name = "ingest.metrics", skip_all)]
pub async fn ingest_metrics(State(state): State<AppState>, body: Bytes) -> Response {
    state.stats.record_request();
    match serde_json::from_slice::<MetricsEnvelope>(&body) {
        Ok(envelope) => {
            dispatch::dispatch_metrics(&state.registry, &envelope);
            partial_success()
        }
        Err(e) => bad_request(&state, e),
    }
}

/// Span telemetry is not bridged; the payload is validated and dropped so
/// clients exporting all three signals do not see errors.
#[tracing::instrument(name = "ingest.traces", skip_all)]
pub async fn ingest_traces(State(state): State<AppState>, body: Bytes) -> Response {
    state.stats.record_request();
    match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(_) => partial_success(),
        Err(e) => bad_request(&state, e),
    }
}
