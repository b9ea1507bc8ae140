//! Optional bearer-token authentication for the ingest endpoints.
//!
//! When `auth.api_key` is configured, `POST /v1/*` requires a matching
//! `Authorization: Bearer` header. The comparison is constant-time.
//! `/health` is not behind this middleware so probes keep working.

use axum::{
    Json,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http::{StatusCode, header::AUTHORIZATION};
use serde_json::json;
use subtle::ConstantTimeEq;

use crate::AppState;

pub async fn api_key_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = &state.config.auth.api_key else {
        return next.run(req).await;
    };

    let provided = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if bool::from(token.as_bytes().ct_eq(expected.as_bytes())) => {
            next.run(req).await
        }
        _ => {
            tracing::debug!(path = %req.uri().path(), "Rejecting unauthenticated ingest request");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "missing or invalid bearer token"})),
            )
                .into_response()
        }
    }
}
