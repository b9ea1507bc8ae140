//! Log-record classification into domain events.
//!
//! The client names the event class in the record body
//! (`claude_code.user_prompt`, `claude_code.api_request`, ...). Unknown
//! bodies are ignored at debug. Missing attributes take defaults:
//! strings `"unknown"`, numbers 0, bools false; the optional prompt text
//! defaults to the empty string.

use crate::otlp::AttrBag;

/// A classified client event, carrying its effective timestamp.
#[derive(Debug, Clone)]
pub struct ClientEvent {
    pub timestamp_ns: u64,
    pub kind: EventKind,
}

#[derive(Debug, Clone)]
pub enum EventKind {
    /// Opens a new conversation.
    UserPrompt { prompt: String, prompt_length: i64 },
    /// A model invocation, mapped to a generation.
    ApiRequest(ApiRequest),
    /// A failed model invocation, mapped to an ERROR-level event.
    ApiError {
        model: String,
        error_message: String,
        status_code: i64,
        request_id: Option<String>,
    },
    /// A completed tool invocation.
    ToolResult {
        tool_name: String,
        success: bool,
        duration_ms: i64,
    },
    /// A permission decision on a tool invocation.
    ToolDecision {
        tool_name: String,
        decision: String,
        source: String,
    },
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_creation_tokens: i64,
    pub cost_usd: Option<f64>,
    pub duration_ms: i64,
    pub request_id: Option<String>,
}

/// Classify a log record. Returns `None` for unrecognized bodies.
pub fn classify(body: &str, timestamp_ns: u64, attrs: &AttrBag) -> Option<ClientEvent> {
    let kind = match body {
        "claude_code.user_prompt" => EventKind::UserPrompt {
            prompt: attrs.get_str("prompt").unwrap_or_default().to_string(),
            prompt_length: attrs.i64_or_zero("prompt_length"),
        },
        "claude_code.api_request" => EventKind::ApiRequest(ApiRequest {
            model: attrs.str_or_unknown("model"),
            input_tokens: attrs.i64_or_zero("input_tokens"),
            output_tokens: attrs.i64_or_zero("output_tokens"),
            cache_read_tokens: attrs.i64_or_zero("cache_read_tokens"),
            cache_creation_tokens: attrs.i64_or_zero("cache_creation_tokens"),
            cost_usd: attrs.f64_opt("cost_usd"),
            duration_ms: attrs.i64_or_zero("duration_ms"),
            request_id: attrs.get_str("request_id").map(str::to_string),
        }),
        "claude_code.api_error" => EventKind::ApiError {
            model: attrs.str_or_unknown("model"),
            error_message: attrs.str_or_unknown("error_message"),
            status_code: attrs.i64_or_zero("status_code"),
            request_id: attrs.get_str("request_id").map(str::to_string),
        },
        "claude_code.tool_result" => EventKind::ToolResult {
            tool_name: attrs.str_or_unknown("tool_name"),
            success: attrs.bool_or_false("success"),
            duration_ms: attrs.i64_or_zero("duration_ms"),
        },
        "claude_code.tool_decision" => EventKind::ToolDecision {
            tool_name: attrs.str_or_unknown("tool_name"),
            decision: attrs.str_or_unknown("decision"),
            source: attrs.str_or_unknown("source"),
        },
        other => {
            tracing::debug!(body = other, "Ignoring unrecognized log event");
            return None;
        }
    };

    Some(ClientEvent { timestamp_ns, kind })
}
