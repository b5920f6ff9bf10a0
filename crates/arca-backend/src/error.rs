//! Error taxonomy for the chat backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Machine-readable error category, shared with the proxy wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    RateLimited,
    ValidationError,
    UpstreamError,
    Timeout,
    NetworkError,
}

impl ErrorCode {
    /// Map an HTTP status to an error category.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorCode::Unauthorized,
            429 => ErrorCode::RateLimited,
            400 => ErrorCode::ValidationError,
            _ => ErrorCode::UpstreamError,
        }
    }

    /// Parse a wire code; unknown codes count as upstream errors.
    pub fn from_wire(code: &str) -> Self {
        match code {
            "UNAUTHORIZED" => ErrorCode::Unauthorized,
            "RATE_LIMITED" => ErrorCode::RateLimited,
            "VALIDATION_ERROR" => ErrorCode::ValidationError,
            "TIMEOUT" => ErrorCode::Timeout,
            "NETWORK_ERROR" => ErrorCode::NetworkError,
            _ => ErrorCode::UpstreamError,
        }
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    /// Transport failure before or while reading the stream.
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    /// Non-2xx response or an `event: error` frame.
    #[error("upstream error: {message}")]
    Upstream {
        code: ErrorCode,
        status: Option<u16>,
        message: String,
    },
    /// The request was rejected before anything was sent.
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BackendError {
    pub fn code(&self) -> ErrorCode {
        match self {
            BackendError::Network(_) => ErrorCode::NetworkError,
            BackendError::Timeout => ErrorCode::Timeout,
            BackendError::Upstream { code, .. } => *code,
            BackendError::Validation(_) | BackendError::Json(_) => ErrorCode::ValidationError,
        }
    }

    /// Build an upstream error from a failed HTTP response body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let fallback = format!("Upstream error ({status})");
        BackendError::Upstream {
            code: ErrorCode::from_status(status),
            status: Some(status),
            message: extract_error_message(body).unwrap_or(fallback),
        }
    }

    /// Build an upstream error from the data of an `event: error` frame.
    pub fn from_error_frame(data: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(data).ok();
        let code = parsed
            .as_ref()
            .and_then(|v| v.get("code").or_else(|| v.get("error")?.get("code")))
            .and_then(Value::as_str)
            .map(ErrorCode::from_wire)
            .unwrap_or(ErrorCode::UpstreamError);
        BackendError::Upstream {
            code,
            status: None,
            message: extract_error_message(data).unwrap_or_else(|| "Unknown error".to_string()),
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            BackendError::Timeout
        } else {
            BackendError::Network(error.to_string())
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(error: std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::TimedOut {
            BackendError::Timeout
        } else {
            BackendError::Network(error.to_string())
        }
    }
}

/// Best-effort human-readable message from an error payload: `error.message`,
/// then a top-level `message`, then the raw text itself.
fn extract_error_message(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => {
            let nested = map
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str);
            let flat = map.get("message").and_then(Value::as_str);
            let error_string = map.get("error").and_then(Value::as_str);
            nested
                .or(flat)
                .or(error_string)
                .map(str::to_string)
                .or_else(|| Some(trimmed.to_string()))
        }
        Ok(Value::String(text)) if !text.trim().is_empty() => Some(text),
        _ => Some(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ErrorCode::from_status(401), ErrorCode::Unauthorized);
        assert_eq!(ErrorCode::from_status(429), ErrorCode::RateLimited);
        assert_eq!(ErrorCode::from_status(400), ErrorCode::ValidationError);
        assert_eq!(ErrorCode::from_status(502), ErrorCode::UpstreamError);
        assert_eq!(ErrorCode::from_status(404), ErrorCode::UpstreamError);
    }

    #[test]
    fn response_message_prefers_nested_error() {
        let err = BackendError::from_response(
            429,
            r#"{"error":{"message":"slow down"},"message":"outer"}"#,
        );
        match err {
            BackendError::Upstream {
                code,
                status,
                message,
            } => {
                assert_eq!(code, ErrorCode::RateLimited);
                assert_eq!(status, Some(429));
                assert_eq!(message, "slow down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn response_message_falls_back_to_text_then_status() {
        let err = BackendError::from_response(500, "  gateway exploded \n");
        assert_eq!(err.to_string(), "upstream error: gateway exploded");

        let err = BackendError::from_response(503, "");
        assert_eq!(err.to_string(), "upstream error: Upstream error (503)");
    }

    #[test]
    fn error_frame_proxy_shape() {
        let err = BackendError::from_error_frame(r#"{"code":"TIMEOUT","message":"Request timed out"}"#);
        assert_eq!(err.code(), ErrorCode::Timeout);
        assert_eq!(err.to_string(), "upstream error: Request timed out");
    }

    #[test]
    fn error_frame_vendor_shape_and_raw_text() {
        let err = BackendError::from_error_frame(
            r#"{"error":{"type":"overloaded","message":"Overloaded"}}"#,
        );
        assert_eq!(err.code(), ErrorCode::UpstreamError);
        assert_eq!(err.to_string(), "upstream error: Overloaded");

        let err = BackendError::from_error_frame("boom");
        assert_eq!(err.to_string(), "upstream error: boom");

        let err = BackendError::from_error_frame("");
        assert_eq!(err.to_string(), "upstream error: Unknown error");
    }

    #[test]
    fn wire_codes_serialize_screaming_snake() {
        let json = serde_json::to_value(ErrorCode::RateLimited).unwrap();
        assert_eq!(json, serde_json::json!("RATE_LIMITED"));
        assert_eq!(ErrorCode::from_wire("nope"), ErrorCode::UpstreamError);
    }
}
