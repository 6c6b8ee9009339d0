use serde::Serialize;
use utoipa::ToSchema;

/// Structured error response returned by every failing endpoint.
///
/// `message` is always safe to show to the person using the app. Provider
/// error text and other technical detail never appear here; they go to the
/// server logs and the audit trail instead.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Machine-readable error code (e.g. "validation_failed", "rate_limited")
    pub error: String,
    /// Human-readable description of what went wrong
    pub message: String,
    /// Which field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The value that was received (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<serde_json::Value>,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about what the client can do next
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
    /// Milliseconds until the caller may retry (rate limiting only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

/// Error codes used across the API
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
    pub const FORBIDDEN: &str = "forbidden";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const AI_NOT_CONFIGURED: &str = "ai_not_configured";
    pub const FEATURE_DISABLED: &str = "feature_disabled";
    pub const AI_REQUEST_FAILED: &str = "ai_request_failed";
}
