use axum::Json;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use reframe_core::coaching::RequestViolation;
use reframe_core::error::{self, ApiError};

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Request body over the size limit (413)
    PayloadTooLarge { limit_bytes: usize },
    /// Bot protection failed (403)
    Forbidden {
        message: String,
        docs_hint: Option<String>,
    },
    /// Per-caller AI rate limit exhausted (429)
    RateLimited { retry_after_ms: u64 },
    /// No provider credential configured (503)
    AiNotConfigured,
    /// Feature switched off by configuration (503)
    FeatureDisabled { feature: String },
    /// Model invocation failed after retries (500)
    AiFailed,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();
        let mut retry_after_secs = None;

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    received,
                    request_id,
                    docs_hint,
                    retry_after_ms: None,
                },
            ),
            AppError::PayloadTooLarge { limit_bytes } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ApiError {
                    error: error::codes::PAYLOAD_TOO_LARGE.to_string(),
                    message: format!("Request body is larger than {limit_bytes} bytes."),
                    field: Some("body".to_string()),
                    received: None,
                    request_id,
                    docs_hint: Some("Send fewer or shorter messages.".to_string()),
                    retry_after_ms: None,
                },
            ),
            AppError::Forbidden { message, docs_hint } => (
                StatusCode::FORBIDDEN,
                ApiError {
                    error: error::codes::FORBIDDEN.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint,
                    retry_after_ms: None,
                },
            ),
            AppError::RateLimited { retry_after_ms } => {
                retry_after_secs = Some(retry_after_ms.div_ceil(1000).max(1));
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    ApiError {
                        error: error::codes::RATE_LIMITED.to_string(),
                        message: "You're sending messages a little too quickly. Take a breath and try again shortly.".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                        retry_after_ms: Some(retry_after_ms),
                    },
                )
            }
            AppError::AiNotConfigured => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiError {
                    error: error::codes::AI_NOT_CONFIGURED.to_string(),
                    message: "AI coaching is not configured on this server. The rest of the app still works."
                        .to_string(),
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: Some(
                        "Set OPENAI_API_KEY on the server to enable AI features.".to_string(),
                    ),
                    retry_after_ms: None,
                },
            ),
            AppError::FeatureDisabled { feature } => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiError {
                    error: error::codes::FEATURE_DISABLED.to_string(),
                    message: "This AI feature is turned off right now.".to_string(),
                    field: None,
                    received: Some(serde_json::Value::String(feature)),
                    request_id,
                    docs_hint: None,
                    retry_after_ms: None,
                },
            ),
            AppError::AiFailed => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError {
                    error: error::codes::AI_REQUEST_FAILED.to_string(),
                    message: "Something went wrong while preparing a response. Please try again in a moment."
                        .to_string(),
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: None,
                    retry_after_ms: None,
                },
            ),
        };

        let mut response = (status, Json(api_error)).into_response();
        if let Some(secs) = retry_after_secs {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert("retry-after", value);
            }
        }
        response
    }
}

impl From<RequestViolation> for AppError {
    fn from(violation: RequestViolation) -> Self {
        AppError::Validation {
            message: format!("Invalid request: {} {}", violation.field, violation.message),
            field: Some(violation.field),
            received: None,
            docs_hint: None,
        }
    }
}
