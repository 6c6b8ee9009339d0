//! Custom extractors that convert body rejections to structured AppError responses.
//!
//! Use `AppJson<T>` in place of `axum::Json<T>` in handler signatures. The body is
//! capped at `MAX_JSON_BODY_BYTES` (413) before any parsing happens, and
//! deserialization failures produce a JSON `AppError` (400) instead of axum's
//! default plain-text rejection.

use axum::extract::{FromRequest, Request};
use axum::http::HeaderMap;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http_body_util::LengthLimitError;
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// Upper bound for any AI request body.
pub const MAX_JSON_BODY_BYTES: usize = 20 * 1024;

pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        if !is_json_content_type(req.headers()) {
            return Err(AppError::Validation {
                message: "Expected a JSON request body.".to_string(),
                field: Some("content-type".to_string()),
                received: None,
                docs_hint: Some("Send the body with `Content-Type: application/json`.".to_string()),
            });
        }

        if declared_content_length(req.headers()).is_some_and(|len| len > MAX_JSON_BODY_BYTES) {
            return Err(AppError::PayloadTooLarge {
                limit_bytes: MAX_JSON_BODY_BYTES,
            });
        }

        let bytes = axum::body::to_bytes(req.into_body(), MAX_JSON_BODY_BYTES)
            .await
            .map_err(map_body_error)?;

        serde_json::from_slice::<T>(&bytes)
            .map(AppJson)
            .map_err(map_json_error)
    }
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().to_ascii_lowercase().starts_with("application/json"))
}

fn declared_content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Only the length limit is a 413; a body that fails to arrive is a 400.
fn map_body_error(err: axum::Error) -> AppError {
    if err.into_inner().is::<LengthLimitError>() {
        return AppError::PayloadTooLarge {
            limit_bytes: MAX_JSON_BODY_BYTES,
        };
    }
    AppError::Validation {
        message: "The request body could not be read.".to_string(),
        field: Some("body".to_string()),
        received: None,
        docs_hint: None,
    }
}

/// Convert a serde error to a structured `AppError::Validation`.
pub fn map_json_error(err: serde_json::Error) -> AppError {
    let body_text = err.to_string();
    let field_hint = extract_field_from_serde_message(&body_text);

    AppError::Validation {
        message: format!("Invalid request body: {body_text}"),
        field: Some(field_hint.unwrap_or("body".to_string())),
        received: None,
        docs_hint: Some(
            "Check the request body against the endpoint's schema (GET /api-doc/openapi.json)."
                .to_string(),
        ),
    }
}

/// Try to extract a field name from serde's error messages.
fn extract_field_from_serde_message(msg: &str) -> Option<String> {
    for marker in ["missing field `", "unknown field `"] {
        if let Some(start) = msg.find(marker) {
            let after = &msg[start + marker.len()..];
            if let Some(end) = after.find('`') {
                return Some(after[..end].to_string());
            }
        }
    }
    None
}
