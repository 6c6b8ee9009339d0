use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

use crate::error::AppError;

pub const BOT_TOKEN_HEADER: &str = "x-reframe-bot-token";

/// Shared-secret header check in front of the AI endpoints.
///
/// Enabled only when `REFRAME_BOT_PROTECTION_SECRET` is set. Tokens are
/// compared by SHA-256 digest so the comparison does not depend on the
/// position of the first differing byte of the secret.
#[derive(Clone, Default)]
pub struct BotProtection {
    secret_digest: Option<[u8; 32]>,
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

fn forbidden() -> AppError {
    AppError::Forbidden {
        message: "Bot protection check failed.".to_string(),
        docs_hint: Some("Reload the app and try again.".to_string()),
    }
}

impl BotProtection {
    pub fn from_env() -> Self {
        std::env::var("REFRAME_BOT_PROTECTION_SECRET")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(|secret| Self::with_secret(&secret))
            .unwrap_or_default()
    }

    pub fn with_secret(secret: &str) -> Self {
        Self {
            secret_digest: Some(digest(secret)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret_digest.is_some()
    }

    pub fn verify(&self, headers: &HeaderMap) -> Result<(), AppError> {
        let Some(expected) = self.secret_digest else {
            return Ok(());
        };

        let token = headers
            .get(BOT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let Some(token) = token else {
            tracing::warn!("bot protection header missing");
            return Err(forbidden());
        };

        if digest(token) != expected {
            tracing::warn!("bot protection token mismatch");
            return Err(forbidden());
        }

        Ok(())
    }
}
