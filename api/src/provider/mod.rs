//! Language-model provider seam.
//!
//! The orchestrator only talks to `dyn LanguageModel`; `openai::OpenAiProvider`
//! is the production implementation and tests use an in-memory fake.

pub mod openai;

use async_trait::async_trait;
use reframe_core::coaching::ChatMessage;
use reframe_core::schema::OutputSchema;
use serde::de::DeserializeOwned;

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModerationOutcome {
    pub flagged: bool,
    /// Provider category names that were flagged (e.g. "self-harm/intent")
    pub categories: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request timed out after {0} ms")]
    Timeout(u64),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("provider returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("structured output invalid: {0}")]
    StructuredOutput(String),
    #[error("request rejected before sending: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Timeouts, dropped connections, 429/502/503 and malformed structured
    /// output are worth another attempt. Auth failures and bad requests are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Timeout(_)
            | ProviderError::Connection(_)
            | ProviderError::StructuredOutput(_) => true,
            ProviderError::Status { status, .. } => matches!(status, 429 | 502 | 503),
            ProviderError::InvalidRequest(_) => false,
        }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn provider_name(&self) -> &str;

    /// Model used when the request does not override it.
    fn default_model(&self) -> &str;

    /// Free-text chat completion.
    async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError>;

    /// Chat completion constrained to `schema`; returns the decoded JSON.
    async fn complete_structured(
        &self,
        request: &ChatRequest,
        schema: &OutputSchema,
    ) -> Result<serde_json::Value, ProviderError>;

    async fn moderate(&self, text: &str) -> Result<ModerationOutcome, ProviderError>;
}

/// One structured call: request shaped output, validate it against the
/// schema, then decode it. Any mismatch is a retryable `StructuredOutput`.
pub async fn structured_call<T: DeserializeOwned>(
    provider: &dyn LanguageModel,
    request: &ChatRequest,
    schema: &OutputSchema,
) -> Result<T, ProviderError> {
    let value = provider.complete_structured(request, schema).await?;
    schema
        .validate(&value)
        .map_err(|violation| ProviderError::StructuredOutput(violation.to_string()))?;
    serde_json::from_value(value).map_err(|err| ProviderError::StructuredOutput(err.to_string()))
}
