use async_trait::async_trait;
use reframe_core::schema::OutputSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ChatRequest, LanguageModel, ModerationOutcome, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const MAX_ERROR_BODY_CHARS: usize = 300;

/// OpenAI-compatible chat completions + moderation client.
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    moderation_model: String,
}

impl OpenAiProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        moderation_model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            moderation_model: moderation_model.into(),
        }
    }

    async fn post<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ProviderError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        response.json::<R>().await.map_err(map_transport_error)
    }

    fn chat_body(&self, request: &ChatRequest) -> serde_json::Value {
        let messages: Vec<WireMessage<'_>> = request
            .messages
            .iter()
            .map(|m| WireMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect();
        json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        })
    }
}

fn map_transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(0)
    } else if err.is_decode() {
        ProviderError::StructuredOutput(err.to_string())
    } else if err.is_builder() {
        ProviderError::InvalidRequest(err.to_string())
    } else {
        ProviderError::Connection(err.to_string())
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Deserialize)]
struct ModerationResult {
    flagged: bool,
    #[serde(default)]
    categories: std::collections::BTreeMap<String, bool>,
}

fn first_content(response: ChatResponse) -> Result<String, ProviderError> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| ProviderError::StructuredOutput("completion had no choices".into()))?;
    if let Some(refusal) = message.refusal.filter(|r| !r.trim().is_empty()) {
        return Err(ProviderError::StructuredOutput(format!(
            "model refused: {refusal}"
        )));
    }
    message
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ProviderError::StructuredOutput("completion was empty".into()))
}

#[async_trait]
impl LanguageModel for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        let response: ChatResponse = self
            .post("/chat/completions", &self.chat_body(request))
            .await?;
        first_content(response)
    }

    async fn complete_structured(
        &self,
        request: &ChatRequest,
        schema: &OutputSchema,
    ) -> Result<serde_json::Value, ProviderError> {
        let mut body = self.chat_body(request);
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {
                "name": schema.name(),
                "strict": true,
                "schema": schema.to_json_schema(),
            }
        });
        let response: ChatResponse = self.post("/chat/completions", &body).await?;
        let content = first_content(response)?;
        serde_json::from_str(&content).map_err(|err| ProviderError::StructuredOutput(err.to_string()))
    }

    async fn moderate(&self, text: &str) -> Result<ModerationOutcome, ProviderError> {
        let response: ModerationResponse = self
            .post(
                "/moderations",
                &json!({ "model": self.moderation_model, "input": text }),
            )
            .await?;
        let Some(result) = response.results.into_iter().next() else {
            return Ok(ModerationOutcome::default());
        };
        Ok(ModerationOutcome {
            flagged: result.flagged,
            categories: result
                .categories
                .into_iter()
                .filter_map(|(name, hit)| hit.then_some(name))
                .collect(),
        })
    }
}
