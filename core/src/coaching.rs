use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const MAX_MESSAGES: usize = 20;
pub const MAX_MESSAGE_CHARS: usize = 4000;
pub const MAX_CONTEXT_LABEL_CHARS: usize = 64;
pub const MAX_SELECTED_TEXT_CHARS: usize = 2000;
pub const MAX_MODEL_NAME_CHARS: usize = 64;
pub const MIN_MAX_TOKENS: u32 = 64;
pub const MAX_MAX_TOKENS: u32 = 520;

/// Cognitive distortions the distortions mode may name. Anything else is
/// rejected by the output schema.
pub const DISTORTIONS: &[&str] = &[
    "All-or-nothing thinking",
    "Overgeneralization",
    "Mental filter",
    "Discounting the positive",
    "Mind reading",
    "Fortune telling",
    "Catastrophizing",
    "Emotional reasoning",
    "Should statements",
    "Labeling",
    "Personalization",
    "Blaming",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One turn of a conversation. Order within a conversation is meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// The four coaching intents. Each has its own prompt and output shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CoachMode {
    Coach,
    Distortions,
    Socratic,
    Reframe,
}

impl CoachMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CoachMode::Coach => "coach",
            CoachMode::Distortions => "distortions",
            CoachMode::Socratic => "socratic",
            CoachMode::Reframe => "reframe",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoachContext {
    /// Program the person is working through (e.g. "anxiety")
    #[serde(default)]
    pub pathway: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    /// Text the person highlighted in a thought record or journal entry
    #[serde(default)]
    pub selected_text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoachSettings {
    #[serde(default)]
    pub model: Option<String>,
    /// Sampling temperature, 0..=1
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Completion budget, 64..=520
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CoachRequest {
    pub mode: CoachMode,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub context: Option<CoachContext>,
    #[serde(default)]
    pub settings: Option<CoachSettings>,
}

/// A request field that failed boundary validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct RequestViolation {
    pub field: String,
    pub message: String,
}

impl RequestViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Reject `value` when it is longer than `max` characters.
pub fn check_max_chars(field: &str, value: &str, max: usize) -> Result<(), RequestViolation> {
    if value.chars().count() > max {
        return Err(RequestViolation::new(
            field,
            format!("must be at most {max} characters"),
        ));
    }
    Ok(())
}

impl CoachRequest {
    pub fn validate(&self) -> Result<(), RequestViolation> {
        if self.messages.is_empty() {
            return Err(RequestViolation::new(
                "messages",
                "at least one message is required",
            ));
        }
        if self.messages.len() > MAX_MESSAGES {
            return Err(RequestViolation::new(
                "messages",
                format!("at most {MAX_MESSAGES} messages are allowed"),
            ));
        }
        for (index, message) in self.messages.iter().enumerate() {
            check_max_chars(
                &format!("messages[{index}].content"),
                &message.content,
                MAX_MESSAGE_CHARS,
            )?;
        }

        if let Some(context) = &self.context {
            if let Some(pathway) = &context.pathway {
                check_max_chars("context.pathway", pathway, MAX_CONTEXT_LABEL_CHARS)?;
            }
            if let Some(user_name) = &context.user_name {
                check_max_chars("context.userName", user_name, MAX_CONTEXT_LABEL_CHARS)?;
            }
            if let Some(selected) = &context.selected_text {
                check_max_chars("context.selectedText", selected, MAX_SELECTED_TEXT_CHARS)?;
            }
        }

        if let Some(settings) = &self.settings {
            if let Some(model) = &settings.model {
                let valid_chars = model
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-'));
                if model.is_empty() || model.len() > MAX_MODEL_NAME_CHARS || !valid_chars {
                    return Err(RequestViolation::new(
                        "settings.model",
                        "must be a model identifier of at most 64 characters",
                    ));
                }
            }
            if let Some(temperature) = settings.temperature {
                if !(0.0..=1.0).contains(&temperature) {
                    return Err(RequestViolation::new(
                        "settings.temperature",
                        "must be between 0 and 1",
                    ));
                }
            }
            if let Some(max_tokens) = settings.max_tokens {
                if !(MIN_MAX_TOKENS..=MAX_MAX_TOKENS).contains(&max_tokens) {
                    return Err(RequestViolation::new(
                        "settings.maxTokens",
                        format!("must be between {MIN_MAX_TOKENS} and {MAX_MAX_TOKENS}"),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Everything the prompt will carry from the client: non-system message
    /// contents in order, then the non-empty context fields.
    pub fn screening_text(&self) -> String {
        let mut parts = vec![crate::risk::screening_text(&self.messages)];
        if let Some(context) = &self.context {
            parts.extend(
                [&context.selected_text, &context.pathway, &context.user_name]
                    .into_iter()
                    .filter_map(|field| field.as_deref())
                    .filter(|field| !field.trim().is_empty())
                    .map(str::to_string),
            );
        }
        parts.join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ToolSuggestionType {
    ThoughtRecord,
    Skill,
    ProblemStep,
}

/// An in-app tool the coach suggests opening next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToolSuggestion {
    #[serde(rename = "type")]
    pub kind: ToolSuggestionType,
    pub label: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoachReply {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_suggestion: Option<ToolSuggestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DistortionItem {
    pub distortion: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DistortionsResult {
    pub items: Vec<DistortionItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SocraticResult {
    pub questions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReframeResult {
    pub balanced_thoughts: Vec<String>,
    pub action_step: String,
}

/// Result of a coaching run. Always exactly one shape, chosen by the
/// request mode; serialized with a `mode` tag.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CoachResult {
    Coach(CoachReply),
    Distortions(DistortionsResult),
    Socratic(SocraticResult),
    Reframe(ReframeResult),
}

impl CoachResult {
    pub fn mode(&self) -> CoachMode {
        match self {
            CoachResult::Coach(_) => CoachMode::Coach,
            CoachResult::Distortions(_) => CoachMode::Distortions,
            CoachResult::Socratic(_) => CoachMode::Socratic,
            CoachResult::Reframe(_) => CoachMode::Reframe,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SafetyCategory {
    SelfHarmRisk,
    ViolenceRisk,
    Other,
}

impl SafetyCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            SafetyCategory::SelfHarmRisk => "self_harm_risk",
            SafetyCategory::ViolenceRisk => "violence_risk",
            SafetyCategory::Other => "other",
        }
    }
}

/// Terminal response for a screened request. Returned with HTTP 200.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlockedResponse {
    pub blocked: bool,
    pub category: SafetyCategory,
    pub safe_response: String,
}

impl BlockedResponse {
    pub fn new(category: SafetyCategory) -> Self {
        Self {
            blocked: true,
            category,
            safe_response: crate::risk::safe_response(category).to_string(),
        }
    }
}
