//! In-memory fakes shared by the unit and router tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use reframe_core::schema::OutputSchema;

use crate::coach::CoachService;
use crate::config::AiSettings;
use crate::limiter::InMemoryRateLimitStore;
use crate::provider::{ChatRequest, LanguageModel, ModerationOutcome, ProviderError};
use crate::store::{AiAuditRecord, EventStore, SafetyEvent};

pub fn configured_settings() -> AiSettings {
    let mut settings = AiSettings::default();
    settings.api_key = Some("sk-test".to_string());
    settings
}

/// Service over a fresh limiter and a recording event store.
pub fn build_service(
    model: Option<Arc<FakeModel>>,
    settings: AiSettings,
) -> (Arc<CoachService>, Arc<RecordingEventStore>) {
    let events = Arc::new(RecordingEventStore::default());
    let provider = model.map(|m| m as Arc<dyn LanguageModel>);
    let service = CoachService::new(
        settings,
        provider,
        Arc::new(InMemoryRateLimitStore::new()),
        events.clone(),
    );
    (Arc::new(service), events)
}

/// Scripted `LanguageModel`. Each call pops the next queued response; an
/// empty queue yields a retryable structured-output error for completions
/// and "not flagged" for moderation.
#[derive(Default)]
pub struct FakeModel {
    structured: Mutex<VecDeque<Result<serde_json::Value, ProviderError>>>,
    plain: Mutex<VecDeque<Result<String, ProviderError>>>,
    moderation: Mutex<VecDeque<Result<ModerationOutcome, ProviderError>>>,
    structured_calls: AtomicU32,
    plain_calls: AtomicU32,
    moderation_calls: AtomicU32,
    last_request: Mutex<Option<ChatRequest>>,
}

impl FakeModel {
    pub fn push_structured(&self, response: Result<serde_json::Value, ProviderError>) {
        self.structured.lock().expect("lock").push_back(response);
    }

    pub fn push_plain(&self, response: Result<String, ProviderError>) {
        self.plain.lock().expect("lock").push_back(response);
    }

    pub fn push_moderation(&self, response: Result<ModerationOutcome, ProviderError>) {
        self.moderation.lock().expect("lock").push_back(response);
    }

    pub fn structured_calls(&self) -> u32 {
        self.structured_calls.load(Ordering::SeqCst)
    }

    pub fn plain_calls(&self) -> u32 {
        self.plain_calls.load(Ordering::SeqCst)
    }

    pub fn moderation_calls(&self) -> u32 {
        self.moderation_calls.load(Ordering::SeqCst)
    }

    pub fn total_completion_calls(&self) -> u32 {
        self.structured_calls() + self.plain_calls()
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.last_request.lock().expect("lock").clone()
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    fn provider_name(&self) -> &str {
        "fake"
    }

    fn default_model(&self) -> &str {
        "fake-model"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        self.plain_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().expect("lock") = Some(request.clone());
        self.plain
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Connection("no scripted reply".into())))
    }

    async fn complete_structured(
        &self,
        request: &ChatRequest,
        _schema: &OutputSchema,
    ) -> Result<serde_json::Value, ProviderError> {
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().expect("lock") = Some(request.clone());
        self.structured
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::StructuredOutput("no scripted reply".into())))
    }

    async fn moderate(&self, _text: &str) -> Result<ModerationOutcome, ProviderError> {
        self.moderation_calls.fetch_add(1, Ordering::SeqCst);
        self.moderation
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Ok(ModerationOutcome::default()))
    }
}

#[derive(Default)]
pub struct RecordingEventStore {
    safety: Mutex<Vec<SafetyEvent>>,
    audits: Mutex<Vec<AiAuditRecord>>,
}

impl RecordingEventStore {
    pub fn safety_events(&self) -> Vec<SafetyEvent> {
        self.safety.lock().expect("lock").clone()
    }

    pub fn audits(&self) -> Vec<AiAuditRecord> {
        self.audits.lock().expect("lock").clone()
    }
}

impl EventStore for RecordingEventStore {
    fn record_safety_event(&self, event: SafetyEvent) {
        self.safety.lock().expect("lock").push(event);
    }

    fn record_ai_audit(&self, record: AiAuditRecord) {
        self.audits.lock().expect("lock").push(record);
    }
}

pub fn test_state(service: Arc<CoachService>) -> crate::state::AppState {
    crate::state::AppState {
        db: None,
        coach: service,
        bot_protection: crate::bot_protection::BotProtection::default(),
        trust_proxy_headers: true,
    }
}

/// Send `request` through `app` and decode the JSON response body.
pub async fn send(
    app: axum::Router,
    request: axum::http::Request<axum::body::Body>,
) -> (axum::http::StatusCode, axum::http::HeaderMap, serde_json::Value) {
    use tower::ServiceExt;

    let response = app.oneshot(request).await.expect("request should succeed");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body should be JSON")
    };
    (status, headers, body)
}

pub fn json_post(uri: &str, body: &serde_json::Value) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .expect("request should build")
}
