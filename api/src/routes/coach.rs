use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use reframe_core::coaching::{CoachRequest, CoachResult};

use crate::caller::VerifiedCaller;
use crate::coach::Outcome;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/ai/coach", post(coach))
}

/// Run one coaching turn.
///
/// Screened requests still answer 200, with `{ blocked, category, safeResponse }`
/// in place of a mode result. Coach mode always answers; the analysis modes
/// return 500 when the model cannot produce valid output.
#[utoipa::path(
    post,
    path = "/v1/ai/coach",
    request_body = CoachRequest,
    responses(
        (status = 200, description = "Mode result, or a blocked safety response", body = CoachResult),
        (status = 400, description = "Invalid request body", body = reframe_core::error::ApiError),
        (status = 403, description = "Bot protection failed", body = reframe_core::error::ApiError),
        (status = 413, description = "Request body too large", body = reframe_core::error::ApiError),
        (status = 429, description = "Rate limited; see Retry-After", body = reframe_core::error::ApiError),
        (status = 500, description = "Model request failed", body = reframe_core::error::ApiError),
        (status = 503, description = "AI not configured or feature disabled", body = reframe_core::error::ApiError)
    ),
    tag = "ai"
)]
pub async fn coach(
    State(state): State<AppState>,
    VerifiedCaller(caller): VerifiedCaller,
    AppJson(req): AppJson<CoachRequest>,
) -> Result<Json<Outcome<CoachResult>>, AppError> {
    req.validate()?;
    let outcome = state.coach.coach(&caller, req).await?;
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot_protection::BotProtection;
    use crate::extract::MAX_JSON_BODY_BYTES;
    use crate::test_support::{
        FakeModel, build_service, configured_settings, json_post, send, test_state,
    };
    use axum::http::StatusCode;
    use reframe_core::sanitize::CANNED_COACH_MESSAGE;
    use serde_json::json;
    use std::sync::Arc;

    fn app(state: AppState) -> Router {
        router().with_state(state)
    }

    fn body(mode: &str, text: &str) -> serde_json::Value {
        json!({ "mode": mode, "messages": [{ "role": "user", "content": text }] })
    }

    #[tokio::test]
    async fn high_risk_message_returns_safe_response_without_model_call() {
        let model = Arc::new(FakeModel::default());
        let (service, _) = build_service(Some(model.clone()), configured_settings());

        let (status, _, body) = send(
            app(test_state(service)),
            json_post("/v1/ai/coach", &body("coach", "I want to kill myself")),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["blocked"], true);
        assert_eq!(body["category"], "self_harm_risk");
        assert!(body["safeResponse"].as_str().is_some_and(|s| s.contains("reach")));
        assert_eq!(model.total_completion_calls(), 0);
    }

    #[tokio::test]
    async fn failing_model_still_gets_canned_coach_reply() {
        let model = Arc::new(FakeModel::default());
        let (service, _) = build_service(Some(model), configured_settings());

        let (status, _, body) = send(
            app(test_state(service)),
            json_post("/v1/ai/coach", &body("coach", "Everything feels like a lot")),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "coach");
        assert_eq!(body["message"], CANNED_COACH_MESSAGE);
    }

    #[tokio::test]
    async fn failing_model_in_analysis_mode_is_500() {
        let model = Arc::new(FakeModel::default());
        let (service, _) = build_service(Some(model), configured_settings());

        let (status, _, body) = send(
            app(test_state(service)),
            json_post("/v1/ai/coach", &body("reframe", "I ruin everything")),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "ai_request_failed");
        assert!(body["request_id"].as_str().is_some());
    }

    #[tokio::test]
    async fn distortions_result_is_tagged_with_mode() {
        let model = Arc::new(FakeModel::default());
        model.push_structured(Ok(json!({
            "items": [{ "distortion": "Catastrophizing", "reason": "One late reply is read as the end of the friendship." }]
        })));
        let (service, _) = build_service(Some(model), configured_settings());

        let (status, _, body) = send(
            app(test_state(service)),
            json_post(
                "/v1/ai/coach",
                &body("distortions", "She didn't text back, so she hates me"),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "distortions");
        assert_eq!(body["items"][0]["distortion"], "Catastrophizing");
    }

    #[tokio::test]
    async fn missing_provider_is_503() {
        let (service, _) = build_service(None, configured_settings());

        let (status, _, body) = send(
            app(test_state(service)),
            json_post("/v1/ai/coach", &body("coach", "hello")),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "ai_not_configured");
    }

    #[tokio::test]
    async fn second_request_over_budget_is_429_with_retry_after() {
        let mut settings = configured_settings();
        settings.rpm = 1;
        let (service, _) = build_service(Some(Arc::new(FakeModel::default())), settings);
        let app = app(test_state(service));

        let (first, _, _) = send(app.clone(), json_post("/v1/ai/coach", &body("coach", "hi there"))).await;
        assert_eq!(first, StatusCode::OK);

        let (status, headers, body) =
            send(app, json_post("/v1/ai/coach", &body("coach", "hi again"))).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(headers.get("retry-after").expect("retry-after"), "45");
        assert_eq!(body["retry_after_ms"], 45_000);
    }

    #[tokio::test]
    async fn bot_protection_rejects_missing_token() {
        let model = Arc::new(FakeModel::default());
        let (service, _) = build_service(Some(model.clone()), configured_settings());
        let mut state = test_state(service);
        state.bot_protection = BotProtection::with_secret("s3cret");

        let (status, _, body) = send(
            app(state),
            json_post("/v1/ai/coach", &body("coach", "hello")),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");
        assert_eq!(model.moderation_calls(), 0);
    }

    #[tokio::test]
    async fn oversized_body_is_413() {
        let (service, _) = build_service(Some(Arc::new(FakeModel::default())), configured_settings());

        let (status, _, body) = send(
            app(test_state(service)),
            json_post(
                "/v1/ai/coach",
                &body("coach", &"a".repeat(MAX_JSON_BODY_BYTES)),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "payload_too_large");
    }

    #[tokio::test]
    async fn empty_messages_are_400() {
        let (service, _) = build_service(Some(Arc::new(FakeModel::default())), configured_settings());

        let (status, _, body) = send(
            app(test_state(service)),
            json_post("/v1/ai/coach", &json!({ "mode": "coach", "messages": [] })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "messages");
    }

    #[tokio::test]
    async fn unknown_mode_is_400() {
        let (service, _) = build_service(Some(Arc::new(FakeModel::default())), configured_settings());

        let (status, _, _) = send(
            app(test_state(service)),
            json_post("/v1/ai/coach", &body("hypnosis", "hello")),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
