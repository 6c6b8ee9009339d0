use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use reframe_core::error::ApiError;
use reframe_core::features::{
    Affirmation, AffirmationRequest, AiFeature, SkillsRecommendRequest, SkillsRecommendation,
    TodaySuggestions, TodaySuggestionsRequest, WeeklyRecap, WeeklyRecapRequest,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::caller::VerifiedCaller;
use crate::coach::Outcome;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/ai/weekly-recap", post(weekly_recap))
        .route("/v1/ai/today-suggestions", post(today_suggestions))
        .route("/v1/ai/skills-recommend", post(skills_recommend))
        .route("/v1/ai/affirmation", post(affirmation))
        .route("/v1/ai/status", get(ai_status))
}

#[derive(Serialize, ToSchema)]
pub struct FeatureStatus {
    pub feature: AiFeature,
    pub enabled: bool,
}

#[derive(Serialize, ToSchema)]
pub struct AiStatusResponse {
    /// Whether a language-model credential is configured
    pub configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub features: Vec<FeatureStatus>,
}

/// Summarize a week of check-ins
#[utoipa::path(
    post,
    path = "/v1/ai/weekly-recap",
    request_body = WeeklyRecapRequest,
    responses(
        (status = 200, description = "Recap, or a blocked safety response", body = WeeklyRecap),
        (status = 400, description = "Invalid request body", body = ApiError),
        (status = 429, description = "Rate limited", body = ApiError),
        (status = 500, description = "Model request failed", body = ApiError),
        (status = 503, description = "AI not configured or feature disabled", body = ApiError)
    ),
    tag = "ai"
)]
pub async fn weekly_recap(
    State(state): State<AppState>,
    VerifiedCaller(caller): VerifiedCaller,
    AppJson(req): AppJson<WeeklyRecapRequest>,
) -> Result<Json<Outcome<WeeklyRecap>>, AppError> {
    req.validate()?;
    Ok(Json(state.coach.weekly_recap(&caller, req).await?))
}

/// Suggest small activities for today
#[utoipa::path(
    post,
    path = "/v1/ai/today-suggestions",
    request_body = TodaySuggestionsRequest,
    responses(
        (status = 200, description = "Suggestions, or a blocked safety response", body = TodaySuggestions),
        (status = 400, description = "Invalid request body", body = ApiError),
        (status = 429, description = "Rate limited", body = ApiError),
        (status = 500, description = "Model request failed", body = ApiError),
        (status = 503, description = "AI not configured or feature disabled", body = ApiError)
    ),
    tag = "ai"
)]
pub async fn today_suggestions(
    State(state): State<AppState>,
    VerifiedCaller(caller): VerifiedCaller,
    AppJson(req): AppJson<TodaySuggestionsRequest>,
) -> Result<Json<Outcome<TodaySuggestions>>, AppError> {
    req.validate()?;
    Ok(Json(state.coach.today_suggestions(&caller, req).await?))
}

/// Recommend skills from the library
#[utoipa::path(
    post,
    path = "/v1/ai/skills-recommend",
    request_body = SkillsRecommendRequest,
    responses(
        (status = 200, description = "Recommendations, or a blocked safety response", body = SkillsRecommendation),
        (status = 400, description = "Invalid request body", body = ApiError),
        (status = 429, description = "Rate limited", body = ApiError),
        (status = 500, description = "Model request failed", body = ApiError),
        (status = 503, description = "AI not configured or feature disabled", body = ApiError)
    ),
    tag = "ai"
)]
pub async fn skills_recommend(
    State(state): State<AppState>,
    VerifiedCaller(caller): VerifiedCaller,
    AppJson(req): AppJson<SkillsRecommendRequest>,
) -> Result<Json<Outcome<SkillsRecommendation>>, AppError> {
    req.validate()?;
    Ok(Json(state.coach.skills_recommend(&caller, req).await?))
}

/// Write a short affirmation
#[utoipa::path(
    post,
    path = "/v1/ai/affirmation",
    request_body = AffirmationRequest,
    responses(
        (status = 200, description = "Affirmation, or a blocked safety response", body = Affirmation),
        (status = 400, description = "Invalid request body", body = ApiError),
        (status = 429, description = "Rate limited", body = ApiError),
        (status = 500, description = "Model request failed", body = ApiError),
        (status = 503, description = "AI not configured or feature disabled", body = ApiError)
    ),
    tag = "ai"
)]
pub async fn affirmation(
    State(state): State<AppState>,
    VerifiedCaller(caller): VerifiedCaller,
    AppJson(req): AppJson<AffirmationRequest>,
) -> Result<Json<Outcome<Affirmation>>, AppError> {
    req.validate()?;
    Ok(Json(state.coach.affirmation(&caller, req).await?))
}

/// Which AI features this server offers
#[utoipa::path(
    get,
    path = "/v1/ai/status",
    responses((status = 200, description = "AI availability", body = AiStatusResponse)),
    tag = "ai"
)]
pub async fn ai_status(State(state): State<AppState>) -> Json<AiStatusResponse> {
    let settings = state.coach.settings();
    Json(AiStatusResponse {
        configured: state.coach.is_configured(),
        provider: state.coach.provider_name().map(str::to_string),
        features: AiFeature::ALL
            .into_iter()
            .map(|feature| FeatureStatus {
                feature,
                enabled: settings.feature_enabled(feature),
            })
            .collect(),
    })
}
