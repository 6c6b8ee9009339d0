use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod bot_protection;
mod caller;
mod coach;
mod config;
mod error;
mod extract;
mod limiter;
mod middleware;
mod moderation;
mod provider;
mod routes;
mod runner;
mod state;
mod store;
#[cfg(test)]
mod test_support;

use crate::coach::CoachService;
use crate::config::AiSettings;
use crate::limiter::InMemoryRateLimitStore;
use crate::provider::LanguageModel;
use crate::provider::openai::OpenAiProvider;
use crate::store::{EventStore, LogEventStore, PgEventStore};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Reframe AI API",
        version = "0.1.0",
        description = "Safety-gated AI coaching for the Reframe CBT self-help app."
    ),
    paths(
        routes::health::health_check,
        routes::coach::coach,
        routes::features::weekly_recap,
        routes::features::today_suggestions,
        routes::features::skills_recommend,
        routes::features::affirmation,
        routes::features::ai_status,
    ),
    components(schemas(
        HealthResponse,
        reframe_core::error::ApiError,
        reframe_core::coaching::ChatRole,
        reframe_core::coaching::ChatMessage,
        reframe_core::coaching::CoachMode,
        reframe_core::coaching::CoachContext,
        reframe_core::coaching::CoachSettings,
        reframe_core::coaching::CoachRequest,
        reframe_core::coaching::CoachResult,
        reframe_core::coaching::CoachReply,
        reframe_core::coaching::ToolSuggestion,
        reframe_core::coaching::ToolSuggestionType,
        reframe_core::coaching::DistortionItem,
        reframe_core::coaching::DistortionsResult,
        reframe_core::coaching::SocraticResult,
        reframe_core::coaching::ReframeResult,
        reframe_core::coaching::SafetyCategory,
        reframe_core::coaching::BlockedResponse,
        reframe_core::features::AiFeature,
        reframe_core::features::MoodEntry,
        reframe_core::features::WeeklyRecapRequest,
        reframe_core::features::WeeklyRecap,
        reframe_core::features::TodaySuggestionsRequest,
        reframe_core::features::TodaySuggestion,
        reframe_core::features::TodaySuggestions,
        reframe_core::features::SkillsRecommendRequest,
        reframe_core::features::SkillRecommendation,
        reframe_core::features::SkillsRecommendation,
        reframe_core::features::AffirmationRequest,
        reframe_core::features::Affirmation,
        routes::features::AiStatusResponse,
        routes::features::FeatureStatus,
    )),
    tags(
        (name = "ai", description = "Screened, rate-limited AI endpoints"),
        (name = "system", description = "Service health")
    )
)]
struct ApiDoc;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// "ok", "unavailable" or "not_configured"
    pub database: String,
    /// "configured" or "not_configured"
    pub ai: String,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reframe_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Database is optional; without it safety events and audits are only logged
    let db = match std::env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()) {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(&database_url)
                .await
                .expect("Failed to connect to database");

            sqlx::migrate!("../migrations")
                .run(&pool)
                .await
                .expect("Failed to run migrations");
            Some(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, safety events will only be logged");
            None
        }
    };

    let events: Arc<dyn EventStore> = match &db {
        Some(pool) => Arc::new(PgEventStore::new(pool.clone())),
        None => Arc::new(LogEventStore),
    };

    let settings = AiSettings::from_env();
    let provider: Option<Arc<dyn LanguageModel>> = settings.api_key.as_ref().map(|key| {
        Arc::new(OpenAiProvider::new(
            settings.base_url.clone(),
            key.clone(),
            settings.model.clone(),
            settings.moderation_model.clone(),
        )) as Arc<dyn LanguageModel>
    });
    if provider.is_none() {
        tracing::warn!("OPENAI_API_KEY not set, AI endpoints will answer 503");
    }

    let coach = CoachService::new(
        settings,
        provider,
        Arc::new(InMemoryRateLimitStore::new()),
        events,
    );

    let app_state = state::AppState {
        db,
        coach: Arc::new(coach),
        bot_protection: bot_protection::BotProtection::from_env(),
        trust_proxy_headers: config::trust_proxy_headers_from_env(),
    };

    if app_state.bot_protection.is_enabled() {
        tracing::info!("Bot protection enabled for AI routes");
    }

    // CORS
    let cors_layer = middleware::cors::build_cors_layer();

    let ai_routes = Router::new()
        .merge(routes::coach::router())
        .merge(routes::features::router())
        .layer(middleware::rate_limit::flood_guard_layer(
            app_state.trust_proxy_headers,
        ));

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(ai_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        )
        .with_state(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Reframe AI API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
