use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::CorsLayer;

use crate::bot_protection::BOT_TOKEN_HEADER;

const DEFAULT_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

/// Build a CORS layer from the `REFRAME_CORS_ORIGINS` env var.
///
/// - Origins: comma-separated list (default: local web dev servers)
/// - Methods: GET, POST, OPTIONS
/// - Headers: Authorization, Content-Type, the bot-protection token
/// - Credentials: allowed
/// - Max age: 3600s
pub fn build_cors_layer() -> CorsLayer {
    let origins_str =
        std::env::var("REFRAME_CORS_ORIGINS").unwrap_or_else(|_| DEFAULT_ORIGINS.to_string());
    cors_layer_for(&parse_origins(&origins_str))
}

fn parse_origins(raw: &str) -> Vec<HeaderValue> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect()
}

fn cors_layer_for(origins: &[HeaderValue]) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origins.to_vec())
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("authorization"),
            HeaderName::from_static("content-type"),
            HeaderName::from_static(BOT_TOKEN_HEADER),
        ])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}
