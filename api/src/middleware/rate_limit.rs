use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{HeaderValue, Request, Response, StatusCode};
use tower_governor::{
    GovernorError, GovernorLayer, governor::GovernorConfigBuilder, key_extractor::KeyExtractor,
};

use crate::limiter::client_ip;

type RateLimitLayer =
    GovernorLayer<ClientIpKeyExtractor, governor::middleware::NoOpMiddleware, axum::body::Body>;

/// Keys the flood guard on the same client address the per-caller limiter
/// uses, so forwarding headers are honored only when they are trusted.
#[derive(Debug, Clone, Copy)]
pub struct ClientIpKeyExtractor {
    trust_proxy_headers: bool,
}

impl KeyExtractor for ClientIpKeyExtractor {
    type Key = String;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(client_ip(req.headers(), peer, self.trust_proxy_headers))
    }
}

/// Coarse per-IP flood guard for /v1/ai routes: bursts of 30, refilling one
/// request per second. Sits in front of the per-caller AI token bucket and
/// rejects floods before any body parsing.
pub fn flood_guard_layer(trust_proxy_headers: bool) -> RateLimitLayer {
    GovernorLayer::new(
        GovernorConfigBuilder::default()
            .per_second(1)
            .burst_size(30)
            .key_extractor(ClientIpKeyExtractor { trust_proxy_headers })
            .finish()
            .expect("invalid governor config for AI flood guard"),
    )
    .error_handler(json_error_handler)
}

/// Render governor rejections in the same `ApiError` shape as every other
/// error, with Retry-After in seconds.
fn json_error_handler(err: GovernorError) -> Response<axum::body::Body> {
    let (status, retry_after_secs, message) = match err {
        GovernorError::TooManyRequests { wait_time, .. } => (
            StatusCode::TOO_MANY_REQUESTS,
            Some(wait_time.max(1)),
            format!("Too many requests. Retry after {} seconds.", wait_time.max(1)),
        ),
        GovernorError::UnableToExtractKey => (
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
            "Unable to determine client identity for rate limiting".to_string(),
        ),
        GovernorError::Other { code, msg, .. } => {
            (code, None, msg.unwrap_or_default().to_string())
        }
    };

    let body = serde_json::json!({
        "error": reframe_core::error::codes::RATE_LIMITED,
        "message": message,
        "request_id": uuid::Uuid::now_v7().to_string(),
        "retry_after_ms": retry_after_secs.map(|secs| secs * 1000),
    });

    let mut response = Response::new(axum::body::Body::from(body.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        "content-type",
        HeaderValue::from_static("application/json"),
    );
    if let Some(secs) = retry_after_secs {
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert("retry-after", value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_many_requests_renders_api_error_with_retry_after() {
        let response = json_error_handler(GovernorError::TooManyRequests {
            wait_time: 7,
            headers: None,
        });
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get("retry-after").expect("retry-after"),
            "7"
        );
        assert_eq!(
            response.headers().get("content-type").expect("content-type"),
            "application/json"
        );
    }

    #[test]
    fn layer_builds_with_valid_config() {
        let _ = flood_guard_layer(true);
        let _ = flood_guard_layer(false);
    }

    fn spoofed_request() -> Request<()> {
        let mut req = Request::builder()
            .header("x-forwarded-for", "198.51.100.9")
            .body(())
            .expect("request");
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([203, 0, 113, 5], 40000))));
        req
    }

    #[test]
    fn forwarded_header_is_ignored_when_proxies_are_not_trusted() {
        let extractor = ClientIpKeyExtractor {
            trust_proxy_headers: false,
        };
        assert_eq!(
            extractor.extract(&spoofed_request()).expect("key"),
            "203.0.113.5"
        );
    }

    #[test]
    fn forwarded_header_keys_the_guard_when_proxies_are_trusted() {
        let extractor = ClientIpKeyExtractor {
            trust_proxy_headers: true,
        };
        assert_eq!(
            extractor.extract(&spoofed_request()).expect("key"),
            "198.51.100.9"
        );
    }
}
