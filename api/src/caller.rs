use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;

use crate::coach::{AuthenticatedUser, Caller};
use crate::error::AppError;
use crate::limiter::client_ip;
use crate::state::AppState;

/// Caller that passed bot protection, keyed for rate limiting.
///
/// Runs before the body is read, so a failed bot check is a 403 regardless
/// of the payload.
pub struct VerifiedCaller(pub Caller);

impl FromRequestParts<AppState> for VerifiedCaller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        state.bot_protection.verify(&parts.headers)?;

        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(Self(Caller::user(user.user_id)));
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let ip = client_ip(&parts.headers, peer, state.trust_proxy_headers);
        Ok(Self(Caller::anonymous(&ip)))
    }
}
