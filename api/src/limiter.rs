//! Per-caller token bucket for the AI endpoints.
//!
//! Each key gets a bucket of `rpm` tokens that refills continuously at
//! `rpm / 60_000` tokens per millisecond. An exhausted bucket puts the key
//! into a fixed cooldown, independent of `rpm`.
//!
//! `InMemoryRateLimitStore` keeps buckets for the life of the process and does
//! not coordinate across instances; a multi-instance deployment needs a
//! `RateLimitStore` backed by a shared counter service.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::HeaderMap;

pub const COOLDOWN: Duration = Duration::from_millis(45_000);
pub const DEFAULT_RPM: u32 = 20;
pub const LOOPBACK: &str = "127.0.0.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after_ms: u64,
}

impl RateLimitDecision {
    fn deny(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            retry_after_ms: (retry_after.as_millis() as u64).max(1),
        }
    }
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Refill, then try to consume one token for `key`.
    async fn check(&self, key: &str, rpm: u32) -> RateLimitDecision;
}

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    cooldown_until: Option<Instant>,
}

impl Bucket {
    fn full(rpm: u32, now: Instant) -> Self {
        Self {
            tokens: f64::from(rpm),
            last_refill: now,
            cooldown_until: None,
        }
    }

    fn check(&mut self, rpm: u32, now: Instant) -> RateLimitDecision {
        let capacity = f64::from(rpm);
        let elapsed_ms = now.saturating_duration_since(self.last_refill).as_secs_f64() * 1000.0;
        self.tokens = (self.tokens + elapsed_ms * capacity / 60_000.0).min(capacity);
        self.last_refill = now;

        if let Some(until) = self.cooldown_until
            && until > now
        {
            return RateLimitDecision::deny(until - now);
        }

        if self.tokens < 1.0 {
            self.cooldown_until = Some(now + COOLDOWN);
            return RateLimitDecision::deny(COOLDOWN);
        }

        self.tokens -= 1.0;
        self.cooldown_until = None;
        RateLimitDecision {
            allowed: true,
            remaining: self.tokens.floor() as u32,
            retry_after_ms: 0,
        }
    }
}

/// Process-local bucket map. A single mutex guards the whole map, so every
/// refill-and-consume for a key is atomic.
#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_at(&self, key: &str, rpm: u32, now: Instant) -> RateLimitDecision {
        let rpm = rpm.max(1);
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::full(rpm, now))
            .check(rpm, now)
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn check(&self, key: &str, rpm: u32) -> RateLimitDecision {
        self.check_at(key, rpm, Instant::now())
    }
}

/// Resolve the caller's address for rate limiting.
///
/// With `trust_forwarded` set, the first `X-Forwarded-For` entry wins, then
/// `X-Real-IP`. Those headers are only trustworthy behind a reverse proxy that
/// overwrites them; there is no proxy allowlist. Without them, the socket peer
/// is used, and loopback when even that is unknown.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> String {
    if trust_forwarded {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = real_ip {
            return ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| LOOPBACK.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn three_rapid_calls_drain_bucket_then_fourth_is_denied() {
        let store = InMemoryRateLimitStore::new();
        let now = Instant::now();

        let first = store.check_at("1.2.3.4", 3, now);
        let second = store.check_at("1.2.3.4", 3, now);
        let third = store.check_at("1.2.3.4", 3, now);
        assert!(first.allowed && second.allowed && third.allowed);
        assert_eq!(first.remaining, 2);
        assert_eq!(third.remaining, 0);

        let fourth = store.check_at("1.2.3.4", 3, now + Duration::from_millis(5));
        assert!(!fourth.allowed);
        assert_eq!(fourth.remaining, 0);
        assert_eq!(fourth.retry_after_ms, 45_000);
    }

    #[test]
    fn cooldown_holds_even_after_tokens_refill() {
        let store = InMemoryRateLimitStore::new();
        let start = Instant::now();
        for _ in 0..3 {
            store.check_at("k", 3, start);
        }
        assert!(!store.check_at("k", 3, start).allowed);

        // 30s refills 1.5 tokens, but the 45s cooldown is still running.
        let during = store.check_at("k", 3, start + Duration::from_secs(30));
        assert!(!during.allowed);
        assert_eq!(during.retry_after_ms, 15_000);

        let after = store.check_at("k", 3, start + Duration::from_secs(46));
        assert!(after.allowed);
    }

    #[test]
    fn tokens_refill_continuously_and_cap_at_rpm() {
        let store = InMemoryRateLimitStore::new();
        let start = Instant::now();
        store.check_at("k", 60, start);

        // 60 rpm refills one token per second; capacity stays at 60.
        let later = store.check_at("k", 60, start + Duration::from_secs(3600));
        assert!(later.allowed);
        assert_eq!(later.remaining, 59);
    }

    #[test]
    fn keys_are_isolated() {
        let store = InMemoryRateLimitStore::new();
        let now = Instant::now();
        store.check_at("a", 1, now);
        assert!(!store.check_at("a", 1, now).allowed);
        assert!(store.check_at("b", 1, now).allowed);
    }

    #[test]
    fn client_ip_prefers_first_forwarded_for_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_ip(&headers, None, true), "203.0.113.7");
    }

    #[test]
    fn client_ip_falls_back_to_real_ip_then_loopback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_ip(&headers, None, true), "198.51.100.2");
        assert_eq!(client_ip(&HeaderMap::new(), None, true), LOOPBACK);
    }

    #[test]
    fn client_ip_ignores_forwarding_headers_when_untrusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        let peer: SocketAddr = "192.0.2.10:55000".parse().expect("socket addr");
        assert_eq!(client_ip(&headers, Some(peer), false), "192.0.2.10");
    }
}
