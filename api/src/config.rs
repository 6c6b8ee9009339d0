use std::time::Duration;

use reframe_core::features::AiFeature;

use crate::limiter::DEFAULT_RPM;
use crate::provider::openai::DEFAULT_BASE_URL;
use crate::runner::{DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT, RunnerSettings};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_MODERATION_MODEL: &str = "omni-moderation-latest";

/// AI pipeline configuration, read once at startup.
///
/// No `Debug`: the struct holds the provider credential.
#[derive(Clone)]
pub struct AiSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub moderation_model: String,
    pub rpm: u32,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub audit: bool,
    disabled_features: Vec<AiFeature>,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            moderation_model: DEFAULT_MODERATION_MODEL.to_string(),
            rpm: DEFAULT_RPM,
            request_timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::ZERO,
            audit: false,
            disabled_features: Vec::new(),
        }
    }
}

impl AiSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source. Unparseable values
    /// fall back to their defaults with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let disabled_features = AiFeature::ALL
            .into_iter()
            .filter(|feature| {
                let key = format!("REFRAME_AI_{}_ENABLED", feature.as_str().to_ascii_uppercase());
                !parse_or(&key, get(&key), true)
            })
            .collect();

        Self {
            api_key: get("OPENAI_API_KEY"),
            base_url: get("REFRAME_AI_BASE_URL").unwrap_or(defaults.base_url),
            model: get("REFRAME_AI_MODEL").unwrap_or(defaults.model),
            moderation_model: get("REFRAME_AI_MODERATION_MODEL")
                .unwrap_or(defaults.moderation_model),
            rpm: parse_or("REFRAME_AI_RPM", get("REFRAME_AI_RPM"), defaults.rpm).max(1),
            request_timeout: Duration::from_millis(parse_or(
                "REFRAME_AI_TIMEOUT_MS",
                get("REFRAME_AI_TIMEOUT_MS"),
                defaults.request_timeout.as_millis() as u64,
            )),
            max_retries: parse_or(
                "REFRAME_AI_MAX_RETRIES",
                get("REFRAME_AI_MAX_RETRIES"),
                defaults.max_retries,
            ),
            retry_backoff: Duration::from_millis(parse_or(
                "REFRAME_AI_RETRY_BACKOFF_MS",
                get("REFRAME_AI_RETRY_BACKOFF_MS"),
                0,
            )),
            audit: parse_or("REFRAME_AI_AUDIT", get("REFRAME_AI_AUDIT"), false),
            disabled_features,
        }
    }

    pub fn feature_enabled(&self, feature: AiFeature) -> bool {
        !self.disabled_features.contains(&feature)
    }

    pub fn with_feature_disabled(mut self, feature: AiFeature) -> Self {
        if !self.disabled_features.contains(&feature) {
            self.disabled_features.push(feature);
        }
        self
    }

    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings {
            request_timeout: self.request_timeout,
            max_retries: self.max_retries,
            retry_backoff: self.retry_backoff,
            audit: self.audit,
        }
    }
}

trait EnvValue: Sized {
    fn parse_env(raw: &str) -> Option<Self>;
}

impl EnvValue for bool {
    fn parse_env(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }
}

macro_rules! numeric_env_value {
    ($($ty:ty),*) => {
        $(impl EnvValue for $ty {
            fn parse_env(raw: &str) -> Option<Self> {
                raw.parse().ok()
            }
        })*
    };
}

numeric_env_value!(u32, u64);

fn parse_or<T: EnvValue>(key: &str, raw: Option<String>, default: T) -> T {
    let Some(raw) = raw else {
        return default;
    };
    T::parse_env(&raw).unwrap_or_else(|| {
        tracing::warn!(key, value = %raw, "ignoring unparseable setting");
        default
    })
}

/// Whether `X-Forwarded-For` / `X-Real-IP` are trusted for client identity.
pub fn trust_proxy_headers_from_env() -> bool {
    parse_or(
        "REFRAME_TRUST_PROXY_HEADERS",
        std::env::var("REFRAME_TRUST_PROXY_HEADERS").ok(),
        true,
    )
}
