//! Timeout and bounded retry around a single provider call.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use uuid::Uuid;

use crate::provider::ProviderError;
use crate::store::{AiAuditRecord, EventStore};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(25_000);
pub const DEFAULT_MAX_RETRIES: u32 = 2;
const MAX_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct RunnerSettings {
    pub request_timeout: Duration,
    /// Extra attempts after the first, for retryable errors only
    pub max_retries: u32,
    /// Base delay between attempts; zero retries immediately
    pub retry_backoff: Duration,
    pub audit: bool,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::ZERO,
            audit: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunContext {
    pub feature: &'static str,
    pub user_id: Option<Uuid>,
    pub metadata: serde_json::Value,
}

impl RunContext {
    pub fn new(feature: &'static str, user_id: Option<Uuid>) -> Self {
        Self {
            feature,
            user_id,
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Clone)]
pub struct ModelRunner {
    settings: RunnerSettings,
    events: Arc<dyn EventStore>,
}

impl ModelRunner {
    pub fn new(settings: RunnerSettings, events: Arc<dyn EventStore>) -> Self {
        Self { settings, events }
    }

    /// Run `call` with the configured timeout and retry policy. `call` is
    /// invoked once per attempt; a timed-out attempt is dropped, which
    /// cancels the in-flight request.
    pub async fn run<T, F, Fut>(&self, ctx: RunContext, call: F) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.execute(ctx, self.settings.max_retries, call).await
    }

    /// Single attempt with the configured timeout, no retries.
    pub async fn run_once<T, F, Fut>(&self, ctx: RunContext, call: F) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.execute(ctx, 0, call).await
    }

    async fn execute<T, F, Fut>(
        &self,
        ctx: RunContext,
        max_retries: u32,
        call: F,
    ) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let started = Instant::now();
        let timeout_ms = self.settings.request_timeout.as_millis() as u64;
        let mut attempts = 0;

        let result = loop {
            attempts += 1;
            let outcome = match tokio::time::timeout(self.settings.request_timeout, call()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ProviderError::Timeout(timeout_ms)),
            };

            match outcome {
                Ok(value) => break Ok(value),
                Err(err) if err.is_retryable() && attempts <= max_retries => {
                    tracing::warn!(
                        feature = ctx.feature,
                        attempt = attempts,
                        error = %err,
                        "model call failed, retrying"
                    );
                    let delay = backoff_delay(self.settings.retry_backoff, attempts);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(err) => break Err(err),
            }
        };

        if self.settings.audit {
            self.events.record_ai_audit(AiAuditRecord {
                feature: ctx.feature,
                user_id: ctx.user_id,
                latency_ms: started.elapsed().as_millis() as u64,
                attempts,
                success: result.is_ok(),
                error: result.as_ref().err().map(ToString::to_string),
                metadata: ctx.metadata,
            });
        }

        result
    }
}

/// Exponential backoff with full jitter: uniform in `[0, base * 2^(attempt-1)]`,
/// capped at five seconds.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    if base.is_zero() {
        return Duration::ZERO;
    }
    let exp = base
        .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
        .min(MAX_BACKOFF);
    let ceiling = exp.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingEventStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn runner(settings: RunnerSettings) -> (ModelRunner, Arc<RecordingEventStore>) {
        let events = Arc::new(RecordingEventStore::default());
        (ModelRunner::new(settings, events.clone()), events)
    }

    fn ctx() -> RunContext {
        RunContext::new("coach", None)
    }

    #[tokio::test]
    async fn retryable_errors_are_retried_up_to_the_limit() {
        let (runner, _) = runner(RunnerSettings::default());
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = runner
            .run(ctx(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Status {
                    status: 503,
                    message: "overloaded".into(),
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn success_after_a_transient_failure_is_returned() {
        let (runner, _) = runner(RunnerSettings::default());
        let calls = &AtomicU32::new(0);

        let result = runner
            .run(ctx(), move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ProviderError::Connection("reset".into()))
                } else {
                    Ok("fine")
                }
            })
            .await;

        assert_eq!(result.expect("second attempt succeeds"), "fine");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let (runner, _) = runner(RunnerSettings::default());
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = runner
            .run(ctx(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Status {
                    status: 401,
                    message: "bad key".into(),
                })
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Status { status: 401, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_calls_time_out_and_count_as_attempts() {
        let (runner, _) = runner(RunnerSettings {
            request_timeout: Duration::from_millis(20),
            max_retries: 1,
            ..RunnerSettings::default()
        });
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = runner
            .run(ctx(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Timeout(20))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn run_once_never_retries() {
        let (runner, _) = runner(RunnerSettings::default());
        let calls = &AtomicU32::new(0);

        let _: Result<(), _> = runner
            .run_once(ctx(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Timeout(1))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn audit_emits_one_record_per_run() {
        let (runner, events) = runner(RunnerSettings {
            audit: true,
            ..RunnerSettings::default()
        });
        let calls = &AtomicU32::new(0);

        let _ = runner
            .run(ctx(), move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ProviderError::StructuredOutput("missing field".into()))
                } else {
                    Ok(())
                }
            })
            .await;

        let audits = events.audits();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].attempts, 3);
        assert!(audits[0].success);
    }

    #[test]
    fn zero_backoff_means_immediate_retry() {
        assert_eq!(backoff_delay(Duration::ZERO, 3), Duration::ZERO);
    }

    #[test]
    fn backoff_is_bounded_by_exponential_ceiling() {
        for attempt in 1..=4 {
            let delay = backoff_delay(Duration::from_millis(100), attempt);
            assert!(delay <= Duration::from_millis(100 * (1 << (attempt - 1))));
        }
        assert!(backoff_delay(Duration::from_secs(10), 10) <= MAX_BACKOFF);
    }
}
