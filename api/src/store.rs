//! Persistence of safety events and AI audit records.
//!
//! Writes never sit on the request path: `PgEventStore` spawns each insert and
//! only logs failures. Without a database, `LogEventStore` emits the same
//! records as tracing events.

use chrono::{DateTime, Utc};
use reframe_core::coaching::SafetyCategory;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetySource {
    Heuristic,
    Moderation,
}

impl SafetySource {
    pub fn as_str(self) -> &'static str {
        match self {
            SafetySource::Heuristic => "heuristic",
            SafetySource::Moderation => "moderation",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SafetyEvent {
    pub id: Uuid,
    pub feature: &'static str,
    pub category: SafetyCategory,
    pub source: SafetySource,
    /// SHA-256 of the rate-limit key; the raw IP or user id is never stored
    pub caller_hash: String,
    pub created_at: DateTime<Utc>,
}

impl SafetyEvent {
    pub fn new(
        feature: &'static str,
        category: SafetyCategory,
        source: SafetySource,
        rate_key: &str,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            feature,
            category,
            source,
            caller_hash: hash_caller(rate_key),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AiAuditRecord {
    pub feature: &'static str,
    pub user_id: Option<Uuid>,
    pub latency_ms: u64,
    pub attempts: u32,
    pub success: bool,
    pub error: Option<String>,
    pub metadata: serde_json::Value,
}

pub fn hash_caller(rate_key: &str) -> String {
    hex::encode(Sha256::digest(rate_key.as_bytes()))
}

pub trait EventStore: Send + Sync {
    fn record_safety_event(&self, event: SafetyEvent);
    fn record_ai_audit(&self, record: AiAuditRecord);
}

fn log_safety_event(event: &SafetyEvent) {
    tracing::warn!(
        event_id = %event.id,
        feature = event.feature,
        category = event.category.as_str(),
        source = event.source.as_str(),
        caller_hash = %event.caller_hash,
        "request blocked by safety screen"
    );
}

fn log_ai_audit(record: &AiAuditRecord) {
    tracing::info!(
        feature = record.feature,
        user_id = ?record.user_id,
        latency_ms = record.latency_ms,
        attempts = record.attempts,
        success = record.success,
        error = record.error.as_deref(),
        metadata = %record.metadata,
        "ai audit"
    );
}

/// Tracing-only store, used when no database is configured.
#[derive(Debug, Default)]
pub struct LogEventStore;

impl EventStore for LogEventStore {
    fn record_safety_event(&self, event: SafetyEvent) {
        log_safety_event(&event);
    }

    fn record_ai_audit(&self, record: AiAuditRecord) {
        log_ai_audit(&record);
    }
}

/// Postgres store. Each record is logged, then inserted on a spawned task.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl EventStore for PgEventStore {
    fn record_safety_event(&self, event: SafetyEvent) {
        log_safety_event(&event);
        let pool = self.pool.clone();
        tokio::spawn(async move {
            if let Err(e) = sqlx::query(
                "INSERT INTO ai_safety_events \
                 (id, feature, category, source, caller_hash, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(event.id)
            .bind(event.feature)
            .bind(event.category.as_str())
            .bind(event.source.as_str())
            .bind(&event.caller_hash)
            .bind(event.created_at)
            .execute(&pool)
            .await
            {
                tracing::warn!(error = %e, "Failed to insert safety event");
            }
        });
    }

    fn record_ai_audit(&self, record: AiAuditRecord) {
        log_ai_audit(&record);
        let pool = self.pool.clone();
        tokio::spawn(async move {
            if let Err(e) = sqlx::query(
                "INSERT INTO ai_audit_log \
                 (id, feature, user_id, latency_ms, attempts, success, error, metadata) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(Uuid::now_v7())
            .bind(record.feature)
            .bind(record.user_id)
            .bind(i64::try_from(record.latency_ms).unwrap_or(i64::MAX))
            .bind(i32::try_from(record.attempts).unwrap_or(i32::MAX))
            .bind(record.success)
            .bind(record.error.as_deref())
            .bind(&record.metadata)
            .execute(&pool)
            .await
            {
                tracing::warn!(error = %e, "Failed to insert AI audit record");
            }
        });
    }
}
