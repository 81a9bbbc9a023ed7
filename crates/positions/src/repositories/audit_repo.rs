//! Append-only Postgres audit sink.

use crate::models::audit::{AuditRecord, AuditSink};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    /// Creates a new sink instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO audit_records
                (id, position_id, instrument, venue, timeframe, decision,
                 size_fraction, aggression, exit_pressure, snapshot, outcome, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ",
        )
        .bind(record.id)
        .bind(record.position_id)
        .bind(&record.instrument)
        .bind(&record.venue)
        .bind(record.timeframe.as_str())
        .bind(&record.decision)
        .bind(record.size_fraction)
        .bind(record.aggression)
        .bind(record.exit_pressure)
        .bind(&record.snapshot)
        .bind(serde_json::to_value(&record.outcome)?)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to append audit record")?;
        Ok(())
    }
}
