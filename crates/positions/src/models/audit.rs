//! Immutable decision/audit records.
//!
//! One record per orchestrator evaluation of a position. Written once, never
//! mutated, consumed only by external analytics.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_core::Timeframe;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::position::PositionStatus;

/// What happened after the decision was made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The execution call succeeded.
    Executed {
        reference: String,
        price: Decimal,
        quantity: Decimal,
        notional: Decimal,
    },
    /// The execution call failed; the position was left in its prior state
    /// and no retry was attempted.
    Failed { error: String },
    /// A second attempt landed inside the idempotency window.
    SkippedDuplicate,
    /// Dry-run mode: decision computed and recorded, execution never called.
    DryRun,
    /// A hold decision; reasoning only, no execution.
    Held { reason: String },
    /// A lifecycle transition (e.g. a full exit reverting active to
    /// watchlist).
    StatusChanged {
        from: PositionStatus,
        to: PositionStatus,
    },
}

/// One immutable audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub position_id: Uuid,
    pub instrument: String,
    pub venue: String,
    pub timeframe: Timeframe,
    /// Decision type: `hold`, `add`, `trim`, `exit`, or `status`.
    pub decision: String,
    pub size_fraction: f64,
    pub aggression: f64,
    pub exit_pressure: f64,
    /// Full flag/state snapshot that justified the decision.
    pub snapshot: serde_json::Value,
    pub outcome: AuditOutcome,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        position_id: Uuid,
        instrument: impl Into<String>,
        venue: impl Into<String>,
        timeframe: Timeframe,
        decision: impl Into<String>,
        size_fraction: f64,
        aggression: f64,
        exit_pressure: f64,
        snapshot: serde_json::Value,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            position_id,
            instrument: instrument.into(),
            venue: venue.into(),
            timeframe,
            decision: decision.into(),
            size_fraction,
            aggression,
            exit_pressure,
            snapshot,
            outcome,
            created_at: Utc::now(),
        }
    }
}

/// Append-only sink for audit records. Never read back by this core.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Appends one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot persist the record; the caller
    /// logs it but never fails the trade path over it.
    async fn append(&self, record: AuditRecord) -> Result<()>;
}

/// In-memory sink for tests and paper operation.
#[derive(Default)]
pub struct InMemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far.
    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<()> {
        self.records.write().await.push(record);
        Ok(())
    }
}
