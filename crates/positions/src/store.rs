//! Position store: the unit of mutation is one position row.
//!
//! Only the orchestrator mutates status and holdings, only the trend engine's
//! caller mutates the cached trend output, and only the scoring step mutates
//! the cached scores; the store just makes each mutation atomic per row.

use crate::models::position::{FeatureSet, Position, PositionStatus};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use folio_core::types::{OrderFill, OrderSide};
use folio_core::Timeframe;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Result of applying an execution to a position.
#[derive(Debug, Clone)]
pub struct ExecutionApplied {
    pub position: Position,
    /// Present when the fill moved the position across a lifecycle boundary.
    pub status_change: Option<(PositionStatus, PositionStatus)>,
}

#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Positions the orchestrator may trade: watchlist or active.
    async fn eligible_positions(&self, timeframe: Timeframe) -> Result<Vec<Position>>;

    /// Dormant positions, returned so the trend engine can converge their
    /// state without producing tradable signals.
    async fn bootstrap_positions(&self, timeframe: Timeframe) -> Result<Vec<Position>>;

    async fn get(&self, id: Uuid) -> Result<Option<Position>>;

    /// Inserts or replaces a position. The (instrument, venue, timeframe)
    /// triple is unique; upserting an existing triple replaces that row.
    async fn upsert(&self, position: Position) -> Result<()>;

    /// Atomically replaces the feature bag.
    async fn refresh_features(&self, id: Uuid, features: FeatureSet) -> Result<()>;

    /// Records the latest history bar count and performs the
    /// dormant-to-watchlist promotion at the threshold. Returns the status
    /// after the update.
    async fn record_bars_count(
        &self,
        id: Uuid,
        bars_count: u64,
        min_bars: u64,
    ) -> Result<PositionStatus>;

    /// Atomic check-and-set for the idempotency window: returns `true` and
    /// stamps the execution time if no execution was attempted within
    /// `window`, `false` otherwise. The cooperative guard against two
    /// overlapping ticks executing the same position.
    async fn try_claim_execution(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<bool>;

    /// Applies an executed fill atomically: holdings delta plus the
    /// watchlist/active transitions.
    async fn record_execution(
        &self,
        id: Uuid,
        side: OrderSide,
        fill: &OrderFill,
    ) -> Result<ExecutionApplied>;

    /// Manual/external status override (pause, archive, resume).
    async fn set_status(&self, id: Uuid, status: PositionStatus) -> Result<()>;
}

/// In-memory store used by tests and paper operation. All row mutations go
/// through the single write lock, which makes each of them atomic.
#[derive(Default)]
pub struct InMemoryPositionStore {
    rows: RwLock<HashMap<Uuid, Position>>,
}

impl InMemoryPositionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn missing(id: Uuid) -> anyhow::Error {
        anyhow!("position {id} not found")
    }
}

#[async_trait]
impl PositionStore for InMemoryPositionStore {
    async fn eligible_positions(&self, timeframe: Timeframe) -> Result<Vec<Position>> {
        let rows = self.rows.read().await;
        let mut out: Vec<Position> = rows
            .values()
            .filter(|p| p.timeframe == timeframe && p.status.is_eligible())
            .cloned()
            .collect();
        out.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(out)
    }

    async fn bootstrap_positions(&self, timeframe: Timeframe) -> Result<Vec<Position>> {
        let rows = self.rows.read().await;
        let mut out: Vec<Position> = rows
            .values()
            .filter(|p| p.timeframe == timeframe && p.status == PositionStatus::Dormant)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(out)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Position>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn upsert(&self, position: Position) -> Result<()> {
        let mut rows = self.rows.write().await;
        let duplicate = rows
            .values()
            .any(|p| p.id != position.id && p.key() == position.key());
        if duplicate {
            return Err(anyhow!(
                "position for {} already exists",
                position.key()
            ));
        }
        rows.insert(position.id, position);
        Ok(())
    }

    async fn refresh_features(&self, id: Uuid, features: FeatureSet) -> Result<()> {
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(&id).ok_or_else(|| Self::missing(id))?;
        row.features = features;
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn record_bars_count(
        &self,
        id: Uuid,
        bars_count: u64,
        min_bars: u64,
    ) -> Result<PositionStatus> {
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(&id).ok_or_else(|| Self::missing(id))?;
        row.bars_count = bars_count;
        if row.status == PositionStatus::Dormant && bars_count >= min_bars {
            row.status = PositionStatus::Watchlist;
            tracing::info!(
                position = %row.key(),
                bars = bars_count,
                "history threshold reached, promoting to watchlist"
            );
        }
        row.updated_at = Utc::now();
        Ok(row.status)
    }

    async fn try_claim_execution(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<bool> {
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(&id).ok_or_else(|| Self::missing(id))?;
        if let Some(last) = row.last_execution_at {
            if now - last < window {
                return Ok(false);
            }
        }
        row.last_execution_at = Some(now);
        row.updated_at = now;
        Ok(true)
    }

    async fn record_execution(
        &self,
        id: Uuid,
        side: OrderSide,
        fill: &OrderFill,
    ) -> Result<ExecutionApplied> {
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(&id).ok_or_else(|| Self::missing(id))?;

        let before = row.status;
        row.holdings.apply_fill(side, fill);

        let after = match before {
            PositionStatus::Watchlist if row.holdings.quantity > Decimal::ZERO => {
                PositionStatus::Active
            }
            PositionStatus::Active if row.holdings.quantity == Decimal::ZERO => {
                // A full exit keeps the position tradable, it is not archived.
                PositionStatus::Watchlist
            }
            other => other,
        };
        row.status = after;
        row.updated_at = Utc::now();

        Ok(ExecutionApplied {
            position: row.clone(),
            status_change: (before != after).then_some((before, after)),
        })
    }

    async fn set_status(&self, id: Uuid, status: PositionStatus) -> Result<()> {
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(&id).ok_or_else(|| Self::missing(id))?;
        row.status = status;
        row.updated_at = Utc::now();
        Ok(())
    }
}
