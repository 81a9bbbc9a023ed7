//! Postgres-backed position store.

use crate::models::position::{FeatureSet, Holdings, Position, PositionStatus};
use crate::store::{ExecutionApplied, PositionStore};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use folio_core::types::{OrderFill, OrderSide};
use folio_core::Timeframe;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Repository for position rows. Row-level atomicity comes from single
/// UPDATE statements or short transactions with `FOR UPDATE`.
#[derive(Debug, Clone)]
pub struct PgPositionStore {
    pool: PgPool,
}

impl PgPositionStore {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_position(row: &PgRow) -> Result<Position> {
        let timeframe: String = row.try_get("timeframe")?;
        let status: String = row.try_get("status")?;
        let features: serde_json::Value = row.try_get("features")?;
        let bars_count: i64 = row.try_get("bars_count")?;

        Ok(Position {
            id: row.try_get("id")?,
            instrument: row.try_get("instrument")?,
            venue: row.try_get("venue")?,
            timeframe: Timeframe::parse(&timeframe)
                .ok_or_else(|| anyhow!("unknown timeframe {timeframe}"))?,
            status: PositionStatus::parse(&status)
                .ok_or_else(|| anyhow!("unknown status {status}"))?,
            allocation_cap: row.try_get("allocation_cap")?,
            holdings: Holdings {
                quantity: row.try_get("quantity")?,
                invested: row.try_get("invested")?,
                extracted: row.try_get("extracted")?,
            },
            features: serde_json::from_value(features).unwrap_or_default(),
            bars_count: u64::try_from(bars_count).unwrap_or(0),
            last_execution_at: row.try_get("last_execution_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn by_status(&self, timeframe: Timeframe, statuses: &[&str]) -> Result<Vec<Position>> {
        let statuses: Vec<String> = statuses.iter().map(|s| (*s).to_string()).collect();
        let rows = sqlx::query(
            r"
            SELECT * FROM positions
            WHERE timeframe = $1 AND status = ANY($2)
            ORDER BY instrument, venue
            ",
        )
        .bind(timeframe.as_str())
        .bind(statuses)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch positions")?;

        rows.iter().map(Self::row_to_position).collect()
    }
}

#[async_trait]
impl PositionStore for PgPositionStore {
    async fn eligible_positions(&self, timeframe: Timeframe) -> Result<Vec<Position>> {
        self.by_status(timeframe, &["watchlist", "active"]).await
    }

    async fn bootstrap_positions(&self, timeframe: Timeframe) -> Result<Vec<Position>> {
        self.by_status(timeframe, &["dormant"]).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Position>> {
        let row = sqlx::query("SELECT * FROM positions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_position).transpose()
    }

    async fn upsert(&self, position: Position) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO positions
                (id, instrument, venue, timeframe, status, allocation_cap,
                 quantity, invested, extracted, features, bars_count,
                 last_execution_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (instrument, venue, timeframe) DO UPDATE SET
                status = EXCLUDED.status,
                allocation_cap = EXCLUDED.allocation_cap,
                quantity = EXCLUDED.quantity,
                invested = EXCLUDED.invested,
                extracted = EXCLUDED.extracted,
                features = EXCLUDED.features,
                bars_count = EXCLUDED.bars_count,
                last_execution_at = EXCLUDED.last_execution_at,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(position.id)
        .bind(&position.instrument)
        .bind(&position.venue)
        .bind(position.timeframe.as_str())
        .bind(position.status.as_str())
        .bind(position.allocation_cap)
        .bind(position.holdings.quantity)
        .bind(position.holdings.invested)
        .bind(position.holdings.extracted)
        .bind(serde_json::to_value(&position.features)?)
        .bind(i64::try_from(position.bars_count).unwrap_or(i64::MAX))
        .bind(position.last_execution_at)
        .bind(position.created_at)
        .bind(position.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert position")?;
        Ok(())
    }

    async fn refresh_features(&self, id: Uuid, features: FeatureSet) -> Result<()> {
        sqlx::query("UPDATE positions SET features = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(serde_json::to_value(&features)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_bars_count(
        &self,
        id: Uuid,
        bars_count: u64,
        min_bars: u64,
    ) -> Result<PositionStatus> {
        let row = sqlx::query(
            r"
            UPDATE positions
            SET bars_count = $2,
                status = CASE
                    WHEN status = 'dormant' AND $2 >= $3 THEN 'watchlist'
                    ELSE status
                END,
                updated_at = now()
            WHERE id = $1
            RETURNING status
            ",
        )
        .bind(id)
        .bind(i64::try_from(bars_count).unwrap_or(i64::MAX))
        .bind(i64::try_from(min_bars).unwrap_or(i64::MAX))
        .fetch_one(&self.pool)
        .await?;

        let status: String = row.try_get("status")?;
        PositionStatus::parse(&status).ok_or_else(|| anyhow!("unknown status {status}"))
    }

    async fn try_claim_execution(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<bool> {
        let cutoff = now - window;
        let result = sqlx::query(
            r"
            UPDATE positions
            SET last_execution_at = $2, updated_at = $2
            WHERE id = $1
              AND (last_execution_at IS NULL OR last_execution_at <= $3)
            ",
        )
        .bind(id)
        .bind(now)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_execution(
        &self,
        id: Uuid,
        side: OrderSide,
        fill: &OrderFill,
    ) -> Result<ExecutionApplied> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM positions WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .context("Position disappeared during execution")?;
        let mut position = Self::row_to_position(&row)?;

        let before = position.status;
        position.holdings.apply_fill(side, fill);
        let after = match before {
            PositionStatus::Watchlist if position.holdings.quantity > Decimal::ZERO => {
                PositionStatus::Active
            }
            PositionStatus::Active if position.holdings.quantity == Decimal::ZERO => {
                PositionStatus::Watchlist
            }
            other => other,
        };
        position.status = after;
        position.updated_at = Utc::now();

        sqlx::query(
            r"
            UPDATE positions
            SET quantity = $2, invested = $3, extracted = $4, status = $5, updated_at = $6
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(position.holdings.quantity)
        .bind(position.holdings.invested)
        .bind(position.holdings.extracted)
        .bind(position.status.as_str())
        .bind(position.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ExecutionApplied {
            position,
            status_change: (before != after).then_some((before, after)),
        })
    }

    async fn set_status(&self, id: Uuid, status: PositionStatus) -> Result<()> {
        sqlx::query("UPDATE positions SET status = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
