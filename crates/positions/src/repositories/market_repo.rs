//! Read-only adapter over the indicator snapshots the external data jobs
//! keep fresh.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use folio_core::types::IndicatorSnapshot;
use folio_core::{MarketDataProvider, Timeframe};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct PgMarketDataProvider {
    pool: PgPool,
}

impl PgMarketDataProvider {
    /// Creates a new provider instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MarketDataProvider for PgMarketDataProvider {
    async fn bar_count(&self, instrument: &str, timeframe: Timeframe) -> Result<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM indicator_snapshots WHERE instrument = $1 AND timeframe = $2",
        )
        .bind(instrument)
        .bind(timeframe.as_str())
        .fetch_one(&self.pool)
        .await?;
        let n: i64 = row.try_get("n")?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    async fn snapshots(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<IndicatorSnapshot>> {
        let rows = sqlx::query(
            r"
            SELECT ts, close, low, ema_fast, ema_mid, ema_base, ema_long,
                   atr, rsi, adx, volume_deviation
            FROM indicator_snapshots
            WHERE instrument = $1 AND timeframe = $2
            ORDER BY ts DESC
            LIMIT $3
            ",
        )
        .bind(instrument)
        .bind(timeframe.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch indicator snapshots")?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows.iter().rev() {
            out.push(IndicatorSnapshot {
                close: row.try_get("close")?,
                low: row.try_get("low")?,
                ema_fast: row.try_get("ema_fast")?,
                ema_mid: row.try_get("ema_mid")?,
                ema_base: row.try_get("ema_base")?,
                ema_long: row.try_get("ema_long")?,
                atr: row.try_get("atr")?,
                rsi: row.try_get("rsi")?,
                adx: row.try_get("adx")?,
                volume_deviation: row.try_get("volume_deviation")?,
                timestamp: row.try_get("ts")?,
            });
        }
        Ok(out)
    }

    async fn latest_price(&self, instrument: &str) -> Result<Decimal> {
        let row = sqlx::query(
            r"
            SELECT close FROM indicator_snapshots
            WHERE instrument = $1
            ORDER BY ts DESC
            LIMIT 1
            ",
        )
        .bind(instrument)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| anyhow!("no price data for {instrument}"))?;
        Ok(row.try_get("close")?)
    }
}
