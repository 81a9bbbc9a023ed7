//! Read-only adapter over the portfolio-phase rows appended by the phase
//! provider's own job.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use folio_core::types::{MarketPhase, PortfolioContext};
use folio_core::PhaseProvider;
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct PgPhaseProvider {
    pool: PgPool,
}

impl PgPhaseProvider {
    /// Creates a new provider instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PhaseProvider for PgPhaseProvider {
    async fn current(&self) -> Result<PortfolioContext> {
        let row = sqlx::query(
            "SELECT phase, cut_pressure, as_of FROM portfolio_phase ORDER BY as_of DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| anyhow!("no portfolio phase rows"))?;

        let phase: String = row.try_get("phase")?;
        Ok(PortfolioContext {
            phase: MarketPhase::parse(&phase)
                .ok_or_else(|| anyhow!("unknown market phase {phase}"))?,
            cut_pressure: row.try_get::<f64, _>("cut_pressure")?.clamp(0.0, 1.0),
            as_of: row.try_get("as_of")?,
        })
    }
}
