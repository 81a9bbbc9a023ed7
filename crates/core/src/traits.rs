use crate::timeframe::Timeframe;
use crate::types::{IndicatorSnapshot, OrderFill, OrderRequest, PortfolioContext};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Upstream market-data and indicator provider.
///
/// Supplies ordered bars and precomputed indicators per (instrument,
/// timeframe). The engine treats this as read-only and trusts derived signals
/// only once `bar_count` crosses the configured minimum.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Number of history bars available for this (instrument, timeframe).
    async fn bar_count(&self, instrument: &str, timeframe: Timeframe) -> Result<u64>;

    /// Most recent indicator snapshots in ascending timestamp order, at most
    /// `limit` of them.
    async fn snapshots(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<IndicatorSnapshot>>;

    /// Latest traded price for sizing and execution hints.
    async fn latest_price(&self, instrument: &str) -> Result<Decimal>;
}

/// Portfolio-phase provider: coarse market phase plus cut-pressure scalar.
#[async_trait]
pub trait PhaseProvider: Send + Sync {
    async fn current(&self) -> Result<PortfolioContext>;
}

/// Downstream order-execution service.
///
/// Synchronous from the orchestrator's point of view: the decision is not
/// final until this call returns, because the next tick's sizing depends on
/// this execution's holdings delta.
#[async_trait]
pub trait ExecutionHandler: Send + Sync {
    async fn execute_order(&self, order: OrderRequest) -> Result<OrderFill>;
}

