use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Precomputed technical indicators for one bar, keyed by the bar's close
/// timestamp. Computed upstream from the OHLC stream; read-only here. The
/// bar's close and low ride along so the engine never re-joins against raw
/// bars.
///
/// The moving-average horizons follow the engine's EMA stack: fast (21),
/// mid (55), baseline (144), long (333).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub close: Decimal,
    pub low: Decimal,
    pub ema_fast: Decimal,
    pub ema_mid: Decimal,
    pub ema_base: Decimal,
    pub ema_long: Decimal,
    pub atr: Decimal,
    pub rsi: f64,
    pub adx: f64,
    /// Volume deviation from its rolling mean, in standard deviations.
    pub volume_deviation: f64,
    pub timestamp: DateTime<Utc>,
}

/// Coarse market-phase classification from the portfolio-phase provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketPhase {
    Expansion,
    Ranging,
    Contraction,
}

impl MarketPhase {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Expansion => "expansion",
            Self::Ranging => "ranging",
            Self::Contraction => "contraction",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "expansion" => Some(Self::Expansion),
            "ranging" => Some(Self::Ranging),
            "contraction" => Some(Self::Contraction),
            _ => None,
        }
    }
}

/// Portfolio-wide context consumed read-only by the scoring step.
///
/// Refreshed on the phase provider's own slower cadence; `cut_pressure` is a
/// drawdown signal in [0,1] where 1 means maximum pressure to de-risk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioContext {
    pub phase: MarketPhase,
    pub cut_pressure: f64,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

/// Command sent to the order-execution service. Exactly one attempt per
/// decision; the service is a black box beyond the synchronous call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub instrument: String,
    pub venue: String,
    pub side: OrderSide,
    /// Quantity of the instrument to trade. For entries this is derived from
    /// notional at the latest available price; for trims/exits it is a share
    /// of current holdings.
    pub quantity: Decimal,
    /// Native-currency notional the quantity was sized from.
    pub notional: Decimal,
    /// Most recent price available when the decision was made.
    pub price_hint: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Successful execution result from the order-execution service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFill {
    /// Settlement reference (transaction hash, order id, ...).
    pub reference: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub notional: Decimal,
    pub timestamp: DateTime<Utc>,
}
