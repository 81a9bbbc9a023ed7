//! The position: one (instrument, venue, timeframe) tuple and its lifecycle.

use chrono::{DateTime, Utc};
use folio_core::types::{IndicatorSnapshot, OrderFill, OrderSide};
use folio_core::Timeframe;
use folio_trend::{TrendContext, TrendOutput};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    /// Insufficient history; the engine runs only to converge state.
    Dormant,
    /// Sufficient history, zero holdings; tradable.
    Watchlist,
    /// Non-zero holdings.
    Active,
    /// Manually suspended; never touched by the orchestrator.
    Paused,
    /// Manually retired; never touched by the orchestrator.
    Archived,
}

impl PositionStatus {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dormant => "dormant",
            Self::Watchlist => "watchlist",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Archived => "archived",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dormant" => Some(Self::Dormant),
            "watchlist" => Some(Self::Watchlist),
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }

    /// Statuses the orchestrator is allowed to evaluate for trading.
    #[must_use]
    pub const fn is_eligible(&self) -> bool {
        matches!(self, Self::Watchlist | Self::Active)
    }
}

/// Cumulative holdings for a position.
///
/// Quantity held, native currency invested, and native currency extracted are
/// sufficient to derive deployed and realized-profit fractions without
/// replaying a trade ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holdings {
    pub quantity: Decimal,
    pub invested: Decimal,
    pub extracted: Decimal,
}

impl Holdings {
    /// Fraction of the allocation cap currently deployed (net cash in),
    /// clamped to [0,1].
    #[must_use]
    pub fn deployed_fraction(&self, allocation_cap: Decimal) -> f64 {
        if allocation_cap <= Decimal::ZERO {
            return 0.0;
        }
        let net = (self.invested - self.extracted).max(Decimal::ZERO);
        (net / allocation_cap).to_f64().unwrap_or(0.0).clamp(0.0, 1.0)
    }

    /// Realized profit as a fraction of the allocation cap. Negative while
    /// more has been invested than extracted; reaches 1.0 once realized
    /// proceeds have paid for the entire allocation.
    #[must_use]
    pub fn realized_profit_fraction(&self, allocation_cap: Decimal) -> f64 {
        if allocation_cap <= Decimal::ZERO {
            return 0.0;
        }
        ((self.extracted - self.invested) / allocation_cap)
            .to_f64()
            .unwrap_or(0.0)
    }

    /// Applies an executed fill to the running totals.
    pub fn apply_fill(&mut self, side: OrderSide, fill: &OrderFill) {
        match side {
            OrderSide::Buy => {
                self.quantity += fill.quantity;
                self.invested += fill.notional;
            }
            OrderSide::Sell => {
                self.quantity = (self.quantity - fill.quantity).max(Decimal::ZERO);
                self.extracted += fill.notional;
            }
        }
    }
}

/// Cached risk-score result with a freshness timestamp.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CachedScores {
    pub aggression: f64,
    pub exit_pressure: f64,
    pub computed_at: DateTime<Utc>,
}

/// Versioned bag of the latest computed features for a position.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureSet {
    /// Schema version of this bag.
    pub version: u32,
    pub indicators: Option<IndicatorSnapshot>,
    pub trend_context: Option<TrendContext>,
    pub trend_output: Option<TrendOutput>,
    pub risk: Option<CachedScores>,
}

/// The persistent unit of state: one (instrument, venue, timeframe) tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub instrument: String,
    pub venue: String,
    pub timeframe: Timeframe,
    pub status: PositionStatus,
    /// Currency budget carved for this (instrument, timeframe) from the
    /// upstream total allocation.
    pub allocation_cap: Decimal,
    pub holdings: Holdings,
    pub features: FeatureSet,
    /// Running count of available history bars, maintained by the data layer.
    pub bars_count: u64,
    /// Timestamp of the last execution attempt, the idempotency anchor.
    pub last_execution_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Creates a dormant position with an empty feature bag.
    #[must_use]
    pub fn new(
        instrument: impl Into<String>,
        venue: impl Into<String>,
        timeframe: Timeframe,
        allocation_cap: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            instrument: instrument.into(),
            venue: venue.into(),
            timeframe,
            status: PositionStatus::Dormant,
            allocation_cap,
            holdings: Holdings::default(),
            features: FeatureSet::default(),
            bars_count: 0,
            last_execution_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Identity key: unique per (instrument, venue, timeframe).
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.instrument, self.venue, self.timeframe)
    }

    /// Native-currency headroom left under the allocation cap.
    #[must_use]
    pub fn allocation_headroom(&self) -> Decimal {
        let net = (self.holdings.invested - self.holdings.extracted).max(Decimal::ZERO);
        (self.allocation_cap - net).max(Decimal::ZERO)
    }

    /// Checks the data-model invariants.
    ///
    /// # Errors
    ///
    /// Returns a description of the violated invariant. A violating position
    /// is skipped for the tick, never processed.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.holdings.quantity < Decimal::ZERO {
            return Err(format!(
                "position {} has negative quantity {}",
                self.key(),
                self.holdings.quantity
            ));
        }
        match self.status {
            PositionStatus::Active if self.holdings.quantity <= Decimal::ZERO => Err(format!(
                "active position {} has zero holdings",
                self.key()
            )),
            PositionStatus::Watchlist if self.holdings.quantity > Decimal::ZERO => Err(format!(
                "watchlist position {} has non-zero holdings {}",
                self.key(),
                self.holdings.quantity
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fill(side: OrderSide, quantity: Decimal, notional: Decimal) -> OrderFill {
        OrderFill {
            reference: "t".to_string(),
            side,
            quantity,
            price: if quantity.is_zero() {
                Decimal::ZERO
            } else {
                notional / quantity
            },
            notional,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn deployed_fraction_tracks_net_invested() {
        let mut h = Holdings::default();
        h.apply_fill(OrderSide::Buy, &fill(OrderSide::Buy, dec!(10), dec!(300)));
        assert!((h.deployed_fraction(dec!(1000)) - 0.3).abs() < 1e-9);

        h.apply_fill(OrderSide::Sell, &fill(OrderSide::Sell, dec!(5), dec!(200)));
        assert!((h.deployed_fraction(dec!(1000)) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn realized_profit_fraction_goes_negative_while_deployed() {
        let mut h = Holdings::default();
        h.apply_fill(OrderSide::Buy, &fill(OrderSide::Buy, dec!(10), dec!(500)));
        assert!((h.realized_profit_fraction(dec!(1000)) + 0.5).abs() < 1e-9);

        h.apply_fill(OrderSide::Sell, &fill(OrderSide::Sell, dec!(10), dec!(1700)));
        assert!((h.realized_profit_fraction(dec!(1000)) - 1.2).abs() < 1e-9);
    }

    #[test]
    fn active_with_zero_holdings_violates_invariant() {
        let mut p = Position::new("SOL", "solana", Timeframe::H4, dec!(1000));
        p.status = PositionStatus::Active;
        assert!(p.check_invariants().is_err());

        p.holdings.quantity = dec!(1);
        assert!(p.check_invariants().is_ok());
    }

    #[test]
    fn watchlist_with_holdings_violates_invariant() {
        let mut p = Position::new("SOL", "solana", Timeframe::H4, dec!(1000));
        p.status = PositionStatus::Watchlist;
        p.holdings.quantity = dec!(2);
        assert!(p.check_invariants().is_err());
    }

    #[test]
    fn headroom_shrinks_with_deployment() {
        let mut p = Position::new("SOL", "solana", Timeframe::D1, dec!(1000));
        assert_eq!(p.allocation_headroom(), dec!(1000));
        p.holdings.invested = dec!(800);
        p.holdings.extracted = dec!(200);
        assert_eq!(p.allocation_headroom(), dec!(400));
    }
}
