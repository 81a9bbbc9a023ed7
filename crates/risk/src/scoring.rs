//! Aggression and exit-pressure scoring.
//!
//! Two scalars in [0,1] per evaluation, blending portfolio-wide context
//! (phase, cut-pressure) with position-local context (deployed fraction,
//! realized-profit fraction). Cached on the position with a freshness
//! timestamp so a burst of ticks does not recompute them every time.

use chrono::{DateTime, Duration, Utc};
use folio_core::config::SizingConfig;
use folio_core::types::{MarketPhase, PortfolioContext};
use folio_positions::{CachedScores, Position};
use serde::{Deserialize, Serialize};

/// Inputs to one scoring pass.
#[derive(Debug, Clone, Copy)]
pub struct RiskInputs {
    pub phase: MarketPhase,
    pub cut_pressure: f64,
    pub deployed_fraction: f64,
    pub realized_profit_fraction: f64,
}

impl RiskInputs {
    /// Builds inputs from a position and the portfolio context.
    #[must_use]
    pub fn for_position(position: &Position, ctx: &PortfolioContext) -> Self {
        Self {
            phase: ctx.phase,
            cut_pressure: ctx.cut_pressure.clamp(0.0, 1.0),
            deployed_fraction: position.holdings.deployed_fraction(position.allocation_cap),
            realized_profit_fraction: position
                .holdings
                .realized_profit_fraction(position.allocation_cap),
        }
    }
}

/// The two sizing drivers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskScores {
    pub aggression: f64,
    pub exit_pressure: f64,
}

/// Sizing tier derived from a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Aggressive,
    Normal,
    Patient,
}

impl Tier {
    /// Tier for a score under the configured thresholds.
    #[must_use]
    pub fn from_score(score: f64, cfg: &SizingConfig) -> Self {
        if score >= cfg.aggressive_threshold {
            Self::Aggressive
        } else if score < cfg.patient_threshold {
            Self::Patient
        } else {
            Self::Normal
        }
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Aggressive => "aggressive",
            Self::Normal => "normal",
            Self::Patient => "patient",
        }
    }
}

const fn phase_base(phase: MarketPhase) -> f64 {
    match phase {
        MarketPhase::Expansion => 0.85,
        MarketPhase::Ranging => 0.50,
        MarketPhase::Contraction => 0.20,
    }
}

/// Computes both scores.
///
/// A ranging phase with no cut-pressure and an empty position lands exactly
/// at 0.5/0.5: the neutral middle of the normal tier.
#[must_use]
pub fn score(inputs: &RiskInputs) -> RiskScores {
    let base = phase_base(inputs.phase);
    let cut = inputs.cut_pressure.clamp(0.0, 1.0);
    let deployed = inputs.deployed_fraction.clamp(0.0, 1.0);
    let banked = inputs.realized_profit_fraction.max(0.0).min(1.0);

    let aggression = (base - 0.4 * cut - 0.2 * deployed - 0.15 * banked).clamp(0.0, 1.0);
    let exit_pressure =
        ((1.0 - base) + 0.35 * cut + 0.15 * deployed + 0.1 * banked).clamp(0.0, 1.0);

    RiskScores {
        aggression,
        exit_pressure,
    }
}

/// Returns fresh scores, reusing the cached pair when it is younger than the
/// TTL. The second element carries the new cache entry when a recomputation
/// happened, so the caller can write it back to the feature bag.
#[must_use]
pub fn resolve_scores(
    position: &Position,
    ctx: &PortfolioContext,
    now: DateTime<Utc>,
    ttl: Duration,
) -> (RiskScores, Option<CachedScores>) {
    if let Some(cached) = position.features.risk {
        if now - cached.computed_at < ttl {
            return (
                RiskScores {
                    aggression: cached.aggression,
                    exit_pressure: cached.exit_pressure,
                },
                None,
            );
        }
    }

    let scores = score(&RiskInputs::for_position(position, ctx));
    (
        scores,
        Some(CachedScores {
            aggression: scores.aggression,
            exit_pressure: scores.exit_pressure,
            computed_at: now,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::Timeframe;
    use rust_decimal_macros::dec;

    fn inputs(phase: MarketPhase) -> RiskInputs {
        RiskInputs {
            phase,
            cut_pressure: 0.0,
            deployed_fraction: 0.0,
            realized_profit_fraction: 0.0,
        }
    }

    #[test]
    fn neutral_ranging_scores_half() {
        let s = score(&inputs(MarketPhase::Ranging));
        assert!((s.aggression - 0.5).abs() < 1e-9);
        assert!((s.exit_pressure - 0.5).abs() < 1e-9);
    }

    #[test]
    fn cut_pressure_suppresses_aggression() {
        let mut i = inputs(MarketPhase::Expansion);
        let relaxed = score(&i);
        i.cut_pressure = 1.0;
        let pressured = score(&i);
        assert!(pressured.aggression < relaxed.aggression);
        assert!(pressured.exit_pressure > relaxed.exit_pressure);
    }

    #[test]
    fn contraction_is_patient_territory() {
        let s = score(&inputs(MarketPhase::Contraction));
        let cfg = SizingConfig::default();
        assert_eq!(Tier::from_score(s.aggression, &cfg), Tier::Patient);
    }

    #[test]
    fn tier_thresholds() {
        let cfg = SizingConfig::default();
        assert_eq!(Tier::from_score(0.7, &cfg), Tier::Aggressive);
        assert_eq!(Tier::from_score(0.5, &cfg), Tier::Normal);
        assert_eq!(Tier::from_score(0.3, &cfg), Tier::Normal);
        assert_eq!(Tier::from_score(0.29, &cfg), Tier::Patient);
    }

    #[test]
    fn cache_is_reused_inside_ttl_and_replaced_after() {
        let mut position = Position::new("SOL", "solana", Timeframe::H4, dec!(1000));
        let now = Utc::now();
        position.features.risk = Some(CachedScores {
            aggression: 0.42,
            exit_pressure: 0.13,
            computed_at: now - Duration::seconds(60),
        });
        let ctx = PortfolioContext {
            phase: MarketPhase::Ranging,
            cut_pressure: 0.0,
            as_of: now,
        };

        let (scores, refreshed) = resolve_scores(&position, &ctx, now, Duration::seconds(300));
        assert!((scores.aggression - 0.42).abs() < 1e-9);
        assert!(refreshed.is_none());

        let (scores, refreshed) =
            resolve_scores(&position, &ctx, now + Duration::seconds(400), Duration::seconds(300));
        assert!((scores.aggression - 0.5).abs() < 1e-9);
        assert!(refreshed.is_some());
    }
}
