//! Table-driven trade sizing.
//!
//! Entries are fractions of the allocation cap, trims are fractions of
//! current holdings. Both run through an allocation-risk multiplier before
//! clamping to [0,1]; emergency exits bypass the tables entirely and size to
//! the full holdings.

use crate::scoring::Tier;
use folio_core::config::{SizingConfig, TierTable};
use serde::{Deserialize, Serialize};

/// Which entry table applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStage {
    /// First-stage entry out of the early uptrend.
    Initial,
    /// Later-stage entry: retest or disciplined dip.
    Late,
    /// The first qualifying dip after entering the mature state.
    FirstDip,
    /// Automatic re-entry after a reclaim of the long EMA.
    Reentry,
}

const fn table_for(stage: EntryStage, cfg: &SizingConfig) -> &TierTable {
    match stage {
        EntryStage::Initial => &cfg.entry_initial,
        EntryStage::Late | EntryStage::Reentry => &cfg.entry_late,
        EntryStage::FirstDip => &cfg.entry_first_dip,
    }
}

const fn pick(table: &TierTable, tier: Tier) -> f64 {
    match tier {
        Tier::Aggressive => table.aggressive,
        Tier::Normal => table.normal,
        Tier::Patient => table.patient,
    }
}

/// Allocation-risk multiplier for entries.
///
/// Piecewise linear in the realized-profit fraction: shrinks toward the
/// floor once realized proceeds have paid for the whole allocation, scales
/// up toward the ceiling when the position is underwater, 1.0 at breakeven.
#[must_use]
pub fn entry_multiplier(realized_profit_fraction: f64, cfg: &SizingConfig) -> f64 {
    let rpf = realized_profit_fraction;
    let raw = if rpf >= 1.0 {
        0.3
    } else if rpf >= 0.0 {
        // Breakeven 1.0 down to 0.3 as profit approaches the full allocation.
        1.0 - 0.7 * rpf
    } else if rpf <= -0.25 {
        1.5
    } else {
        // Underwater: scale up from 1.0 to 1.5 over the first 25% of the cap.
        1.0 + 2.0 * (-rpf)
    };
    raw.clamp(cfg.entry_mult_min, cfg.entry_mult_max)
}

/// Entry size as a fraction of the allocation cap.
#[must_use]
pub fn entry_fraction(
    stage: EntryStage,
    tier: Tier,
    realized_profit_fraction: f64,
    cfg: &SizingConfig,
) -> f64 {
    let base = pick(table_for(stage, cfg), tier);
    (base * entry_multiplier(realized_profit_fraction, cfg)).clamp(0.0, 1.0)
}

/// Risk multiplier for trims.
///
/// Trimming intensifies as deployment approaches the cap and relaxes once
/// realized profit already covers the full allocation.
#[must_use]
pub fn trim_multiplier(
    deployed_fraction: f64,
    realized_profit_fraction: f64,
    cfg: &SizingConfig,
) -> f64 {
    let raw = if realized_profit_fraction >= 1.0 {
        0.3
    } else {
        let crowding = ((deployed_fraction - 0.5) / 0.5).clamp(0.0, 1.0);
        1.0 + (cfg.trim_mult_max - 1.0) * crowding
    };
    raw.clamp(cfg.trim_mult_min, cfg.trim_mult_max)
}

/// Trim size as a fraction of current holdings.
#[must_use]
pub fn trim_fraction(
    tier: Tier,
    deployed_fraction: f64,
    realized_profit_fraction: f64,
    cfg: &SizingConfig,
) -> f64 {
    let base = pick(&cfg.trim, tier);
    (base * trim_multiplier(deployed_fraction, realized_profit_fraction, cfg)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SizingConfig {
        SizingConfig::default()
    }

    #[test]
    fn initial_entry_documented_defaults() {
        let cfg = cfg();
        assert!((entry_fraction(EntryStage::Initial, Tier::Aggressive, 0.0, &cfg) - 0.50).abs() < 1e-9);
        assert!((entry_fraction(EntryStage::Initial, Tier::Normal, 0.0, &cfg) - 0.30).abs() < 1e-9);
        assert!((entry_fraction(EntryStage::Initial, Tier::Patient, 0.0, &cfg) - 0.10).abs() < 1e-9);
    }

    #[test]
    fn late_entry_is_strictly_smaller_per_tier() {
        let cfg = cfg();
        for tier in [Tier::Aggressive, Tier::Normal, Tier::Patient] {
            let initial = entry_fraction(EntryStage::Initial, tier, 0.0, &cfg);
            let late = entry_fraction(EntryStage::Late, tier, 0.0, &cfg);
            assert!(initial > late, "{tier:?}: {initial} <= {late}");
        }
    }

    #[test]
    fn entry_multiplier_anchors() {
        let cfg = cfg();
        assert!((entry_multiplier(0.0, &cfg) - 1.0).abs() < 1e-9);
        assert!((entry_multiplier(1.0, &cfg) - 0.3).abs() < 1e-9);
        assert!((entry_multiplier(2.0, &cfg) - 0.3).abs() < 1e-9);
        assert!((entry_multiplier(-0.25, &cfg) - 1.5).abs() < 1e-9);
        assert!((entry_multiplier(-1.0, &cfg) - 1.5).abs() < 1e-9);
        // Underwater interpolation is monotone.
        assert!(entry_multiplier(-0.1, &cfg) > entry_multiplier(-0.05, &cfg));
    }

    #[test]
    fn paid_for_position_enters_small() {
        let cfg = cfg();
        let normal = entry_fraction(EntryStage::Late, Tier::Normal, 0.0, &cfg);
        let banked = entry_fraction(EntryStage::Late, Tier::Normal, 1.2, &cfg);
        assert!((banked - normal * 0.3).abs() < 1e-9);
    }

    #[test]
    fn trim_fraction_increases_with_tier() {
        let cfg = cfg();
        let aggressive = trim_fraction(Tier::Aggressive, 0.4, 0.0, &cfg);
        let normal = trim_fraction(Tier::Normal, 0.4, 0.0, &cfg);
        let patient = trim_fraction(Tier::Patient, 0.4, 0.0, &cfg);
        assert!(aggressive > normal);
        assert!(normal > patient);
    }

    #[test]
    fn trim_multiplier_grows_with_crowding() {
        let cfg = cfg();
        assert!((trim_multiplier(0.5, 0.0, &cfg) - 1.0).abs() < 1e-9);
        assert!((trim_multiplier(1.0, 0.0, &cfg) - 3.0).abs() < 1e-9);
        assert!(trim_multiplier(0.75, 0.0, &cfg) > trim_multiplier(0.6, 0.0, &cfg));
    }

    #[test]
    fn trim_relaxes_once_allocation_is_paid_for() {
        let cfg = cfg();
        assert!((trim_multiplier(0.9, 1.0, &cfg) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn fractions_never_leave_unit_interval() {
        let cfg = cfg();
        for stage in [
            EntryStage::Initial,
            EntryStage::Late,
            EntryStage::FirstDip,
            EntryStage::Reentry,
        ] {
            for tier in [Tier::Aggressive, Tier::Normal, Tier::Patient] {
                for rpf in [-2.0, -0.1, 0.0, 0.5, 1.5] {
                    let f = entry_fraction(stage, tier, rpf, &cfg);
                    assert!((0.0..=1.0).contains(&f));
                }
            }
        }
        for tier in [Tier::Aggressive, Tier::Normal, Tier::Patient] {
            for deployed in [0.0, 0.5, 1.0] {
                let f = trim_fraction(tier, deployed, 0.0, &cfg);
                assert!((0.0..=1.0).contains(&f));
            }
        }
    }
}
