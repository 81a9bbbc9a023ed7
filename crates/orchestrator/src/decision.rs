//! Decision resolution: engine flags plus risk scores in, exactly one
//! tagged decision out.

use folio_core::config::SizingConfig;
use folio_positions::Position;
use folio_risk::{entry_fraction, trim_fraction, EntryStage, RiskScores, Tier};
use folio_trend::TrendOutput;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Why a position was held this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    /// No actionable flag this evaluation.
    NoSignal,
    /// An exit-side flag fired but there is nothing to sell.
    NoHoldings,
    /// An entry-side flag fired but the allocation cap is fully deployed.
    NoHeadroom,
    /// History below the minimum bar count.
    InsufficientHistory,
    /// No engine output or indicators available.
    MissingFeatures,
}

impl HoldReason {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoSignal => "no_signal",
            Self::NoHoldings => "no_holdings",
            Self::NoHeadroom => "no_headroom",
            Self::InsufficientHistory => "insufficient_history",
            Self::MissingFeatures => "missing_features",
        }
    }
}

/// What forced a full exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitTrigger {
    /// The state-independent structural invalidation.
    StructuralBreak,
    /// Decisive break of the long EMA in the mature state.
    EmergencyExit,
}

/// One evaluation, one decision. Each variant carries only the fields that
/// make sense for it, so an invalid combination cannot be represented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decision {
    Hold {
        reason: HoldReason,
    },
    Add {
        /// Fraction of the allocation cap.
        fraction: f64,
        /// Sized notional, already clamped to remaining headroom.
        notional: Decimal,
        stage: EntryStage,
    },
    Trim {
        /// Fraction of current holdings.
        fraction: f64,
        quantity: Decimal,
    },
    Exit {
        quantity: Decimal,
        trigger: ExitTrigger,
    },
}

impl Decision {
    /// Decision type for audit records.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Hold { .. } => "hold",
            Self::Add { .. } => "add",
            Self::Trim { .. } => "trim",
            Self::Exit { .. } => "exit",
        }
    }

    /// Size fraction for audit records: allocation fraction for adds,
    /// holdings fraction for trims, 1.0 for exits, 0 for holds.
    #[must_use]
    pub const fn size_fraction(&self) -> f64 {
        match self {
            Self::Hold { .. } => 0.0,
            Self::Add { fraction, .. } | Self::Trim { fraction, .. } => *fraction,
            Self::Exit { .. } => 1.0,
        }
    }

    #[must_use]
    pub const fn is_hold(&self) -> bool {
        matches!(self, Self::Hold { .. })
    }
}

fn round8(value: Decimal) -> Decimal {
    value.round_dp(8)
}

/// Applies the precedence rule to the engine output and sizes the result.
///
/// Precedence: `exit_position` > `emergency_exit` > `trim_flag` > entry
/// flags > `reclaimed_ema333` > hold. Exactly one outcome per evaluation.
#[must_use]
pub fn decide(
    position: &Position,
    output: &TrendOutput,
    scores: &RiskScores,
    cfg: &SizingConfig,
) -> Decision {
    let flags = output.flags;
    let quantity = position.holdings.quantity;
    let deployed = position.holdings.deployed_fraction(position.allocation_cap);
    let realized = position
        .holdings
        .realized_profit_fraction(position.allocation_cap);

    if flags.exit_position {
        return if quantity > Decimal::ZERO {
            Decision::Exit {
                quantity,
                trigger: ExitTrigger::StructuralBreak,
            }
        } else {
            Decision::Hold {
                reason: HoldReason::NoHoldings,
            }
        };
    }

    if flags.emergency_exit {
        return if quantity > Decimal::ZERO {
            Decision::Exit {
                quantity,
                trigger: ExitTrigger::EmergencyExit,
            }
        } else {
            Decision::Hold {
                reason: HoldReason::NoHoldings,
            }
        };
    }

    if flags.trim_flag {
        if quantity > Decimal::ZERO {
            let tier = Tier::from_score(scores.exit_pressure, cfg);
            let fraction = trim_fraction(tier, deployed, realized, cfg);
            let trim_quantity = round8(quantity * Decimal::try_from(fraction).unwrap_or_default());
            if trim_quantity > Decimal::ZERO {
                return Decision::Trim {
                    fraction,
                    quantity: trim_quantity,
                };
            }
        }
        return Decision::Hold {
            reason: HoldReason::NoHoldings,
        };
    }

    let entry_stage = if flags.buy_signal {
        Some(EntryStage::Initial)
    } else if flags.first_dip_buy_flag {
        Some(EntryStage::FirstDip)
    } else if flags.buy_flag {
        Some(EntryStage::Late)
    } else if flags.reclaimed_ema333 {
        Some(EntryStage::Reentry)
    } else {
        None
    };

    if let Some(stage) = entry_stage {
        let tier = Tier::from_score(scores.aggression, cfg);
        let fraction = entry_fraction(stage, tier, realized, cfg);
        let headroom = position.allocation_headroom();
        let notional = round8(
            (position.allocation_cap * Decimal::try_from(fraction).unwrap_or_default())
                .min(headroom),
        );
        if notional <= Decimal::ZERO {
            return Decision::Hold {
                reason: HoldReason::NoHeadroom,
            };
        }
        return Decision::Add {
            fraction,
            notional,
            stage,
        };
    }

    Decision::Hold {
        reason: HoldReason::NoSignal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use folio_core::Timeframe;
    use folio_trend::{TrendFlags, TrendScores, TrendState};
    use rust_decimal_macros::dec;

    fn position(quantity: Decimal, invested: Decimal, extracted: Decimal) -> Position {
        let mut p = Position::new("SOL", "solana", Timeframe::H4, dec!(1000));
        p.holdings.quantity = quantity;
        p.holdings.invested = invested;
        p.holdings.extracted = extracted;
        p
    }

    fn output(flags: TrendFlags) -> TrendOutput {
        TrendOutput {
            state: TrendState::Extended,
            flags,
            scores: TrendScores::default(),
            evaluated_at: Utc::now(),
        }
    }

    fn scores(aggression: f64, exit_pressure: f64) -> RiskScores {
        RiskScores {
            aggression,
            exit_pressure,
        }
    }

    #[test]
    fn exit_position_beats_everything() {
        let flags = TrendFlags {
            buy_signal: true,
            buy_flag: true,
            first_dip_buy_flag: true,
            trim_flag: true,
            emergency_exit: true,
            exit_position: true,
            reclaimed_ema333: true,
        };
        let d = decide(
            &position(dec!(10), dec!(100), dec!(0)),
            &output(flags),
            &scores(0.9, 0.9),
            &SizingConfig::default(),
        );
        assert_eq!(
            d,
            Decision::Exit {
                quantity: dec!(10),
                trigger: ExitTrigger::StructuralBreak
            }
        );
    }

    #[test]
    fn emergency_beats_trim_and_entries() {
        let flags = TrendFlags {
            buy_flag: true,
            trim_flag: true,
            emergency_exit: true,
            ..TrendFlags::default()
        };
        let d = decide(
            &position(dec!(10), dec!(100), dec!(0)),
            &output(flags),
            &scores(0.5, 0.5),
            &SizingConfig::default(),
        );
        assert!(matches!(
            d,
            Decision::Exit {
                trigger: ExitTrigger::EmergencyExit,
                ..
            }
        ));
    }

    #[test]
    fn trim_beats_entries() {
        let flags = TrendFlags {
            buy_flag: true,
            trim_flag: true,
            ..TrendFlags::default()
        };
        let d = decide(
            &position(dec!(10), dec!(100), dec!(0)),
            &output(flags),
            &scores(0.5, 0.5),
            &SizingConfig::default(),
        );
        assert!(matches!(d, Decision::Trim { .. }));
    }

    #[test]
    fn entries_beat_reclaim() {
        let flags = TrendFlags {
            buy_flag: true,
            reclaimed_ema333: true,
            ..TrendFlags::default()
        };
        let d = decide(
            &position(Decimal::ZERO, dec!(0), dec!(0)),
            &output(flags),
            &scores(0.5, 0.5),
            &SizingConfig::default(),
        );
        assert!(matches!(
            d,
            Decision::Add {
                stage: EntryStage::Late,
                ..
            }
        ));
    }

    #[test]
    fn no_flags_holds() {
        let d = decide(
            &position(Decimal::ZERO, dec!(0), dec!(0)),
            &output(TrendFlags::default()),
            &scores(0.5, 0.5),
            &SizingConfig::default(),
        );
        assert_eq!(
            d,
            Decision::Hold {
                reason: HoldReason::NoSignal
            }
        );
    }

    #[test]
    fn exit_flags_without_holdings_hold() {
        let flags = TrendFlags {
            emergency_exit: true,
            ..TrendFlags::default()
        };
        let d = decide(
            &position(Decimal::ZERO, dec!(0), dec!(0)),
            &output(flags),
            &scores(0.5, 0.5),
            &SizingConfig::default(),
        );
        assert_eq!(
            d,
            Decision::Hold {
                reason: HoldReason::NoHoldings
            }
        );
    }

    #[test]
    fn normal_initial_entry_sizes_thirty_percent() {
        let flags = TrendFlags {
            buy_signal: true,
            ..TrendFlags::default()
        };
        let d = decide(
            &position(Decimal::ZERO, dec!(0), dec!(0)),
            &output(flags),
            &scores(0.5, 0.5),
            &SizingConfig::default(),
        );
        let Decision::Add {
            fraction, notional, ..
        } = d
        else {
            panic!("expected add, got {d:?}");
        };
        assert!((fraction - 0.30).abs() < 1e-9);
        assert_eq!(notional, dec!(300));
    }

    #[test]
    fn entry_is_clamped_to_headroom() {
        let flags = TrendFlags {
            buy_signal: true,
            ..TrendFlags::default()
        };
        // 900 of the 1000 cap already deployed.
        let d = decide(
            &position(dec!(90), dec!(900), dec!(0)),
            &output(flags),
            &scores(0.9, 0.1),
            &SizingConfig::default(),
        );
        let Decision::Add { notional, .. } = d else {
            panic!("expected add, got {d:?}");
        };
        assert_eq!(notional, dec!(100));
    }

    #[test]
    fn fully_deployed_entry_holds_on_headroom() {
        let flags = TrendFlags {
            buy_flag: true,
            ..TrendFlags::default()
        };
        let d = decide(
            &position(dec!(100), dec!(1000), dec!(0)),
            &output(flags),
            &scores(0.9, 0.1),
            &SizingConfig::default(),
        );
        assert_eq!(
            d,
            Decision::Hold {
                reason: HoldReason::NoHeadroom
            }
        );
    }

    #[test]
    fn first_dip_outranks_plain_buy_flag() {
        let flags = TrendFlags {
            buy_flag: true,
            first_dip_buy_flag: true,
            ..TrendFlags::default()
        };
        let d = decide(
            &position(Decimal::ZERO, dec!(0), dec!(0)),
            &output(flags),
            &scores(0.5, 0.5),
            &SizingConfig::default(),
        );
        assert!(matches!(
            d,
            Decision::Add {
                stage: EntryStage::FirstDip,
                ..
            }
        ));
    }
}
