use crate::state::{TrendContext, TrendFlags, TrendOutput, TrendScores, TrendState};
use folio_core::config::EngineConfig;
use folio_core::types::IndicatorSnapshot;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Tunables for the state machine, lifted from the engine section of the app
/// config so the engine itself stays free of file/config concerns.
#[derive(Debug, Clone)]
pub struct TrendConfig {
    pub min_bars: u64,
    pub extension_threshold: f64,
    pub invalidation_atr_mult: Decimal,
    pub emergency_break_buffer: Decimal,
    pub rsi_hot: f64,
    pub first_dip_reset_on_reentry: bool,
}

impl From<&EngineConfig> for TrendConfig {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            min_bars: cfg.min_bars,
            extension_threshold: cfg.extension_threshold,
            invalidation_atr_mult: Decimal::try_from(cfg.invalidation_atr_mult)
                .unwrap_or(Decimal::new(15, 1)),
            emergency_break_buffer: Decimal::try_from(cfg.emergency_break_buffer)
                .unwrap_or(Decimal::new(2, 2)),
            rsi_hot: cfg.rsi_hot,
            first_dip_reset_on_reentry: cfg.first_dip_reset_on_reentry,
        }
    }
}

/// The per-timeframe trend state machine.
///
/// `evaluate` is a pure function of the previous context and the latest
/// indicator snapshot; the only inputs are OHLC-derived indicators. It never
/// executes anything itself.
pub struct TrendEngine {
    config: TrendConfig,
}

impl TrendEngine {
    #[must_use]
    pub const fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &TrendConfig {
        &self.config
    }

    /// Evaluates one snapshot against the rolling context.
    ///
    /// Returns the advanced context and the output to attach to the position.
    /// With fewer than `min_bars` of history the machine stays inert: state
    /// `Undetermined`, no flags.
    #[must_use]
    pub fn evaluate(
        &self,
        ctx: &TrendContext,
        snap: &IndicatorSnapshot,
        bars_count: u64,
    ) -> (TrendContext, TrendOutput) {
        let mut next = ctx.clone();
        let mut flags = TrendFlags::default();

        if bars_count < self.config.min_bars {
            next = TrendContext {
                prev_close: Some(snap.close),
                prev_ema_fast: Some(snap.ema_fast),
                ..TrendContext::default()
            };
            return (next.clone(), self.output(&next, flags, snap));
        }

        // A bootstrap that landed on a transitional state is not trusted until
        // one live evaluation has confirmed it; that evaluation raises nothing.
        let suppress_flags = ctx.provisional;
        next.provisional = false;

        let extension = Self::extension(snap);
        let extended = extension >= self.config.extension_threshold;
        let invalidation_floor = snap.ema_mid - self.config.invalidation_atr_mult * snap.atr;
        let structural_break = snap.close < invalidation_floor && snap.ema_fast < snap.ema_mid;

        if structural_break {
            // Structural invalidation overrides every state: flag the full
            // exit and reset the machine to a cold start.
            flags.exit_position = true;
            next = TrendContext {
                prev_close: Some(snap.close),
                prev_ema_fast: Some(snap.ema_fast),
                ..TrendContext::default()
            };
            let flags = if suppress_flags { TrendFlags::default() } else { flags };
            return (next.clone(), self.output(&next, flags, snap));
        }

        let entered = match ctx.state {
            TrendState::Undetermined => {
                Self::step_undetermined(&mut next, &mut flags, snap, extended)
            }
            TrendState::EarlyUptrend => Self::step_early_uptrend(&mut next, snap, extended),
            TrendState::Retest => self.step_retest(&mut next, &mut flags, snap, extended),
            TrendState::Extended => {
                self.step_extended(&mut next, &mut flags, snap, extension);
                false
            }
        };

        if entered {
            next.bars_in_state = 0;
        } else {
            next.bars_in_state = next.bars_in_state.saturating_add(1);
        }

        next.prev_close = Some(snap.close);
        next.prev_ema_fast = Some(snap.ema_fast);

        let flags = if suppress_flags { TrendFlags::default() } else { flags };
        (next.clone(), self.output(&next, flags, snap))
    }

    /// S0: waits for a first clean cross of the fast EMA, or recognizes an
    /// already-mature leg (bootstrap resets land here mid-trend). The cross
    /// into the early uptrend carries the one-shot `buy_signal`.
    fn step_undetermined(
        next: &mut TrendContext,
        flags: &mut TrendFlags,
        snap: &IndicatorSnapshot,
        extended: bool,
    ) -> bool {
        if extended {
            next.state = TrendState::Extended;
            return true;
        }
        let crossed_above = match (next.prev_close, next.prev_ema_fast) {
            (Some(pc), Some(pf)) => pc <= pf && snap.close > snap.ema_fast,
            _ => false,
        };
        if crossed_above && snap.close > snap.ema_mid {
            next.state = TrendState::EarlyUptrend;
            flags.buy_signal = true;
            return true;
        }
        false
    }

    /// S1: fresh uptrend; watches for pullback or maturity.
    fn step_early_uptrend(
        next: &mut TrendContext,
        snap: &IndicatorSnapshot,
        extended: bool,
    ) -> bool {
        if extended || snap.close < snap.ema_long {
            next.state = TrendState::Extended;
            return true;
        }
        if snap.close < snap.ema_fast {
            next.state = TrendState::Retest;
            next.retest_entry_close = Some(snap.close);
            return true;
        }
        false
    }

    /// S2: pullback toward the mid EMA. A held retest is buyable; reclaiming
    /// the fast EMA with strength trims and reverts to the uptrend posture; a
    /// deeper break demotes to the mature state.
    fn step_retest(
        &self,
        next: &mut TrendContext,
        flags: &mut TrendFlags,
        snap: &IndicatorSnapshot,
        extended: bool,
    ) -> bool {
        let deep_break = snap.close < snap.ema_mid - snap.atr;
        if extended || deep_break {
            next.state = TrendState::Extended;
            next.retest_entry_close = None;
            return true;
        }

        if snap.low <= snap.ema_mid && snap.close >= snap.ema_mid {
            flags.buy_flag = true;
        }

        let reclaimed = snap.close > snap.ema_fast
            && next
                .retest_entry_close
                .is_some_and(|entry| snap.close > entry);
        if reclaimed {
            if snap.rsi >= self.config.rsi_hot {
                flags.trim_flag = true;
            }
            next.state = TrendState::EarlyUptrend;
            next.retest_entry_close = None;
            return true;
        }
        false
    }

    /// S3: mature/extended. Trims into heat, buys disciplined dips (the first
    /// one sized separately), exits fully on a decisive long-EMA break, and
    /// re-arms on a reclaim.
    fn step_extended(
        &self,
        next: &mut TrendContext,
        flags: &mut TrendFlags,
        snap: &IndicatorSnapshot,
        extension: f64,
    ) {
        let one = Decimal::ONE;
        let break_floor = snap.ema_long * (one - self.config.emergency_break_buffer);

        if next.awaiting_reclaim {
            if snap.close > snap.ema_long {
                flags.reclaimed_ema333 = true;
                next.awaiting_reclaim = false;
                if self.config.first_dip_reset_on_reentry {
                    next.first_dip_used = false;
                }
            }
            return;
        }

        if snap.close < break_floor {
            flags.emergency_exit = true;
            next.awaiting_reclaim = true;
            return;
        }

        if extension >= self.config.extension_threshold && snap.rsi >= self.config.rsi_hot {
            flags.trim_flag = true;
        }

        let disciplined_dip = snap.close <= snap.ema_mid && snap.close > snap.ema_long;
        if disciplined_dip {
            flags.buy_flag = true;
            if !next.first_dip_used {
                flags.first_dip_buy_flag = true;
                next.first_dip_used = true;
            }
        }
    }

    fn output(
        &self,
        ctx: &TrendContext,
        flags: TrendFlags,
        snap: &IndicatorSnapshot,
    ) -> TrendOutput {
        TrendOutput {
            state: ctx.state,
            flags,
            scores: self.scores(snap),
            evaluated_at: snap.timestamp,
        }
    }

    fn scores(&self, snap: &IndicatorSnapshot) -> TrendScores {
        let extension = Self::extension(snap);
        let pullback = if snap.close < snap.ema_fast && snap.ema_fast > snap.ema_mid {
            let band = (snap.ema_fast - snap.ema_mid).to_f64().unwrap_or(0.0);
            let depth = (snap.ema_fast - snap.close).to_f64().unwrap_or(0.0);
            if band > 0.0 {
                depth / band
            } else {
                0.0
            }
        } else {
            0.0
        };

        TrendScores {
            trend_strength: clamp01(snap.adx / 50.0),
            extension: clamp01(extension / (2.0 * self.config.extension_threshold)),
            pullback_depth: clamp01(pullback),
            volume_pressure: clamp01((snap.volume_deviation + 3.0) / 6.0),
        }
    }

    /// Distance of close above the baseline EMA, as a fraction of it.
    fn extension(snap: &IndicatorSnapshot) -> f64 {
        if snap.ema_base <= Decimal::ZERO {
            return 0.0;
        }
        ((snap.close - snap.ema_base) / snap.ema_base)
            .to_f64()
            .unwrap_or(0.0)
    }
}

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn engine() -> TrendEngine {
        TrendEngine::new(TrendConfig::from(&EngineConfig::default()))
    }

    fn snap(close: Decimal) -> IndicatorSnapshot {
        // A calm uptrend stack: fast above mid above base above long.
        IndicatorSnapshot {
            close,
            low: close,
            ema_fast: dec!(100),
            ema_mid: dec!(95),
            ema_base: dec!(90),
            ema_long: dec!(80),
            atr: dec!(2),
            rsi: 55.0,
            adx: 25.0,
            volume_deviation: 0.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn insufficient_history_stays_inert() {
        let e = engine();
        let (ctx, out) = e.evaluate(&TrendContext::default(), &snap(dec!(120)), 100);
        assert_eq!(ctx.state, TrendState::Undetermined);
        assert!(!out.flags.any());
    }

    #[test]
    fn cross_above_fast_enters_early_uptrend_with_buy_signal() {
        let e = engine();
        let ctx = TrendContext {
            prev_close: Some(dec!(99)),
            prev_ema_fast: Some(dec!(100)),
            ..TrendContext::default()
        };
        let (ctx, out) = e.evaluate(&ctx, &snap(dec!(101)), 400);
        assert_eq!(ctx.state, TrendState::EarlyUptrend);
        assert!(out.flags.buy_signal);
        assert!(!out.flags.buy_flag);
    }

    #[test]
    fn buy_signal_fires_only_on_the_transition() {
        let e = engine();
        let ctx = TrendContext {
            prev_close: Some(dec!(99)),
            prev_ema_fast: Some(dec!(100)),
            ..TrendContext::default()
        };
        let (ctx, first) = e.evaluate(&ctx, &snap(dec!(101)), 400);
        assert!(first.flags.buy_signal);
        let (_, second) = e.evaluate(&ctx, &snap(dec!(102)), 401);
        assert!(!second.flags.buy_signal);
    }

    #[test]
    fn pullback_below_fast_enters_retest() {
        let e = engine();
        let ctx = TrendContext {
            state: TrendState::EarlyUptrend,
            bars_in_state: 3,
            prev_close: Some(dec!(102)),
            prev_ema_fast: Some(dec!(100)),
            ..TrendContext::default()
        };
        let (ctx, out) = e.evaluate(&ctx, &snap(dec!(98)), 400);
        assert_eq!(ctx.state, TrendState::Retest);
        assert_eq!(ctx.retest_entry_close, Some(dec!(98)));
        assert!(!out.flags.any());
    }

    #[test]
    fn held_retest_raises_buy_flag() {
        let e = engine();
        let ctx = TrendContext {
            state: TrendState::Retest,
            bars_in_state: 1,
            retest_entry_close: Some(dec!(97)),
            prev_close: Some(dec!(97)),
            prev_ema_fast: Some(dec!(100)),
            ..TrendContext::default()
        };
        let mut s = snap(dec!(96));
        s.low = dec!(94);
        let (ctx, out) = e.evaluate(&ctx, &s, 400);
        assert_eq!(ctx.state, TrendState::Retest);
        assert!(out.flags.buy_flag);
    }

    #[test]
    fn retest_deep_break_demotes_to_extended() {
        let e = engine();
        let ctx = TrendContext {
            state: TrendState::Retest,
            bars_in_state: 2,
            retest_entry_close: Some(dec!(97)),
            prev_close: Some(dec!(96)),
            prev_ema_fast: Some(dec!(100)),
            ..TrendContext::default()
        };
        // Below ema_mid - atr (93) but above the invalidation floor (92),
        // and the fast EMA still sits above the mid EMA.
        let (ctx, out) = e.evaluate(&ctx, &snap(dec!(92.5)), 400);
        assert_eq!(ctx.state, TrendState::Extended);
        assert!(!out.flags.exit_position);
    }

    #[test]
    fn extended_entry_on_large_extension() {
        let e = engine();
        let ctx = TrendContext {
            prev_close: Some(dec!(110)),
            prev_ema_fast: Some(dec!(100)),
            ..TrendContext::default()
        };
        // 120 vs base 90 is a 33% extension, above the 25% threshold.
        let (ctx, _) = e.evaluate(&ctx, &snap(dec!(120)), 400);
        assert_eq!(ctx.state, TrendState::Extended);
    }

    #[test]
    fn extended_hot_leg_raises_trim() {
        let e = engine();
        let ctx = TrendContext {
            state: TrendState::Extended,
            bars_in_state: 4,
            prev_close: Some(dec!(118)),
            prev_ema_fast: Some(dec!(100)),
            ..TrendContext::default()
        };
        let mut s = snap(dec!(120));
        s.rsi = 75.0;
        let (_, out) = e.evaluate(&ctx, &s, 400);
        assert!(out.flags.trim_flag);
        assert!(!out.flags.buy_flag);
    }

    #[test]
    fn first_dip_flag_fires_once() {
        let e = engine();
        let ctx = TrendContext {
            state: TrendState::Extended,
            bars_in_state: 4,
            prev_close: Some(dec!(96)),
            prev_ema_fast: Some(dec!(100)),
            ..TrendContext::default()
        };
        // Dip into the mid/base band, still above the long EMA.
        let (ctx, first) = e.evaluate(&ctx, &snap(dec!(94)), 400);
        assert!(first.flags.buy_flag);
        assert!(first.flags.first_dip_buy_flag);

        let (_, second) = e.evaluate(&ctx, &snap(dec!(93)), 401);
        assert!(second.flags.buy_flag);
        assert!(!second.flags.first_dip_buy_flag);
    }

    #[test]
    fn decisive_long_break_raises_emergency_exit() {
        let e = engine();
        let ctx = TrendContext {
            state: TrendState::Extended,
            bars_in_state: 10,
            prev_close: Some(dec!(82)),
            prev_ema_fast: Some(dec!(100)),
            ..TrendContext::default()
        };
        // Below ema_long * 0.98 = 78.4, with the fast EMA still above mid so
        // the structural invalidation does not fire first.
        let mut s = snap(dec!(78));
        s.ema_mid = dec!(70);
        s.atr = dec!(1);
        let (ctx, out) = e.evaluate(&ctx, &s, 400);
        assert!(out.flags.emergency_exit);
        assert!(ctx.awaiting_reclaim);
    }

    #[test]
    fn reclaim_after_emergency_exit_permits_reentry() {
        let e = engine();
        let ctx = TrendContext {
            state: TrendState::Extended,
            bars_in_state: 12,
            awaiting_reclaim: true,
            first_dip_used: true,
            prev_close: Some(dec!(79)),
            prev_ema_fast: Some(dec!(100)),
            ..TrendContext::default()
        };
        let (ctx, out) = e.evaluate(&ctx, &snap(dec!(85)), 400);
        assert!(out.flags.reclaimed_ema333);
        assert!(!ctx.awaiting_reclaim);
        // Default config re-arms the first dip after a reclaim.
        assert!(!ctx.first_dip_used);
    }

    #[test]
    fn reclaim_keeps_first_dip_spent_when_reset_disabled() {
        let mut cfg = TrendConfig::from(&EngineConfig::default());
        cfg.first_dip_reset_on_reentry = false;
        let e = TrendEngine::new(cfg);
        let ctx = TrendContext {
            state: TrendState::Extended,
            awaiting_reclaim: true,
            first_dip_used: true,
            prev_close: Some(dec!(79)),
            prev_ema_fast: Some(dec!(100)),
            ..TrendContext::default()
        };
        let (ctx, out) = e.evaluate(&ctx, &snap(dec!(85)), 400);
        assert!(out.flags.reclaimed_ema333);
        assert!(ctx.first_dip_used);
    }

    #[test]
    fn structural_break_resets_to_undetermined() {
        let e = engine();
        let ctx = TrendContext {
            state: TrendState::EarlyUptrend,
            bars_in_state: 5,
            first_dip_used: true,
            prev_close: Some(dec!(96)),
            prev_ema_fast: Some(dec!(100)),
            ..TrendContext::default()
        };
        // Fast below mid and close below mid - 1.5*atr.
        let mut s = snap(dec!(88));
        s.ema_fast = dec!(93);
        s.ema_mid = dec!(95);
        let (ctx, out) = e.evaluate(&ctx, &s, 400);
        assert!(out.flags.exit_position);
        assert_eq!(ctx.state, TrendState::Undetermined);
        assert!(!ctx.first_dip_used);
    }

    #[test]
    fn provisional_context_suppresses_flags_once() {
        let e = engine();
        let ctx = TrendContext {
            state: TrendState::EarlyUptrend,
            bars_in_state: 0,
            provisional: true,
            prev_close: Some(dec!(99)),
            prev_ema_fast: Some(dec!(100)),
            ..TrendContext::default()
        };
        let (ctx, out) = e.evaluate(&ctx, &snap(dec!(101)), 400);
        assert!(!out.flags.any());
        assert!(!ctx.provisional);
    }
}
