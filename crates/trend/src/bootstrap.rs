use crate::engine::TrendEngine;
use crate::state::{TrendContext, TrendState};
use folio_core::types::IndicatorSnapshot;
use tracing::debug;

/// Replays a historical snapshot series through the engine to converge a cold
/// state machine before a position becomes tradable.
///
/// Flags raised during the replay are discarded; only the final context
/// matters. The machine is only trusted to converge to the two self-evident
/// states (`Undetermined`, `Extended`); a replay that lands on a transitional
/// state is marked provisional and produces no actionable flags until one
/// live evaluation confirms it.
#[must_use]
pub fn converge(engine: &TrendEngine, series: &[IndicatorSnapshot], total_bars: u64) -> TrendContext {
    let mut ctx = TrendContext::default();
    let len = series.len() as u64;

    for (i, snap) in series.iter().enumerate() {
        let bars_at = total_bars.saturating_sub(len) + i as u64 + 1;
        let (next, _) = engine.evaluate(&ctx, snap, bars_at);
        ctx = next;
    }

    if matches!(ctx.state, TrendState::EarlyUptrend | TrendState::Retest) {
        debug!(
            state = ctx.state.as_str(),
            "bootstrap landed on a transitional state, marking provisional"
        );
        ctx.provisional = true;
    }
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TrendConfig;
    use chrono::Utc;
    use folio_core::config::EngineConfig;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn snap(close: Decimal) -> IndicatorSnapshot {
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
    fn short_history_converges_to_undetermined() {
        let engine = TrendEngine::new(TrendConfig::from(&EngineConfig::default()));
        let series: Vec<_> = (0..10).map(|_| snap(dec!(120))).collect();
        let ctx = converge(&engine, &series, 10);
        assert_eq!(ctx.state, TrendState::Undetermined);
        assert!(!ctx.provisional);
    }

    #[test]
    fn mature_leg_converges_to_extended() {
        let engine = TrendEngine::new(TrendConfig::from(&EngineConfig::default()));
        let series: Vec<_> = (0..10).map(|_| snap(dec!(120))).collect();
        let ctx = converge(&engine, &series, 400);
        assert_eq!(ctx.state, TrendState::Extended);
        assert!(!ctx.provisional);
    }

    #[test]
    fn transitional_landing_is_provisional() {
        let engine = TrendEngine::new(TrendConfig::from(&EngineConfig::default()));
        // A cross of the fast EMA on the final bar leaves the replay in the
        // early uptrend, which a cold bootstrap cannot fully trust.
        let series = vec![snap(dec!(99)), snap(dec!(101))];
        let ctx = converge(&engine, &series, 400);
        assert_eq!(ctx.state, TrendState::EarlyUptrend);
        assert!(ctx.provisional);
    }
}
