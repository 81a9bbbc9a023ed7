use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Discrete trend classification for one (instrument, timeframe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendState {
    /// Initial or indeterminate trend. No trade flags are ever raised here.
    Undetermined,
    /// Price has established a clear upward posture over the fast EMA.
    EarlyUptrend,
    /// Pullback toward the mid EMA after an early uptrend.
    Retest,
    /// Mature leg: far above the baseline EMA, or the long EMA has broken.
    Extended,
}

impl TrendState {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Undetermined => "undetermined",
            Self::EarlyUptrend => "early_uptrend",
            Self::Retest => "retest",
            Self::Extended => "extended",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "undetermined" => Some(Self::Undetermined),
            "early_uptrend" => Some(Self::EarlyUptrend),
            "retest" => Some(Self::Retest),
            "extended" => Some(Self::Extended),
            _ => None,
        }
    }
}

/// Independent action flags raised by one evaluation.
///
/// Several may be true at once; the orchestrator's decision step applies the
/// precedence order, the engine only reports what it saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendFlags {
    /// First entry into the early uptrend, raised once on the transition.
    pub buy_signal: bool,
    /// Qualifying retest or disciplined dip.
    pub buy_flag: bool,
    /// First qualifying dip after entering the mature state.
    pub first_dip_buy_flag: bool,
    /// Renewed strength worth taking profit into.
    pub trim_flag: bool,
    /// Decisive break of the long EMA: full exit, no partial demote.
    pub emergency_exit: bool,
    /// Structural invalidation of the fast band. Takes precedence over all
    /// other flags.
    pub exit_position: bool,
    /// Close reclaimed the long EMA after an emergency exit, permitting an
    /// automatic re-entry.
    pub reclaimed_ema333: bool,
}

impl TrendFlags {
    /// True when any actionable flag is raised.
    #[must_use]
    pub const fn any(&self) -> bool {
        self.buy_signal
            || self.buy_flag
            || self.first_dip_buy_flag
            || self.trim_flag
            || self.emergency_exit
            || self.exit_position
            || self.reclaimed_ema333
    }
}

/// Continuous diagnostic sub-scores, each in [0,1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendScores {
    pub trend_strength: f64,
    pub extension: f64,
    pub pullback_depth: f64,
    pub volume_pressure: f64,
}

/// Result of one engine evaluation. Overwrites the previous value on the
/// position's feature bag; decisions derived from it are what get audited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendOutput {
    pub state: TrendState,
    pub flags: TrendFlags,
    pub scores: TrendScores,
    pub evaluated_at: DateTime<Utc>,
}

/// Rolling context the state machine carries between evaluations.
///
/// Persisted inside the position's feature bag so a restart resumes from the
/// same place the last evaluation left off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendContext {
    pub state: TrendState,
    pub bars_in_state: u32,
    /// Set when a bootstrap replay landed on a transitional state (S1/S2);
    /// cleared by the first live evaluation, which suppresses flags until then.
    pub provisional: bool,
    pub prev_close: Option<Decimal>,
    pub prev_ema_fast: Option<Decimal>,
    /// Close recorded when the retest state was entered; reclaiming above it
    /// signals renewed strength.
    pub retest_entry_close: Option<Decimal>,
    /// One-shot guard for the first-dip entry in the mature state.
    pub first_dip_used: bool,
    /// Set by an emergency exit; only a reclaim of the long EMA clears it.
    pub awaiting_reclaim: bool,
}

impl Default for TrendContext {
    fn default() -> Self {
        Self {
            state: TrendState::Undetermined,
            bars_in_state: 0,
            provisional: false,
            prev_close: None,
            prev_ema_fast: None,
            retest_entry_close: None,
            first_dip_used: false,
            awaiting_reclaim: false,
        }
    }
}
