use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Trading timeframe for a position.
///
/// One instrument may carry several positions at once, one per timeframe,
/// each with its own slice of the approved allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    /// 1-hour bars.
    H1,
    /// 4-hour bars.
    H4,
    /// Daily bars.
    D1,
}

impl Timeframe {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "1h" | "h1" => Some(Self::H1),
            "4h" | "h4" => Some(Self::H4),
            "1d" | "d1" => Some(Self::D1),
            _ => None,
        }
    }

    /// Duration of a single bar on this timeframe.
    #[must_use]
    pub fn period(&self) -> Duration {
        match self {
            Self::H1 => Duration::hours(1),
            Self::H4 => Duration::hours(4),
            Self::D1 => Duration::days(1),
        }
    }

    /// Fixed share of an instrument's total approved allocation carved out
    /// for this timeframe at position-creation time.
    #[must_use]
    pub const fn allocation_split(&self) -> f64 {
        match self {
            Self::H1 => 0.20,
            Self::H4 => 0.30,
            Self::D1 => 0.50,
        }
    }

    /// All supported timeframes, fastest first.
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::H1, Self::H4, Self::D1]
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrip() {
        for tf in Timeframe::all() {
            assert_eq!(Timeframe::parse(tf.as_str()), Some(tf));
        }
        assert_eq!(Timeframe::parse("15m"), None);
    }

    #[test]
    fn splits_sum_to_one() {
        let total: f64 = Timeframe::all().iter().map(Timeframe::allocation_split).sum();
        assert!((total - 1.0).abs() < f64::EPSILON);
    }
}
