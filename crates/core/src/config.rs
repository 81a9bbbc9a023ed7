use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub sizing: SizingConfig,
    pub scheduler: SchedulerConfig,
    pub execution: ExecutionConfig,
    pub database: DatabaseConfig,
}

/// Thresholds and windows for the trend engine and orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum history bars before a dormant position becomes tradable.
    pub min_bars: u64,
    /// Freshness window for cached aggression/exit-pressure scores, seconds.
    pub score_ttl_secs: i64,
    /// Repeat-execution suppression window per position, seconds.
    pub idempotency_window_secs: i64,
    /// Whether a successful re-entry after an emergency exit re-arms the
    /// first-dip flag. `false` keeps it once per position lifetime.
    pub first_dip_reset_on_reentry: bool,
    /// Extension of close above the baseline EMA that qualifies as mature.
    pub extension_threshold: f64,
    /// ATR multiples below the mid EMA that invalidate structure.
    pub invalidation_atr_mult: f64,
    /// Fraction below the long EMA that makes a break decisive.
    pub emergency_break_buffer: f64,
    /// RSI level above which an extended leg is considered hot.
    pub rsi_hot: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_bars: 350,
            score_ttl_secs: 300,
            idempotency_window_secs: 180,
            first_dip_reset_on_reentry: true,
            extension_threshold: 0.25,
            invalidation_atr_mult: 1.5,
            emergency_break_buffer: 0.02,
            rsi_hot: 70.0,
        }
    }
}

/// Size fractions per aggression/exit-pressure tier, as fractions of the
/// position's allocation cap (entries) or current holdings (trims).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierTable {
    pub aggressive: f64,
    pub normal: f64,
    pub patient: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Score at or above which a tier is aggressive.
    pub aggressive_threshold: f64,
    /// Score below which a tier is patient.
    pub patient_threshold: f64,
    /// Entry sizes for a first-stage (S1) entry.
    pub entry_initial: TierTable,
    /// Entry sizes for later-stage (S2/S3) entries and reclaim re-entries.
    pub entry_late: TierTable,
    /// Entry sizes for the first qualifying dip after entering the mature state.
    pub entry_first_dip: TierTable,
    /// Trim sizes by exit-pressure tier.
    pub trim: TierTable,
    /// Bounds for the entry allocation-risk multiplier.
    pub entry_mult_min: f64,
    pub entry_mult_max: f64,
    /// Bounds for the trim risk multiplier.
    pub trim_mult_min: f64,
    pub trim_mult_max: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            aggressive_threshold: 0.7,
            patient_threshold: 0.3,
            entry_initial: TierTable {
                aggressive: 0.50,
                normal: 0.30,
                patient: 0.10,
            },
            entry_late: TierTable {
                aggressive: 0.25,
                normal: 0.15,
                patient: 0.05,
            },
            entry_first_dip: TierTable {
                aggressive: 0.35,
                normal: 0.20,
                patient: 0.08,
            },
            trim: TierTable {
                aggressive: 0.50,
                normal: 0.10,
                patient: 0.03,
            },
            entry_mult_min: 0.3,
            entry_mult_max: 1.5,
            trim_mult_min: 0.3,
            trim_mult_max: 3.0,
        }
    }
}

/// One scheduled job per timeframe; cron expressions in UTC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Timeframe string (`1h`, `4h`, `1d`) to cron expression.
    pub jobs: HashMap<String, String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let mut jobs = HashMap::new();
        jobs.insert("1h".to_string(), "0 5 * * * *".to_string());
        jobs.insert("4h".to_string(), "0 10 0,4,8,12,16,20 * * *".to_string());
        jobs.insert("1d".to_string(), "0 15 0 * * *".to_string());
        Self {
            enabled: true,
            jobs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// When true, decisions are computed and recorded but the execution
    /// service is never called.
    pub dry_run: bool,
    /// Default venue/chain for order routing.
    pub venue: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            venue: "solana".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/folio".to_string(),
            max_connections: 10,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            sizing: SizingConfig::default(),
            scheduler: SchedulerConfig::default(),
            execution: ExecutionConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.engine.min_bars, 350);
        assert_eq!(cfg.engine.score_ttl_secs, 300);
        assert_eq!(cfg.engine.idempotency_window_secs, 180);
        assert!(cfg.execution.dry_run);
    }

    #[test]
    fn trim_table_is_monotone_in_tier() {
        let sizing = SizingConfig::default();
        assert!(sizing.trim.aggressive > sizing.trim.normal);
        assert!(sizing.trim.normal > sizing.trim.patient);
    }
}
