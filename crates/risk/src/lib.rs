pub mod scoring;
pub mod sizing;

pub use scoring::{resolve_scores, score, RiskInputs, RiskScores, Tier};
pub use sizing::{entry_fraction, entry_multiplier, trim_fraction, trim_multiplier, EntryStage};
