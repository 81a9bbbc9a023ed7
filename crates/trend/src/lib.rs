pub mod bootstrap;
pub mod engine;
pub mod state;

pub use bootstrap::converge;
pub use engine::{TrendConfig, TrendEngine};
pub use state::{TrendContext, TrendFlags, TrendOutput, TrendScores, TrendState};
