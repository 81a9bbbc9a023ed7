pub mod models;
pub mod repositories;
pub mod store;

pub use models::audit::{AuditOutcome, AuditRecord, AuditSink, InMemoryAuditSink};
pub use models::position::{CachedScores, FeatureSet, Holdings, Position, PositionStatus};
pub use store::{InMemoryPositionStore, PositionStore};
