pub mod audit_writer;
pub mod decision;
pub mod execution;
pub mod orchestrator;
pub mod scheduler;

pub use audit_writer::AuditWriter;
pub use decision::{decide, Decision, ExitTrigger, HoldReason};
pub use execution::{ExecutionWrapper, PaperExecutionHandler};
pub use orchestrator::{Orchestrator, OrchestratorConfig, TickSummary};
pub use scheduler::TickScheduler;
