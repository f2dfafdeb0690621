pub mod orchestrator;
pub mod reconciler;

pub use orchestrator::{RunOptions, RunOrchestrator};
pub use reconciler::ReconciliationEngine;
