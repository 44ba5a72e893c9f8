pub mod events;
pub mod freshness;
pub mod state_machine;
pub mod workflow_graph;

pub use events::*;
pub use freshness::FreshnessPolicy;
pub use orchestrator_core::{SchedulerError, SchedulerResult};
pub use state_machine::JobStateMachine;
pub use workflow_graph::NodeDecision;
