pub mod instance;
pub mod job;
pub mod launch;
pub mod snapshot;
pub mod template;
pub mod transition;
pub mod workflow;

pub use instance::{Instance, InstanceRegistration, InstanceStatus, DEFAULT_INSTANCE_CAPACITY};
pub use job::{
    Job, JobKind, JobSpec, JobStatus, JobStatusView, JobType, StatusReason, SyncTarget,
};
pub use launch::{ExecutionOutcome, LaunchRequest, SecretHandle};
pub use snapshot::{StateSnapshot, SNAPSHOT_SCHEMA_VERSION};
pub use template::{
    merge_extra_vars, AdHocCommandRequest, Inventory, JobTemplate, LaunchOverrides, Project,
};
pub use transition::StateTransition;
pub use workflow::{
    EdgeCondition, NodeState, WorkflowEdge, WorkflowJob, WorkflowJobTemplate, WorkflowNode,
    WorkflowNodeTemplate,
};
