//! 调度核心
//!
//! 容量登记、前置同步解析、作业生命周期、调度派发和工作流推进。
//! [`system::Orchestrator`] 负责把这些组件装配在一起。

pub mod capacity_registry;
pub mod controller;
pub mod coordinator;
pub mod dependency_resolver;
pub mod instance_failure_detector;
pub mod lifecycle;
pub mod recovery_service;
pub mod scheduler;
pub mod strategies;
pub mod system;
pub mod workflow_engine;

pub use capacity_registry::{CapacityRegistry, Reservation};
pub use controller::{CancelOutcome, JobController};
pub use coordinator::Coordinator;
pub use dependency_resolver::{DependencyResolver, Prerequisite};
pub use instance_failure_detector::{InstanceFailureDetector, InstanceFailureDetectorConfig};
pub use lifecycle::JobLifecycle;
pub use recovery_service::{RecoveryReport, RecoveryService};
pub use scheduler::{SchedulePassReport, Scheduler};
pub use strategies::*;
pub use system::{Collaborators, Orchestrator};
pub use workflow_engine::WorkflowEngine;
