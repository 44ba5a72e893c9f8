//! Structured logging utilities
//!
//! Every helper emits an `event = "..."` field so log pipelines can filter on
//! orchestrator events without parsing messages.

use tracing::{debug, info, warn};

use orchestrator_core::models::{JobKind, JobStatus, StateTransition, SyncTarget};

/// Structured logging utilities
pub struct StructuredLogger;

impl StructuredLogger {
    /// Log an accepted launch request
    pub fn log_job_launched(job_id: i64, kind: JobKind, name: &str, created_by: &str) {
        info!(
            event = "job_launched",
            job.id = job_id,
            job.kind = kind.as_str(),
            job.name = name,
            job.created_by = created_by,
            "Job launched"
        );
    }

    /// Log a rejected launch request
    pub fn log_launch_rejected(target: &str, reason: &str) {
        warn!(
            event = "launch_rejected",
            launch.target = target,
            launch.reason = reason,
            "Launch request rejected"
        );
    }

    /// Log a job state transition
    pub fn log_state_transition(transition: &StateTransition) {
        let reason = transition
            .reason
            .as_ref()
            .map(|r| r.to_string())
            .unwrap_or_default();
        if transition.to.is_unsuccessful() {
            warn!(
                event = "job_state_transition",
                job.id = transition.job_id,
                job.from = transition.from.as_str(),
                job.to = transition.to.as_str(),
                job.reason = %reason,
                transition.sequence = transition.sequence,
                "Job state changed"
            );
        } else {
            info!(
                event = "job_state_transition",
                job.id = transition.job_id,
                job.from = transition.from.as_str(),
                job.to = transition.to.as_str(),
                transition.sequence = transition.sequence,
                "Job state changed"
            );
        }
    }

    /// Log resolved sync prerequisites
    pub fn log_dependencies_resolved(job_id: i64, prerequisites: &[SyncTarget]) {
        let targets = prerequisites
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        info!(
            event = "dependencies_resolved",
            job.id = job_id,
            dependency.count = prerequisites.len(),
            dependency.targets = %targets,
            "Job prerequisites resolved"
        );
    }

    /// Log a granted capacity reservation
    pub fn log_capacity_reserved(job_id: i64, instance_id: &str, units: u32, remaining: u32) {
        debug!(
            event = "capacity_reserved",
            job.id = job_id,
            instance.id = instance_id,
            capacity.units = units,
            capacity.remaining = remaining,
            "Capacity reserved"
        );
    }

    /// Log a job that could not fit on any instance
    pub fn log_capacity_unavailable(job_id: i64, units: u32) {
        debug!(
            event = "capacity_unavailable",
            job.id = job_id,
            capacity.units = units,
            "No instance can fit job, leaving it pending"
        );
    }

    /// Log a job handed to the execution layer
    pub fn log_job_dispatched(job_id: i64, instance_id: &str) {
        info!(
            event = "job_dispatched",
            job.id = job_id,
            instance.id = instance_id,
            "Job dispatched to instance"
        );
    }

    /// Log a finished job
    pub fn log_job_finished(job_id: i64, status: JobStatus, duration_ms: Option<i64>) {
        info!(
            event = "job_finished",
            job.id = job_id,
            job.status = status.as_str(),
            job.duration_ms = duration_ms.unwrap_or_default(),
            "Job finished"
        );
    }

    /// Log a workflow node spawn
    pub fn log_workflow_node_spawned(workflow_job_id: i64, node_id: i64, job_id: i64) {
        info!(
            event = "workflow_node_spawned",
            workflow.id = workflow_job_id,
            workflow.node_id = node_id,
            job.id = job_id,
            "Workflow node spawned"
        );
    }

    /// Log a finished workflow
    pub fn log_workflow_finished(workflow_job_id: i64, status: JobStatus) {
        info!(
            event = "workflow_finished",
            workflow.id = workflow_job_id,
            workflow.status = status.as_str(),
            "Workflow finished"
        );
    }

    /// Log an instance marked unavailable
    pub fn log_instance_lost(instance_id: &str, seconds_since_heartbeat: i64) {
        warn!(
            event = "instance_lost",
            instance.id = instance_id,
            instance.seconds_since_heartbeat = seconds_since_heartbeat,
            "Instance stopped reporting"
        );
    }

    /// Log a running job reconciled at startup
    pub fn log_orphan_reconciled(job_id: i64, instance_id: Option<&str>) {
        warn!(
            event = "orphan_reconciled",
            job.id = job_id,
            instance.id = instance_id.unwrap_or("unknown"),
            "Running job has no live execution after restart"
        );
    }
}
