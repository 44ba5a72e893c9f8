//! 领域事件
//!
//! 状态转换、工作流进度和实例变化通过事件流对外发布。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use orchestrator_core::models::{JobKind, JobStatus, StateTransition, StatusReason};
use orchestrator_core::SchedulerResult;

/// 领域事件基础trait
pub trait DomainEvent: Send + Sync {
    fn event_id(&self) -> Uuid;
    fn event_type(&self) -> &str;
    fn occurred_at(&self) -> DateTime<Utc>;
    fn aggregate_id(&self) -> String;
}

/// 作业相关事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    JobCreated {
        id: Uuid,
        job_id: i64,
        kind: JobKind,
        name: String,
        created_by: String,
        occurred_at: DateTime<Utc>,
    },
    JobStateChanged {
        id: Uuid,
        job_id: i64,
        from: JobStatus,
        to: JobStatus,
        reason: Option<StatusReason>,
        occurred_at: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn created(job_id: i64, kind: JobKind, name: &str, created_by: &str) -> Self {
        JobEvent::JobCreated {
            id: Uuid::new_v4(),
            job_id,
            kind,
            name: name.to_string(),
            created_by: created_by.to_string(),
            occurred_at: Utc::now(),
        }
    }

    pub fn state_changed(transition: &StateTransition) -> Self {
        JobEvent::JobStateChanged {
            id: Uuid::new_v4(),
            job_id: transition.job_id,
            from: transition.from,
            to: transition.to,
            reason: transition.reason.clone(),
            occurred_at: transition.occurred_at,
        }
    }
}

impl DomainEvent for JobEvent {
    fn event_id(&self) -> Uuid {
        match self {
            JobEvent::JobCreated { id, .. } => *id,
            JobEvent::JobStateChanged { id, .. } => *id,
        }
    }

    fn event_type(&self) -> &str {
        match self {
            JobEvent::JobCreated { .. } => "JobCreated",
            JobEvent::JobStateChanged { .. } => "JobStateChanged",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            JobEvent::JobCreated { occurred_at, .. } => *occurred_at,
            JobEvent::JobStateChanged { occurred_at, .. } => *occurred_at,
        }
    }

    fn aggregate_id(&self) -> String {
        match self {
            JobEvent::JobCreated { job_id, .. } => job_id.to_string(),
            JobEvent::JobStateChanged { job_id, .. } => job_id.to_string(),
        }
    }
}

/// 工作流相关事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkflowEvent {
    WorkflowStarted {
        id: Uuid,
        workflow_job_id: i64,
        occurred_at: DateTime<Utc>,
    },
    NodeSpawned {
        id: Uuid,
        workflow_job_id: i64,
        node_id: i64,
        job_id: i64,
        occurred_at: DateTime<Utc>,
    },
    NodeSkipped {
        id: Uuid,
        workflow_job_id: i64,
        node_id: i64,
        occurred_at: DateTime<Utc>,
    },
    WorkflowFinished {
        id: Uuid,
        workflow_job_id: i64,
        status: JobStatus,
        occurred_at: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    pub fn started(workflow_job_id: i64) -> Self {
        WorkflowEvent::WorkflowStarted {
            id: Uuid::new_v4(),
            workflow_job_id,
            occurred_at: Utc::now(),
        }
    }

    pub fn node_spawned(workflow_job_id: i64, node_id: i64, job_id: i64) -> Self {
        WorkflowEvent::NodeSpawned {
            id: Uuid::new_v4(),
            workflow_job_id,
            node_id,
            job_id,
            occurred_at: Utc::now(),
        }
    }

    pub fn node_skipped(workflow_job_id: i64, node_id: i64) -> Self {
        WorkflowEvent::NodeSkipped {
            id: Uuid::new_v4(),
            workflow_job_id,
            node_id,
            occurred_at: Utc::now(),
        }
    }

    pub fn finished(workflow_job_id: i64, status: JobStatus) -> Self {
        WorkflowEvent::WorkflowFinished {
            id: Uuid::new_v4(),
            workflow_job_id,
            status,
            occurred_at: Utc::now(),
        }
    }
}

impl DomainEvent for WorkflowEvent {
    fn event_id(&self) -> Uuid {
        match self {
            WorkflowEvent::WorkflowStarted { id, .. } => *id,
            WorkflowEvent::NodeSpawned { id, .. } => *id,
            WorkflowEvent::NodeSkipped { id, .. } => *id,
            WorkflowEvent::WorkflowFinished { id, .. } => *id,
        }
    }

    fn event_type(&self) -> &str {
        match self {
            WorkflowEvent::WorkflowStarted { .. } => "WorkflowStarted",
            WorkflowEvent::NodeSpawned { .. } => "NodeSpawned",
            WorkflowEvent::NodeSkipped { .. } => "NodeSkipped",
            WorkflowEvent::WorkflowFinished { .. } => "WorkflowFinished",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WorkflowEvent::WorkflowStarted { occurred_at, .. } => *occurred_at,
            WorkflowEvent::NodeSpawned { occurred_at, .. } => *occurred_at,
            WorkflowEvent::NodeSkipped { occurred_at, .. } => *occurred_at,
            WorkflowEvent::WorkflowFinished { occurred_at, .. } => *occurred_at,
        }
    }

    fn aggregate_id(&self) -> String {
        match self {
            WorkflowEvent::WorkflowStarted {
                workflow_job_id, ..
            }
            | WorkflowEvent::NodeSpawned {
                workflow_job_id, ..
            }
            | WorkflowEvent::NodeSkipped {
                workflow_job_id, ..
            }
            | WorkflowEvent::WorkflowFinished {
                workflow_job_id, ..
            } => workflow_job_id.to_string(),
        }
    }
}

/// 实例相关事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InstanceEvent {
    InstanceRegistered {
        id: Uuid,
        instance_id: String,
        capacity: u32,
        occurred_at: DateTime<Utc>,
    },
    CapacityReported {
        id: Uuid,
        instance_id: String,
        capacity: u32,
        occurred_at: DateTime<Utc>,
    },
    InstanceLost {
        id: Uuid,
        instance_id: String,
        occurred_at: DateTime<Utc>,
    },
}

impl InstanceEvent {
    pub fn registered(instance_id: &str, capacity: u32) -> Self {
        InstanceEvent::InstanceRegistered {
            id: Uuid::new_v4(),
            instance_id: instance_id.to_string(),
            capacity,
            occurred_at: Utc::now(),
        }
    }

    pub fn capacity_reported(instance_id: &str, capacity: u32) -> Self {
        InstanceEvent::CapacityReported {
            id: Uuid::new_v4(),
            instance_id: instance_id.to_string(),
            capacity,
            occurred_at: Utc::now(),
        }
    }

    pub fn lost(instance_id: &str) -> Self {
        InstanceEvent::InstanceLost {
            id: Uuid::new_v4(),
            instance_id: instance_id.to_string(),
            occurred_at: Utc::now(),
        }
    }
}

impl DomainEvent for InstanceEvent {
    fn event_id(&self) -> Uuid {
        match self {
            InstanceEvent::InstanceRegistered { id, .. } => *id,
            InstanceEvent::CapacityReported { id, .. } => *id,
            InstanceEvent::InstanceLost { id, .. } => *id,
        }
    }

    fn event_type(&self) -> &str {
        match self {
            InstanceEvent::InstanceRegistered { .. } => "InstanceRegistered",
            InstanceEvent::CapacityReported { .. } => "CapacityReported",
            InstanceEvent::InstanceLost { .. } => "InstanceLost",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InstanceEvent::InstanceRegistered { occurred_at, .. } => *occurred_at,
            InstanceEvent::CapacityReported { occurred_at, .. } => *occurred_at,
            InstanceEvent::InstanceLost { occurred_at, .. } => *occurred_at,
        }
    }

    fn aggregate_id(&self) -> String {
        match self {
            InstanceEvent::InstanceRegistered { instance_id, .. }
            | InstanceEvent::CapacityReported { instance_id, .. }
            | InstanceEvent::InstanceLost { instance_id, .. } => instance_id.clone(),
        }
    }
}

/// 事件流上传输的统一事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SchedulerEvent {
    Job(JobEvent),
    Workflow(WorkflowEvent),
    Instance(InstanceEvent),
}

impl SchedulerEvent {
    fn inner(&self) -> &dyn DomainEvent {
        match self {
            SchedulerEvent::Job(event) => event as &dyn DomainEvent,
            SchedulerEvent::Workflow(event) => event as &dyn DomainEvent,
            SchedulerEvent::Instance(event) => event as &dyn DomainEvent,
        }
    }
}

impl DomainEvent for SchedulerEvent {
    fn event_id(&self) -> Uuid {
        self.inner().event_id()
    }

    fn event_type(&self) -> &str {
        match self {
            SchedulerEvent::Job(event) => event.event_type(),
            SchedulerEvent::Workflow(event) => event.event_type(),
            SchedulerEvent::Instance(event) => event.event_type(),
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.inner().occurred_at()
    }

    fn aggregate_id(&self) -> String {
        self.inner().aggregate_id()
    }
}

impl From<JobEvent> for SchedulerEvent {
    fn from(event: JobEvent) -> Self {
        SchedulerEvent::Job(event)
    }
}

impl From<WorkflowEvent> for SchedulerEvent {
    fn from(event: WorkflowEvent) -> Self {
        SchedulerEvent::Workflow(event)
    }
}

impl From<InstanceEvent> for SchedulerEvent {
    fn from(event: InstanceEvent) -> Self {
        SchedulerEvent::Instance(event)
    }
}

/// 事件发布接口
///
/// 没有订阅者时发布不是错误。
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: SchedulerEvent) -> SchedulerResult<()>;

    fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_changed_event_mirrors_transition() {
        let transition = StateTransition {
            job_id: 12,
            sequence: 3,
            from: JobStatus::Running,
            to: JobStatus::Failed,
            reason: Some(StatusReason::Timeout { limit_seconds: 60 }),
            actor: None,
            occurred_at: Utc::now(),
        };
        let event: SchedulerEvent = JobEvent::state_changed(&transition).into();
        assert_eq!(event.event_type(), "JobStateChanged");
        assert_eq!(event.aggregate_id(), "12");
        assert_eq!(event.occurred_at(), transition.occurred_at);
    }
}
