use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{JobStatus, StatusReason};

/// 工作流边的触发条件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EdgeCondition {
    OnSuccess,
    OnFailure,
    Always,
}

impl EdgeCondition {
    /// 前驱节点处于给定终止状态时该边是否触发
    pub fn is_satisfied_by(&self, status: JobStatus) -> bool {
        match self {
            EdgeCondition::OnSuccess => status == JobStatus::Successful,
            EdgeCondition::OnFailure => matches!(status, JobStatus::Failed | JobStatus::Error),
            EdgeCondition::Always => status.is_terminal(),
        }
    }

    /// 该边是否为失败恢复路径
    pub fn handles_failure(&self) -> bool {
        matches!(self, EdgeCondition::OnFailure | EdgeCondition::Always)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowNodeTemplate {
    pub id: i64,
    pub job_template_id: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowEdge {
    pub from: i64,
    pub to: i64,
    pub condition: EdgeCondition,
}

/// 工作流模板
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowJobTemplate {
    pub id: i64,
    pub name: String,
    pub nodes: Vec<WorkflowNodeTemplate>,
    pub edges: Vec<WorkflowEdge>,
    pub allow_simultaneous: bool,
    pub created_at: DateTime<Utc>,
}

/// 工作流节点运行状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Spawned { job_id: i64 },
    DoNotRun,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowNode {
    pub node_id: i64,
    pub job_template_id: i64,
    pub state: NodeState,
}

/// 工作流作业
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowJob {
    pub id: i64,
    pub workflow_template_id: i64,
    pub name: String,
    pub status: JobStatus,
    pub status_reason: Option<StatusReason>,
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowJob {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn node(&self, node_id: i64) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    pub fn spawned_job_ids(&self) -> Vec<i64> {
        self.nodes
            .iter()
            .filter_map(|n| match n.state {
                NodeState::Spawned { job_id } => Some(job_id),
                _ => None,
            })
            .collect()
    }
}
