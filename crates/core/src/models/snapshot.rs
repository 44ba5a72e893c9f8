use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::Job;
use super::transition::StateTransition;
use super::workflow::WorkflowJob;
use crate::{SchedulerError, SchedulerResult};

/// 持久化快照格式版本
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// 作业与工作流状态的持久化快照
///
/// 编码为 JSON，`schema_version` 不匹配时拒绝解码。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub schema_version: u32,
    pub taken_at: DateTime<Utc>,
    pub jobs: Vec<Job>,
    pub workflow_jobs: Vec<WorkflowJob>,
    pub transitions: Vec<StateTransition>,
}

impl StateSnapshot {
    pub fn new(
        jobs: Vec<Job>,
        workflow_jobs: Vec<WorkflowJob>,
        transitions: Vec<StateTransition>,
    ) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            taken_at: Utc::now(),
            jobs,
            workflow_jobs,
            transitions,
        }
    }

    pub fn to_json(&self) -> SchedulerResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(raw: &str) -> SchedulerResult<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let version = value
            .get("schema_version")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| SchedulerError::Serialization("快照缺少 schema_version".to_string()))?;
        if version != SNAPSHOT_SCHEMA_VERSION as u64 {
            return Err(SchedulerError::Serialization(format!(
                "不支持的快照版本: {version}，当前版本: {SNAPSHOT_SCHEMA_VERSION}"
            )));
        }
        Ok(serde_json::from_value(value)?)
    }
}
