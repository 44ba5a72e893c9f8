use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{JobStatus, StatusReason};

/// 审计记录：一次状态转换
///
/// 只追加，不改写。`sequence` 在单个作业内单调递增。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateTransition {
    pub job_id: i64,
    pub sequence: u64,
    pub from: JobStatus,
    pub to: JobStatus,
    pub reason: Option<StatusReason>,
    pub actor: Option<String>,
    pub occurred_at: DateTime<Utc>,
}
