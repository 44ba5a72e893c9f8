use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 作业种类
///
/// 对应平台中的统一作业子类型：模板作业、项目同步、清单同步、临时命令和系统作业。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Playbook,
    ProjectUpdate,
    InventoryUpdate,
    AdHocCommand,
    SystemJob,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Playbook => "playbook",
            JobKind::ProjectUpdate => "project_update",
            JobKind::InventoryUpdate => "inventory_update",
            JobKind::AdHocCommand => "ad_hoc_command",
            JobKind::SystemJob => "system_job",
        }
    }

    pub fn is_sync(&self) -> bool {
        matches!(self, JobKind::ProjectUpdate | JobKind::InventoryUpdate)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 作业类型 (check/run/scan/cleanup)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Check,
    Run,
    Scan,
    Cleanup,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobType::Check => "check",
            JobType::Run => "run",
            JobType::Scan => "scan",
            JobType::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

/// 作业状态
///
/// `new → pending → waiting → running → {successful, failed, error, canceled}`，
/// 终止状态不可再变化。合法转换由 `orchestrator_domain::state_machine` 约束。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    New,
    Pending,
    Waiting,
    Running,
    Successful,
    Failed,
    Error,
    Canceled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::Pending => "pending",
            JobStatus::Waiting => "waiting",
            JobStatus::Running => "running",
            JobStatus::Successful => "successful",
            JobStatus::Failed => "failed",
            JobStatus::Error => "error",
            JobStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Successful | JobStatus::Failed | JobStatus::Error | JobStatus::Canceled
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// 终止但未成功
    pub fn is_unsuccessful(&self) -> bool {
        matches!(
            self,
            JobStatus::Failed | JobStatus::Error | JobStatus::Canceled
        )
    }

    pub const ALL: [JobStatus; 8] = [
        JobStatus::New,
        JobStatus::Pending,
        JobStatus::Waiting,
        JobStatus::Running,
        JobStatus::Successful,
        JobStatus::Failed,
        JobStatus::Error,
        JobStatus::Canceled,
    ];
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 状态变化原因，随状态一起记录，供状态查询和事件流使用
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusReason {
    InvalidSpec { message: String },
    DependencyFailed { dependency_id: i64 },
    Timeout { limit_seconds: u64 },
    OrphanedOnRestart,
    InstanceLost { instance_id: String },
    LaunchFailed { message: String },
    ExecutionFailed { exit_code: i32 },
    ExecutionCrashed { message: String },
    CanceledBy { actor: String },
    WorkflowCanceled { workflow_job_id: i64 },
}

impl fmt::Display for StatusReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusReason::InvalidSpec { message } => write!(f, "无效的作业定义: {message}"),
            StatusReason::DependencyFailed { dependency_id } => {
                write!(f, "前置作业 {dependency_id} 未成功")
            }
            StatusReason::Timeout { limit_seconds } => {
                write!(f, "运行时间超过 {limit_seconds} 秒")
            }
            StatusReason::OrphanedOnRestart => write!(f, "重启后未发现执行心跳"),
            StatusReason::InstanceLost { instance_id } => {
                write!(f, "执行实例 {instance_id} 已失联")
            }
            StatusReason::LaunchFailed { message } => write!(f, "启动失败: {message}"),
            StatusReason::ExecutionFailed { exit_code } => {
                write!(f, "执行失败，退出码 {exit_code}")
            }
            StatusReason::ExecutionCrashed { message } => write!(f, "执行进程崩溃: {message}"),
            StatusReason::CanceledBy { actor } => write!(f, "由 {actor} 取消"),
            StatusReason::WorkflowCanceled { workflow_job_id } => {
                write!(f, "所属工作流 {workflow_job_id} 已取消")
            }
        }
    }
}

/// 同步作业的目标
///
/// 声明顺序即优先级：项目同步排在清单同步之前。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SyncTarget {
    Project(i64),
    Inventory(i64),
}

impl SyncTarget {
    pub fn job_kind(&self) -> JobKind {
        match self {
            SyncTarget::Project(_) => JobKind::ProjectUpdate,
            SyncTarget::Inventory(_) => JobKind::InventoryUpdate,
        }
    }
}

impl fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncTarget::Project(id) => write!(f, "project_update({id})"),
            SyncTarget::Inventory(id) => write!(f, "inventory_update({id})"),
        }
    }
}

/// 创建作业所需的完整描述
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub kind: JobKind,
    pub name: String,
    pub template_id: Option<i64>,
    pub job_type: JobType,
    pub project_id: Option<i64>,
    pub inventory_id: Option<i64>,
    pub credential_id: Option<i64>,
    pub extra_vars: serde_json::Value,
    pub capacity_units: u32,
    pub priority: i32,
    pub timeout_seconds: u64,
    pub created_by: String,
    pub workflow_job_id: Option<i64>,
}

impl JobSpec {
    /// 为同步目标生成同步作业描述
    pub fn sync(target: SyncTarget, created_by: &str) -> Self {
        let (name, project_id, inventory_id) = match target {
            SyncTarget::Project(id) => (format!("project-{id}-update"), Some(id), None),
            SyncTarget::Inventory(id) => (format!("inventory-{id}-update"), None, Some(id)),
        };
        Self {
            kind: target.job_kind(),
            name,
            template_id: None,
            job_type: JobType::Run,
            project_id,
            inventory_id,
            credential_id: None,
            extra_vars: serde_json::json!({}),
            capacity_units: 1,
            priority: 0,
            timeout_seconds: 0,
            created_by: created_by.to_string(),
            workflow_job_id: None,
        }
    }

    pub fn sync_target(&self) -> Option<SyncTarget> {
        match self.kind {
            JobKind::ProjectUpdate => self.project_id.map(SyncTarget::Project),
            JobKind::InventoryUpdate => self.inventory_id.map(SyncTarget::Inventory),
            _ => None,
        }
    }
}

/// 一次作业执行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub kind: JobKind,
    pub name: String,
    pub template_id: Option<i64>,
    pub job_type: JobType,
    pub project_id: Option<i64>,
    pub inventory_id: Option<i64>,
    pub credential_id: Option<i64>,
    pub extra_vars: serde_json::Value,
    pub status: JobStatus,
    pub status_reason: Option<StatusReason>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub capacity_units: u32,
    pub instance_id: Option<String>,
    pub dependencies: Vec<i64>,
    pub priority: i32,
    /// 最大运行时间（秒），0 表示不限制
    pub timeout_seconds: u64,
    pub workflow_job_id: Option<i64>,
    pub exit_code: Option<i32>,
    pub cancel_requested: bool,
    /// 乐观并发版本号，每次写入递增
    pub version: u64,
}

impl Job {
    pub fn from_spec(id: i64, spec: JobSpec, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            kind: spec.kind,
            name: spec.name,
            template_id: spec.template_id,
            job_type: spec.job_type,
            project_id: spec.project_id,
            inventory_id: spec.inventory_id,
            credential_id: spec.credential_id,
            extra_vars: spec.extra_vars,
            status: JobStatus::New,
            status_reason: None,
            created_by: spec.created_by,
            created_at,
            started_at: None,
            finished_at: None,
            capacity_units: spec.capacity_units,
            instance_id: None,
            dependencies: Vec::new(),
            priority: spec.priority,
            timeout_seconds: spec.timeout_seconds,
            workflow_job_id: spec.workflow_job_id,
            exit_code: None,
            cancel_requested: false,
            version: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }

    pub fn sync_target(&self) -> Option<SyncTarget> {
        match self.kind {
            JobKind::ProjectUpdate => self.project_id.map(SyncTarget::Project),
            JobKind::InventoryUpdate => self.inventory_id.map(SyncTarget::Inventory),
            _ => None,
        }
    }

    /// 已运行时长（秒），未开始时为 None
    pub fn running_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        match (self.status, self.started_at) {
            (JobStatus::Running, Some(started)) => Some((now - started).num_seconds()),
            _ => None,
        }
    }

    pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
        if self.timeout_seconds == 0 {
            return false;
        }
        // 超出 i64 的时限视为永不超时
        let Ok(limit) = i64::try_from(self.timeout_seconds) else {
            return false;
        };
        self.running_seconds(now)
            .map(|elapsed| elapsed >= limit)
            .unwrap_or(false)
    }

    pub fn execution_duration_ms(&self) -> Option<i64> {
        if let (Some(started), Some(finished)) = (self.started_at, self.finished_at) {
            Some((finished - started).num_milliseconds())
        } else {
            None
        }
    }

    pub fn status_view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.id,
            status: self.status,
            status_reason: self.status_reason.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            instance_id: self.instance_id.clone(),
        }
    }
}

/// 状态查询结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatusView {
    pub job_id: i64,
    pub status: JobStatus,
    pub status_reason: Option<StatusReason>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub instance_id: Option<String>,
}
