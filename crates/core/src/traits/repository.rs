//! 数据仓储层接口定义
//!
//! 此模块定义了编排核心依赖的存储抽象：
//! - 作业仓储 (`JobRepository`)，带乐观并发版本校验
//! - 模板、项目、清单、工作流仓储
//! - 只追加的审计记录 (`AuditTrail`)
//!
//! 持久化格式不属于核心职责，默认实现是基础设施层的内存仓储，
//! 进程重启时通过快照 (`StateSnapshot`) 恢复。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use orchestrator_core::traits::JobRepository;
//!
//! async fn bump(repo: &dyn JobRepository, job_id: i64) -> SchedulerResult<()> {
//!     let mut job = repo.get(job_id).await?.ok_or(SchedulerError::job_not_found(job_id))?;
//!     job.priority += 1;
//!     // 版本号不一致时返回 ConcurrentModification
//!     repo.update(&job).await?;
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    Inventory, Job, JobSpec, JobStatus, JobTemplate, Project, StateTransition, SyncTarget,
    WorkflowJob, WorkflowJobTemplate,
};
use crate::SchedulerResult;

/// 作业仓储接口
///
/// 所有写操作都以 `version` 做乐观并发控制：`update` 只在存储中的版本
/// 与传入作业的版本一致时成功，成功后版本加一并返回最新副本。
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 分配ID并以 `new` 状态保存作业
    async fn create(&self, spec: JobSpec) -> SchedulerResult<Job>;

    async fn get(&self, id: i64) -> SchedulerResult<Option<Job>>;

    /// 带版本校验的整体更新
    ///
    /// # 错误
    ///
    /// * `JobNotFound` - 作业不存在
    /// * `ConcurrentModification` - 版本号不一致
    async fn update(&self, job: &Job) -> SchedulerResult<Job>;

    async fn list_by_status(&self, status: JobStatus) -> SchedulerResult<Vec<Job>>;

    /// 模板下所有未结束的作业
    async fn list_active_by_template(&self, template_id: i64) -> SchedulerResult<Vec<Job>>;

    /// 查找针对同一目标、尚未结束的同步作业
    async fn find_active_sync(&self, target: SyncTarget) -> SchedulerResult<Option<Job>>;

    async fn list_all(&self) -> SchedulerResult<Vec<Job>>;

    /// 从快照恢复作业，保留原有ID与版本
    async fn restore(&self, jobs: Vec<Job>) -> SchedulerResult<()>;
}

/// 作业模板仓储接口
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn get(&self, id: i64) -> SchedulerResult<Option<JobTemplate>>;
    async fn save(&self, template: JobTemplate) -> SchedulerResult<()>;
}

/// 项目仓储接口
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn get(&self, id: i64) -> SchedulerResult<Option<Project>>;
    async fn save(&self, project: Project) -> SchedulerResult<()>;
    /// 记录最近一次成功同步时间
    async fn record_sync(&self, id: i64, synced_at: DateTime<Utc>) -> SchedulerResult<()>;
}

/// 清单仓储接口
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    async fn get(&self, id: i64) -> SchedulerResult<Option<Inventory>>;
    async fn save(&self, inventory: Inventory) -> SchedulerResult<()>;
    async fn record_sync(&self, id: i64, synced_at: DateTime<Utc>) -> SchedulerResult<()>;
}

/// 工作流仓储接口
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn get_template(&self, id: i64) -> SchedulerResult<Option<WorkflowJobTemplate>>;
    async fn save_template(&self, template: WorkflowJobTemplate) -> SchedulerResult<()>;

    /// 分配ID并保存工作流作业，传入的 `id` 被忽略
    async fn create_job(&self, workflow_job: WorkflowJob) -> SchedulerResult<WorkflowJob>;
    async fn get_job(&self, id: i64) -> SchedulerResult<Option<WorkflowJob>>;
    async fn update_job(&self, workflow_job: &WorkflowJob) -> SchedulerResult<()>;
    /// 未结束的工作流作业
    async fn list_active_jobs(&self) -> SchedulerResult<Vec<WorkflowJob>>;
    async fn list_all_jobs(&self) -> SchedulerResult<Vec<WorkflowJob>>;
    async fn restore_jobs(&self, workflow_jobs: Vec<WorkflowJob>) -> SchedulerResult<()>;
}

/// 审计记录接口
///
/// 只追加：实现不得修改或删除已写入的记录。
#[async_trait]
pub trait AuditTrail: Send + Sync {
    /// 追加一条转换记录，`sequence` 由实现分配并返回
    async fn append(&self, transition: StateTransition) -> SchedulerResult<StateTransition>;

    /// 按发生顺序返回作业的全部转换记录
    async fn for_job(&self, job_id: i64) -> SchedulerResult<Vec<StateTransition>>;

    async fn all(&self) -> SchedulerResult<Vec<StateTransition>>;

    async fn restore(&self, transitions: Vec<StateTransition>) -> SchedulerResult<()>;
}
