use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex, Notify};
use tracing::{debug, info, warn};

use orchestrator_core::config::JobsConfig;
use orchestrator_core::models::{
    AdHocCommandRequest, Instance, InstanceRegistration, Job, JobKind, JobSpec, JobStatus,
    JobStatusView, JobTemplate, LaunchOverrides, StateTransition, StatusReason, SyncTarget,
};
use orchestrator_core::traits::{
    AuditTrail, CredentialResolver, ExecutionLauncher, InventoryRepository, JobRepository,
    ProjectRepository, TemplateRepository,
};
use orchestrator_core::{SchedulerError, SchedulerResult};
use orchestrator_domain::{EventPublisher, InstanceEvent, SchedulerEvent};
use orchestrator_infrastructure::{MetricsCollector, StructuredLogger};

use crate::capacity_registry::CapacityRegistry;
use crate::dependency_resolver::{DependencyResolver, Prerequisite};
use crate::lifecycle::JobLifecycle;

/// 取消请求的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Accepted,
    AlreadyTerminal(JobStatus),
}

/// 校验失败时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubmitMode {
    /// 外部调用：同步返回错误，不留下作业记录
    Reject,
    /// 内部生成（工作流节点）：作业以 `failed` 结束
    RecordFailure,
}

/// 作业控制入口
///
/// 对外提供启动、查询、取消和事件订阅，并接收实例的注册与容量上报。
pub struct JobController {
    lifecycle: Arc<JobLifecycle>,
    templates: Arc<dyn TemplateRepository>,
    projects: Arc<dyn ProjectRepository>,
    inventories: Arc<dyn InventoryRepository>,
    credentials: Arc<dyn CredentialResolver>,
    launcher: Arc<dyn ExecutionLauncher>,
    capacity: Arc<CapacityRegistry>,
    resolver: DependencyResolver,
    config: JobsConfig,
    metrics: MetricsCollector,
    launch_lock: Mutex<()>,
    wake: Arc<Notify>,
}

impl JobController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lifecycle: Arc<JobLifecycle>,
        templates: Arc<dyn TemplateRepository>,
        projects: Arc<dyn ProjectRepository>,
        inventories: Arc<dyn InventoryRepository>,
        credentials: Arc<dyn CredentialResolver>,
        launcher: Arc<dyn ExecutionLauncher>,
        capacity: Arc<CapacityRegistry>,
        resolver: DependencyResolver,
        config: JobsConfig,
        metrics: MetricsCollector,
        wake: Arc<Notify>,
    ) -> Self {
        Self {
            lifecycle,
            templates,
            projects,
            inventories,
            credentials,
            launcher,
            capacity,
            resolver,
            config,
            metrics,
            launch_lock: Mutex::new(()),
            wake,
        }
    }

    /// 按模板启动作业，返回作业ID
    ///
    /// # 错误
    ///
    /// * `InvalidSpec` - 模板、项目、清单或凭据引用无效，或参数不合法
    /// * `CyclicDependency` - 前置同步存在循环
    /// * `ConcurrentJobBlocked` - 模板不允许并发且已有未结束的作业
    pub async fn launch(&self, template_id: i64, overrides: LaunchOverrides) -> SchedulerResult<i64> {
        let template = self.template_for_launch(template_id).await?;
        let spec = template.to_job_spec(&overrides);
        let job = self
            .submit(spec, template.allow_simultaneous, SubmitMode::Reject)
            .await?;
        Ok(job.id)
    }

    pub async fn launch_ad_hoc(&self, request: AdHocCommandRequest) -> SchedulerResult<i64> {
        let job = self
            .submit(request.to_job_spec(), true, SubmitMode::Reject)
            .await?;
        Ok(job.id)
    }

    /// 启动系统作业（清理等维护任务），模板必须是系统作业类型
    pub async fn launch_system_job(
        &self,
        template_id: i64,
        overrides: LaunchOverrides,
    ) -> SchedulerResult<i64> {
        let template = self.template_for_launch(template_id).await?;
        if template.kind != JobKind::SystemJob {
            self.metrics.record_launch_rejected("invalid_spec");
            return Err(SchedulerError::invalid_spec(format!(
                "模板 {} 不是系统作业模板: {}",
                template_id, template.kind
            )));
        }
        self.launch(template_id, overrides).await
    }

    /// 为工作流节点生成作业；校验失败时作业直接以 `failed` 结束
    pub async fn spawn_for_workflow(
        &self,
        template_id: i64,
        workflow_job_id: i64,
        created_by: &str,
    ) -> SchedulerResult<Job> {
        let template = self.template_for_launch(template_id).await?;
        let mut spec = template.to_job_spec(&LaunchOverrides::by(created_by));
        spec.workflow_job_id = Some(workflow_job_id);
        self.submit(spec, true, SubmitMode::RecordFailure).await
    }

    async fn template_for_launch(&self, template_id: i64) -> SchedulerResult<JobTemplate> {
        match self.templates.get(template_id).await? {
            Some(template) => Ok(template),
            None => {
                self.metrics.record_launch_rejected("invalid_spec");
                Err(SchedulerError::invalid_spec(format!(
                    "作业模板不存在: {template_id}"
                )))
            }
        }
    }

    pub async fn status(&self, job_id: i64) -> SchedulerResult<JobStatusView> {
        Ok(self.lifecycle.get(job_id).await?.status_view())
    }

    /// 作业的完整状态转换记录
    pub async fn history(&self, job_id: i64) -> SchedulerResult<Vec<StateTransition>> {
        self.lifecycle.get(job_id).await?;
        self.lifecycle.audit().for_job(job_id).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.lifecycle.events().subscribe()
    }

    /// 取消作业；已结束的作业保持不变
    pub async fn cancel(&self, job_id: i64, actor: &str) -> SchedulerResult<CancelOutcome> {
        self.cancel_with_reason(
            job_id,
            StatusReason::CanceledBy {
                actor: actor.to_string(),
            },
            actor,
        )
        .await
    }

    pub(crate) async fn cancel_with_reason(
        &self,
        job_id: i64,
        reason: StatusReason,
        actor: &str,
    ) -> SchedulerResult<CancelOutcome> {
        let _guard = self.lifecycle.lock(job_id).await;
        let mut job = self.lifecycle.get(job_id).await?;
        if job.is_terminal() {
            debug!("作业 {} 已处于终止状态 {}，忽略取消", job_id, job.status);
            return Ok(CancelOutcome::AlreadyTerminal(job.status));
        }

        if job.is_running() {
            job.cancel_requested = true;
            if let Some(instance_id) = job.instance_id.as_deref() {
                if let Err(e) = self.launcher.cancel(job_id, instance_id).await {
                    warn!("通知执行层取消作业 {} 失败: {}", job_id, e);
                }
            }
        }

        self.lifecycle
            .transition_locked(job, JobStatus::Canceled, Some(reason), Some(actor))
            .await?;
        info!("作业 {} 已由 {} 取消", job_id, actor);
        self.wake.notify_one();
        Ok(CancelOutcome::Accepted)
    }

    pub async fn register_instance(&self, registration: InstanceRegistration) -> Instance {
        let instance = self.capacity.register(registration).await;
        self.metrics
            .update_instance_capacity(&instance.id, instance.capacity, instance.consumed);
        self.publish(InstanceEvent::registered(&instance.id, instance.capacity).into())
            .await;
        self.wake.notify_one();
        instance
    }

    pub async fn report_capacity(&self, instance_id: &str, capacity: u32) -> SchedulerResult<Instance> {
        let instance = self
            .capacity
            .report_capacity(instance_id, capacity, Utc::now())
            .await?;
        self.metrics
            .update_instance_capacity(&instance.id, instance.capacity, instance.consumed);
        self.publish(InstanceEvent::capacity_reported(&instance.id, capacity).into())
            .await;
        self.wake.notify_one();
        Ok(instance)
    }

    async fn submit(
        &self,
        mut spec: JobSpec,
        allow_simultaneous: bool,
        mode: SubmitMode,
    ) -> SchedulerResult<Job> {
        let _launch = self.launch_lock.lock().await;

        if spec.timeout_seconds == 0 {
            spec.timeout_seconds = self.config.default_timeout_seconds;
        }

        let prerequisites = match self.check_launch(&spec, allow_simultaneous, mode).await {
            Ok(prerequisites) => prerequisites,
            Err(e) if mode == SubmitMode::RecordFailure && e.is_launch_rejection() => {
                return self.record_invalid(spec, &e).await;
            }
            Err(e) => {
                if e.is_launch_rejection() {
                    self.metrics.record_launch_rejected(rejection_label(&e));
                    StructuredLogger::log_launch_rejected(&spec.name, &e.to_string());
                }
                return Err(e);
            }
        };

        let actor = spec.created_by.clone();
        let mut created_syncs = Vec::new();
        let job = match self
            .enqueue_with_prerequisites(spec, &prerequisites, &mut created_syncs)
            .await
        {
            Ok(job) => job,
            Err(e) => {
                self.discard_syncs(&created_syncs, &actor, &e).await;
                return Err(e);
            }
        };

        if !prerequisites.is_empty() {
            let targets: Vec<SyncTarget> = prerequisites.iter().map(|p| p.target).collect();
            StructuredLogger::log_dependencies_resolved(job.id, &targets);
        }
        self.wake.notify_one();
        Ok(job)
    }

    /// 先为缺失的前置同步建作业，再建主作业
    ///
    /// 本次新建的同步作业ID依次写入 `created_syncs`，复用的既有同步不记录。
    async fn enqueue_with_prerequisites(
        &self,
        spec: JobSpec,
        prerequisites: &[Prerequisite],
        created_syncs: &mut Vec<i64>,
    ) -> SchedulerResult<Job> {
        let mut sync_jobs: HashMap<SyncTarget, i64> = HashMap::new();
        for prerequisite in prerequisites {
            let job_id = match prerequisite.existing_job_id {
                Some(existing) => existing,
                None => {
                    let depends_on: Vec<i64> = prerequisite
                        .depends_on
                        .iter()
                        .filter_map(|target| sync_jobs.get(target).copied())
                        .collect();
                    let mut sync_spec = JobSpec::sync(prerequisite.target, &spec.created_by);
                    sync_spec.capacity_units = self.config.sync_capacity_units;
                    sync_spec.timeout_seconds = self.config.default_timeout_seconds;
                    let sync = self.enqueue(sync_spec, depends_on).await?;
                    created_syncs.push(sync.id);
                    sync.id
                }
            };
            sync_jobs.insert(prerequisite.target, job_id);
        }

        let dependencies: Vec<i64> = prerequisites
            .iter()
            .filter_map(|p| sync_jobs.get(&p.target).copied())
            .collect();
        self.enqueue(spec, dependencies).await
    }

    /// 主作业没能入队时，撤销本次为它新建的同步作业
    async fn discard_syncs(&self, created_syncs: &[i64], actor: &str, cause: &SchedulerError) {
        for &sync_id in created_syncs {
            warn!("作业入队失败 ({})，取消随之创建的同步作业 {}", cause, sync_id);
            let reason = StatusReason::CanceledBy {
                actor: actor.to_string(),
            };
            if let Err(e) = self
                .lifecycle
                .transition(sync_id, JobStatus::Canceled, Some(reason), Some(actor))
                .await
            {
                warn!("取消同步作业 {} 失败: {}", sync_id, e);
            }
        }
    }

    /// 启动前的全部校验，返回需要的前置同步
    async fn check_launch(
        &self,
        spec: &JobSpec,
        allow_simultaneous: bool,
        mode: SubmitMode,
    ) -> SchedulerResult<Vec<Prerequisite>> {
        self.validate_references(spec).await?;
        if let Some(credential_id) = spec.credential_id {
            self.credentials.resolve(credential_id).await.map_err(|e| {
                SchedulerError::invalid_spec(format!("凭据 {credential_id} 无法解析: {e}"))
            })?;
        }

        if !allow_simultaneous && mode == SubmitMode::Reject {
            if let Some(template_id) = spec.template_id {
                let active = self.lifecycle.jobs().list_active_by_template(template_id).await?;
                if let Some(blocking) = active.first() {
                    return Err(SchedulerError::ConcurrentJobBlocked {
                        template_id,
                        blocking_job_id: blocking.id,
                    });
                }
            }
        }

        self.resolver.resolve(spec, Utc::now()).await
    }

    async fn validate_references(&self, spec: &JobSpec) -> SchedulerResult<()> {
        if !spec.extra_vars.is_object() {
            return Err(SchedulerError::invalid_spec("extra_vars 必须是 JSON 对象"));
        }
        if spec.capacity_units == 0 {
            return Err(SchedulerError::invalid_spec("作业占用容量必须大于 0"));
        }

        match spec.kind {
            JobKind::Playbook => {
                self.require_project(spec.project_id).await?;
                self.require_inventory(spec.inventory_id).await?;
            }
            JobKind::AdHocCommand => {
                self.require_inventory(spec.inventory_id).await?;
                if spec.credential_id.is_none() {
                    return Err(SchedulerError::invalid_spec("临时命令必须指定凭据"));
                }
            }
            JobKind::ProjectUpdate => self.require_project(spec.project_id).await?,
            JobKind::InventoryUpdate => self.require_inventory(spec.inventory_id).await?,
            JobKind::SystemJob => {}
        }
        Ok(())
    }

    async fn require_project(&self, project_id: Option<i64>) -> SchedulerResult<()> {
        let id = project_id.ok_or_else(|| SchedulerError::invalid_spec("缺少项目"))?;
        match self.projects.get(id).await? {
            Some(_) => Ok(()),
            None => Err(SchedulerError::invalid_spec(format!("引用的项目不存在: {id}"))),
        }
    }

    async fn require_inventory(&self, inventory_id: Option<i64>) -> SchedulerResult<()> {
        let id = inventory_id.ok_or_else(|| SchedulerError::invalid_spec("缺少清单"))?;
        match self.inventories.get(id).await? {
            Some(_) => Ok(()),
            None => Err(SchedulerError::invalid_spec(format!("引用的清单不存在: {id}"))),
        }
    }

    /// 创建作业并推进到 `pending`，有未完成的依赖时继续进入 `waiting`
    async fn enqueue(&self, spec: JobSpec, dependencies: Vec<i64>) -> SchedulerResult<Job> {
        let job = self.lifecycle.create(spec).await?;
        let _guard = self.lifecycle.lock(job.id).await;

        let mut job = job;
        job.dependencies = dependencies;
        let waiting = !job.dependencies.is_empty();
        let job = self
            .lifecycle
            .transition_locked(job, JobStatus::Pending, None, None)
            .await?;
        if waiting {
            return self
                .lifecycle
                .transition_locked(job, JobStatus::Waiting, None, None)
                .await;
        }
        Ok(job)
    }

    async fn record_invalid(&self, spec: JobSpec, error: &SchedulerError) -> SchedulerResult<Job> {
        warn!("内部生成的作业 {} 校验失败: {}", spec.name, error);
        let job = self.lifecycle.create(spec).await?;
        let message = error.to_string();
        self.lifecycle
            .transition(job.id, JobStatus::Failed, Some(StatusReason::InvalidSpec { message }), None)
            .await
    }

    async fn publish(&self, event: SchedulerEvent) {
        if let Err(e) = self.lifecycle.events().publish(event).await {
            warn!("发布事件失败: {}", e);
        }
    }
}

fn rejection_label(error: &SchedulerError) -> &'static str {
    match error {
        SchedulerError::CyclicDependency { .. } => "cyclic_dependency",
        SchedulerError::ConcurrentJobBlocked { .. } => "concurrent_job_blocked",
        _ => "invalid_spec",
    }
}
