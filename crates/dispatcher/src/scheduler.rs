//! 调度器
//!
//! 每次调度依次完成三件事：
//! 1. 结算 `waiting` 作业的依赖
//! 2. 处理运行超时
//! 3. 为 `pending` 作业占用容量并派发
//!
//! 调度之间通过 `pass_lock` 串行，单个作业的读写在作业锁内完成。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info, warn};

use orchestrator_core::config::{DispatcherConfig, JobsConfig};
use orchestrator_core::models::{
    ExecutionOutcome, Job, JobStatus, LaunchRequest, StatusReason, SyncTarget,
};
use orchestrator_core::traits::{
    CredentialResolver, ExecutionLauncher, InventoryRepository, JobRepository,
    ProjectRepository, TemplateRepository,
};
use orchestrator_core::{SchedulerError, SchedulerResult};
use orchestrator_infrastructure::{MetricsCollector, StructuredLogger};

use crate::capacity_registry::{CapacityRegistry, Reservation};
use crate::lifecycle::JobLifecycle;
use crate::strategies::InstanceSelectionStrategy;

/// 一次调度的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulePassReport {
    /// 依赖全部成功、回到 pending 的作业
    pub released: Vec<i64>,
    pub dependency_failed: Vec<i64>,
    pub timed_out: Vec<i64>,
    pub dispatched: Vec<i64>,
    /// 暂无可用容量，留待下次调度
    pub deferred: Vec<i64>,
    pub launch_failed: Vec<i64>,
}

impl SchedulePassReport {
    pub fn is_idle(&self) -> bool {
        self.released.is_empty()
            && self.dependency_failed.is_empty()
            && self.timed_out.is_empty()
            && self.dispatched.is_empty()
            && self.launch_failed.is_empty()
    }
}

pub struct Scheduler {
    lifecycle: Arc<JobLifecycle>,
    capacity: Arc<CapacityRegistry>,
    strategy: Arc<dyn InstanceSelectionStrategy>,
    launcher: Arc<dyn ExecutionLauncher>,
    credentials: Arc<dyn CredentialResolver>,
    templates: Arc<dyn TemplateRepository>,
    projects: Arc<dyn ProjectRepository>,
    inventories: Arc<dyn InventoryRepository>,
    dispatcher_config: DispatcherConfig,
    jobs_config: JobsConfig,
    metrics: MetricsCollector,
    pass_lock: Mutex<()>,
    wake: Arc<Notify>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lifecycle: Arc<JobLifecycle>,
        capacity: Arc<CapacityRegistry>,
        strategy: Arc<dyn InstanceSelectionStrategy>,
        launcher: Arc<dyn ExecutionLauncher>,
        credentials: Arc<dyn CredentialResolver>,
        templates: Arc<dyn TemplateRepository>,
        projects: Arc<dyn ProjectRepository>,
        inventories: Arc<dyn InventoryRepository>,
        dispatcher_config: DispatcherConfig,
        jobs_config: JobsConfig,
        metrics: MetricsCollector,
        wake: Arc<Notify>,
    ) -> Self {
        Self {
            lifecycle,
            capacity,
            strategy,
            launcher,
            credentials,
            templates,
            projects,
            inventories,
            dispatcher_config,
            jobs_config,
            metrics,
            pass_lock: Mutex::new(()),
            wake,
        }
    }

    /// 执行一次完整调度
    pub async fn run_pass(&self, now: DateTime<Utc>) -> SchedulerResult<SchedulePassReport> {
        let _pass = self.pass_lock.lock().await;
        let started = Instant::now();
        let mut report = SchedulePassReport::default();

        self.settle_waiting(&mut report).await?;
        if self.jobs_config.enforce_timeouts {
            self.enforce_timeouts(now, &mut report).await?;
        }
        self.dispatch_pending(&mut report).await?;
        self.update_gauges().await?;

        self.metrics
            .record_scheduling_pass(started.elapsed().as_secs_f64());
        if !report.is_idle() {
            debug!(
                "调度完成: 派发 {} 个, 依赖就绪 {} 个, 依赖失败 {} 个, 超时 {} 个",
                report.dispatched.len(),
                report.released.len(),
                report.dependency_failed.len(),
                report.timed_out.len()
            );
        }
        Ok(report)
    }

    async fn settle_waiting(&self, report: &mut SchedulePassReport) -> SchedulerResult<()> {
        let waiting = self
            .lifecycle
            .jobs()
            .list_by_status(JobStatus::Waiting)
            .await?;

        for candidate in waiting {
            let _guard = self.lifecycle.lock(candidate.id).await;
            let job = self.lifecycle.get(candidate.id).await?;
            if job.status != JobStatus::Waiting {
                continue;
            }

            let (to, reason) = match self.dependency_state(&job).await? {
                DependencyState::Outstanding => continue,
                DependencyState::Satisfied => (JobStatus::Pending, None),
                DependencyState::Failed(dependency_id) => (
                    JobStatus::Failed,
                    Some(StatusReason::DependencyFailed { dependency_id }),
                ),
            };

            let job_id = job.id;
            match self.lifecycle.transition_locked(job, to, reason, None).await {
                Ok(_) if to == JobStatus::Pending => report.released.push(job_id),
                Ok(_) => report.dependency_failed.push(job_id),
                Err(e) => warn!("结算作业 {} 的依赖失败: {}", job_id, e),
            }
        }
        Ok(())
    }

    async fn dependency_state(&self, job: &Job) -> SchedulerResult<DependencyState> {
        let mut outstanding = false;
        for dependency_id in &job.dependencies {
            match self.lifecycle.jobs().get(*dependency_id).await? {
                Some(dependency) if dependency.status == JobStatus::Successful => {}
                Some(dependency) if dependency.status.is_unsuccessful() => {
                    return Ok(DependencyState::Failed(*dependency_id));
                }
                Some(_) => outstanding = true,
                None => {
                    warn!("作业 {} 的依赖 {} 不存在", job.id, dependency_id);
                    return Ok(DependencyState::Failed(*dependency_id));
                }
            }
        }
        Ok(if outstanding {
            DependencyState::Outstanding
        } else {
            DependencyState::Satisfied
        })
    }

    async fn enforce_timeouts(
        &self,
        now: DateTime<Utc>,
        report: &mut SchedulePassReport,
    ) -> SchedulerResult<()> {
        let running = self
            .lifecycle
            .jobs()
            .list_by_status(JobStatus::Running)
            .await?;

        for candidate in running.into_iter().filter(|j| j.is_timed_out(now)) {
            let _guard = self.lifecycle.lock(candidate.id).await;
            let job = self.lifecycle.get(candidate.id).await?;
            if !job.is_running() || !job.is_timed_out(now) {
                continue;
            }

            if let Some(instance_id) = job.instance_id.as_deref() {
                if let Err(e) = self.launcher.cancel(job.id, instance_id).await {
                    warn!("通知执行层终止超时作业 {} 失败: {}", job.id, e);
                }
            }
            let job_id = job.id;
            let limit_seconds = job.timeout_seconds;
            warn!("作业 {} 运行超过 {} 秒，标记为失败", job_id, limit_seconds);
            match self
                .lifecycle
                .transition_locked(
                    job,
                    JobStatus::Failed,
                    Some(StatusReason::Timeout { limit_seconds }),
                    None,
                )
                .await
            {
                Ok(_) => report.timed_out.push(job_id),
                Err(e) => warn!("处理作业 {} 超时失败: {}", job_id, e),
            }
        }
        Ok(())
    }

    async fn dispatch_pending(&self, report: &mut SchedulePassReport) -> SchedulerResult<()> {
        let mut pending = self
            .lifecycle
            .jobs()
            .list_by_status(JobStatus::Pending)
            .await?;
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut exclusive_cache: HashMap<i64, bool> = HashMap::new();
        let mut busy_templates: HashSet<i64> = self
            .lifecycle
            .jobs()
            .list_by_status(JobStatus::Running)
            .await?
            .into_iter()
            .filter_map(|job| job.template_id)
            .collect();

        // 只有真正尝试启动的作业计入本轮额度，等待容量的作业不占额度
        let budget = self.dispatcher_config.max_dispatches_per_pass;
        let mut attempted = 0usize;
        for candidate in pending {
            if attempted >= budget {
                debug!("本轮派发已达上限 {}", budget);
                break;
            }
            if let Some(template_id) = candidate.template_id {
                if busy_templates.contains(&template_id)
                    && self.is_exclusive(template_id, &mut exclusive_cache).await?
                {
                    debug!("模板 {} 已有运行中的作业，作业 {} 等待", template_id, candidate.id);
                    report.deferred.push(candidate.id);
                    continue;
                }
            }

            match self.dispatch_one(candidate.id).await {
                Ok(DispatchResult::Dispatched(job)) => {
                    if let Some(template_id) = job.template_id {
                        busy_templates.insert(template_id);
                    }
                    report.dispatched.push(job.id);
                    attempted += 1;
                }
                Ok(DispatchResult::Deferred) => report.deferred.push(candidate.id),
                Ok(DispatchResult::LaunchFailed) => {
                    report.launch_failed.push(candidate.id);
                    attempted += 1;
                }
                Ok(DispatchResult::Skipped) => {}
                Err(e) => warn!("派发作业 {} 失败: {}", candidate.id, e),
            }
        }
        Ok(())
    }

    async fn is_exclusive(
        &self,
        template_id: i64,
        cache: &mut HashMap<i64, bool>,
    ) -> SchedulerResult<bool> {
        if let Some(exclusive) = cache.get(&template_id) {
            return Ok(*exclusive);
        }
        let exclusive = self
            .templates
            .get(template_id)
            .await?
            .map(|t| !t.allow_simultaneous)
            .unwrap_or(false);
        cache.insert(template_id, exclusive);
        Ok(exclusive)
    }

    async fn dispatch_one(&self, job_id: i64) -> SchedulerResult<DispatchResult> {
        let _guard = self.lifecycle.lock(job_id).await;
        let mut job = self.lifecycle.get(job_id).await?;
        if job.status != JobStatus::Pending {
            return Ok(DispatchResult::Skipped);
        }

        let candidates = self.capacity.available_instances().await;
        let ranked = self.strategy.rank(&job, &candidates);
        let mut reserved = None;
        for instance_id in ranked {
            match self.capacity.reserve(&instance_id, job.capacity_units).await? {
                Reservation::Granted { remaining } => {
                    reserved = Some((instance_id, remaining));
                    break;
                }
                Reservation::Insufficient { .. } | Reservation::Unavailable => {
                    self.metrics.record_capacity_rejected(&instance_id);
                }
            }
        }

        let Some((instance_id, remaining)) = reserved else {
            StructuredLogger::log_capacity_unavailable(job.id, job.capacity_units);
            return Ok(DispatchResult::Deferred);
        };
        self.metrics
            .record_capacity_reserved(&instance_id, job.capacity_units);
        StructuredLogger::log_capacity_reserved(job.id, &instance_id, job.capacity_units, remaining);

        job.instance_id = Some(instance_id.clone());
        let units = job.capacity_units;
        let job = match self
            .lifecycle
            .transition_locked(job, JobStatus::Running, None, None)
            .await
        {
            Ok(job) => job,
            Err(e) => {
                self.capacity.release(&instance_id, units).await?;
                return Err(e);
            }
        };

        match self.start_execution(&job, &instance_id).await {
            Ok(()) => {
                StructuredLogger::log_job_dispatched(job.id, &instance_id);
                Ok(DispatchResult::Dispatched(job))
            }
            Err(e) => {
                error!("作业 {} 启动失败: {}", job.id, e);
                self.lifecycle
                    .transition_locked(
                        job,
                        JobStatus::Error,
                        Some(StatusReason::LaunchFailed {
                            message: e.to_string(),
                        }),
                        None,
                    )
                    .await?;
                Ok(DispatchResult::LaunchFailed)
            }
        }
    }

    async fn start_execution(&self, job: &Job, instance_id: &str) -> SchedulerResult<()> {
        let credential = match job.credential_id {
            Some(credential_id) => Some(self.credentials.resolve(credential_id).await?),
            None => None,
        };
        self.launcher
            .launch(LaunchRequest::for_job(job, instance_id, credential))
            .await
    }

    /// 执行层回报作业结束
    ///
    /// 已结束的作业（例如已被取消）原样返回；同步作业成功后记录同步时间。
    pub async fn complete(&self, job_id: i64, outcome: ExecutionOutcome) -> SchedulerResult<Job> {
        let _guard = self.lifecycle.lock(job_id).await;
        let mut job = self.lifecycle.get(job_id).await?;

        let (to, reason) = match &outcome {
            ExecutionOutcome::Completed { exit_code: 0 } => (JobStatus::Successful, None),
            ExecutionOutcome::Completed { exit_code } => (
                JobStatus::Failed,
                Some(StatusReason::ExecutionFailed {
                    exit_code: *exit_code,
                }),
            ),
            ExecutionOutcome::Crashed { message } => (
                JobStatus::Error,
                Some(StatusReason::ExecutionCrashed {
                    message: message.clone(),
                }),
            ),
        };

        if job.is_terminal() {
            debug!("作业 {} 已是 {}，忽略执行结果", job_id, job.status);
            return Ok(job);
        }
        if !job.is_running() {
            return Err(SchedulerError::InvalidTransition {
                job_id,
                from: job.status,
                to,
            });
        }

        if let ExecutionOutcome::Completed { exit_code } = outcome {
            job.exit_code = Some(exit_code);
        }
        let job = self.lifecycle.transition_locked(job, to, reason, None).await?;

        if job.status == JobStatus::Successful {
            if let Some(target) = job.sync_target() {
                self.record_sync(target, job.finished_at.unwrap_or_else(Utc::now))
                    .await?;
            }
        }
        self.wake.notify_one();
        Ok(job)
    }

    async fn record_sync(&self, target: SyncTarget, synced_at: DateTime<Utc>) -> SchedulerResult<()> {
        match target {
            SyncTarget::Project(id) => self.projects.record_sync(id, synced_at).await?,
            SyncTarget::Inventory(id) => self.inventories.record_sync(id, synced_at).await?,
        }
        info!("{} 同步完成", target);
        Ok(())
    }

    /// 实例失联后处理其上运行中的作业，返回被标记为 error 的作业
    pub async fn handle_lost_instance(&self, instance_id: &str) -> SchedulerResult<Vec<i64>> {
        if !self.dispatcher_config.reap_jobs_on_lost_instance {
            warn!("实例 {} 失联，按配置保留其运行中的作业", instance_id);
            return Ok(Vec::new());
        }

        let running = self
            .lifecycle
            .jobs()
            .list_by_status(JobStatus::Running)
            .await?;
        let mut reaped = Vec::new();
        for candidate in running
            .into_iter()
            .filter(|job| job.instance_id.as_deref() == Some(instance_id))
        {
            let _guard = self.lifecycle.lock(candidate.id).await;
            let job = self.lifecycle.get(candidate.id).await?;
            if !job.is_running() {
                continue;
            }
            let job_id = job.id;
            self.lifecycle
                .transition_locked(
                    job,
                    JobStatus::Error,
                    Some(StatusReason::InstanceLost {
                        instance_id: instance_id.to_string(),
                    }),
                    None,
                )
                .await?;
            reaped.push(job_id);
        }

        if !reaped.is_empty() {
            warn!("实例 {} 失联，{} 个作业标记为 error", instance_id, reaped.len());
            self.wake.notify_one();
        }
        Ok(reaped)
    }

    async fn update_gauges(&self) -> SchedulerResult<()> {
        let jobs = self.lifecycle.jobs();
        let pending = jobs.list_by_status(JobStatus::Pending).await?.len();
        let waiting = jobs.list_by_status(JobStatus::Waiting).await?.len();
        let running = jobs.list_by_status(JobStatus::Running).await?.len();
        self.metrics.update_queue_depths(pending, waiting, running);

        let instances = self.capacity.list().await;
        for instance in &instances {
            self.metrics
                .update_instance_capacity(&instance.id, instance.capacity, instance.consumed);
        }
        self.metrics
            .update_available_instances(instances.iter().filter(|i| i.is_available()).count());
        Ok(())
    }
}

enum DependencyState {
    Satisfied,
    Outstanding,
    Failed(i64),
}

enum DispatchResult {
    Dispatched(Job),
    Deferred,
    LaunchFailed,
    Skipped,
}
