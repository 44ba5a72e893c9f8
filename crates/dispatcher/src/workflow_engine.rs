//! 工作流引擎
//!
//! 工作流启动时只生成根节点的作业，之后每次 `advance` 根据已结束节点的状态
//! 和边条件决定生成或跳过后继节点，全部节点结算后得出工作流结果。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use orchestrator_core::models::{
    JobStatus, NodeState, StatusReason, WorkflowJob, WorkflowNode,
};
use orchestrator_core::traits::{TemplateRepository, WorkflowRepository};
use orchestrator_core::{SchedulerError, SchedulerResult};
use orchestrator_domain::workflow_graph::{self, NodeDecision};
use orchestrator_domain::{EventPublisher, SchedulerEvent, WorkflowEvent};
use orchestrator_infrastructure::StructuredLogger;

use crate::controller::{CancelOutcome, JobController};
use crate::lifecycle::JobLifecycle;

pub struct WorkflowEngine {
    workflows: Arc<dyn WorkflowRepository>,
    templates: Arc<dyn TemplateRepository>,
    controller: Arc<JobController>,
    lifecycle: Arc<JobLifecycle>,
    launch_lock: Mutex<()>,
    advance_lock: Mutex<()>,
}

impl WorkflowEngine {
    pub fn new(
        workflows: Arc<dyn WorkflowRepository>,
        templates: Arc<dyn TemplateRepository>,
        controller: Arc<JobController>,
        lifecycle: Arc<JobLifecycle>,
    ) -> Self {
        Self {
            workflows,
            templates,
            controller,
            lifecycle,
            launch_lock: Mutex::new(()),
            advance_lock: Mutex::new(()),
        }
    }

    /// 启动工作流并生成根节点作业
    ///
    /// # 错误
    ///
    /// * `InvalidSpec` - 模板不存在、图为空、引用未知节点或作业模板、没有根节点
    /// * `CyclicDependency` - 图中存在环
    /// * `ConcurrentJobBlocked` - 模板不允许并发且已有未结束的工作流
    pub async fn launch(&self, workflow_template_id: i64, created_by: &str) -> SchedulerResult<WorkflowJob> {
        let workflow_job = {
            let _launch = self.launch_lock.lock().await;
            let template = self
                .workflows
                .get_template(workflow_template_id)
                .await?
                .ok_or_else(|| {
                    SchedulerError::invalid_spec(format!(
                        "工作流模板不存在: {workflow_template_id}"
                    ))
                })?;

            workflow_graph::validate_template(&template)?;
            for node in &template.nodes {
                if self.templates.get(node.job_template_id).await?.is_none() {
                    return Err(SchedulerError::invalid_spec(format!(
                        "工作流节点 {} 引用的作业模板不存在: {}",
                        node.id, node.job_template_id
                    )));
                }
            }

            if !template.allow_simultaneous {
                let active = self.workflows.list_active_jobs().await?;
                if let Some(blocking) = active
                    .iter()
                    .find(|wf| wf.workflow_template_id == workflow_template_id)
                {
                    return Err(SchedulerError::ConcurrentJobBlocked {
                        template_id: workflow_template_id,
                        blocking_job_id: blocking.id,
                    });
                }
            }

            let now = Utc::now();
            let workflow_job = WorkflowJob {
                id: 0,
                workflow_template_id,
                name: template.name.clone(),
                status: JobStatus::Running,
                status_reason: None,
                nodes: template
                    .nodes
                    .iter()
                    .map(|node| WorkflowNode {
                        node_id: node.id,
                        job_template_id: node.job_template_id,
                        state: NodeState::Pending,
                    })
                    .collect(),
                edges: template.edges.clone(),
                created_by: created_by.to_string(),
                created_at: now,
                started_at: Some(now),
                finished_at: None,
            };
            self.workflows.create_job(workflow_job).await?
        };

        info!(
            "工作流 {} 已启动 (模板 {}, 节点 {} 个)",
            workflow_job.id,
            workflow_template_id,
            workflow_job.nodes.len()
        );
        self.publish(WorkflowEvent::started(workflow_job.id).into())
            .await;
        self.advance(workflow_job.id).await
    }

    pub async fn status(&self, workflow_job_id: i64) -> SchedulerResult<WorkflowJob> {
        self.workflows
            .get_job(workflow_job_id)
            .await?
            .ok_or(SchedulerError::WorkflowJobNotFound {
                id: workflow_job_id,
            })
    }

    /// 推进工作流：生成满足条件的节点、跳过不可达节点，并在全部结算后给出结果
    pub async fn advance(&self, workflow_job_id: i64) -> SchedulerResult<WorkflowJob> {
        let _advance = self.advance_lock.lock().await;
        self.advance_locked(workflow_job_id).await
    }

    async fn advance_locked(&self, workflow_job_id: i64) -> SchedulerResult<WorkflowJob> {
        let mut workflow = self.status(workflow_job_id).await?;
        if workflow.is_terminal() {
            return Ok(workflow);
        }

        loop {
            let statuses = self.node_statuses(&workflow).await?;
            let decisions = workflow_graph::evaluate(&workflow, &statuses);
            if decisions.is_empty() {
                break;
            }
            for decision in decisions {
                self.apply_decision(&mut workflow, decision).await?;
            }
        }

        let statuses = self.node_statuses(&workflow).await?;
        if let Some(status) = workflow_graph::outcome(&workflow, &statuses) {
            workflow.status = status;
            workflow.finished_at = Some(Utc::now());
            self.workflows.update_job(&workflow).await?;
            StructuredLogger::log_workflow_finished(workflow.id, status);
            self.publish(WorkflowEvent::finished(workflow.id, status).into())
                .await;
        }
        Ok(workflow)
    }

    async fn apply_decision(
        &self,
        workflow: &mut WorkflowJob,
        decision: NodeDecision,
    ) -> SchedulerResult<()> {
        match decision {
            NodeDecision::Spawn { node_id } => {
                let job_template_id = workflow
                    .node(node_id)
                    .map(|node| node.job_template_id)
                    .ok_or_else(|| {
                        SchedulerError::Internal(format!("工作流 {} 缺少节点 {}", workflow.id, node_id))
                    })?;
                let job = self
                    .controller
                    .spawn_for_workflow(job_template_id, workflow.id, &workflow.created_by)
                    .await?;
                set_node_state(workflow, node_id, NodeState::Spawned { job_id: job.id });
                self.workflows.update_job(workflow).await?;

                StructuredLogger::log_workflow_node_spawned(workflow.id, node_id, job.id);
                self.publish(WorkflowEvent::node_spawned(workflow.id, node_id, job.id).into())
                    .await;
            }
            NodeDecision::DoNotRun { node_id } => {
                set_node_state(workflow, node_id, NodeState::DoNotRun);
                self.workflows.update_job(workflow).await?;

                debug!("工作流 {} 节点 {} 不满足任何入边条件，跳过", workflow.id, node_id);
                self.publish(WorkflowEvent::node_skipped(workflow.id, node_id).into())
                    .await;
            }
        }
        Ok(())
    }

    /// 推进所有未结束的工作流，返回本次结束的工作流
    pub async fn advance_active(&self) -> SchedulerResult<Vec<i64>> {
        let _advance = self.advance_lock.lock().await;
        let mut finished = Vec::new();
        for workflow in self.workflows.list_active_jobs().await? {
            match self.advance_locked(workflow.id).await {
                Ok(advanced) if advanced.is_terminal() => finished.push(advanced.id),
                Ok(_) => {}
                Err(e) => warn!("推进工作流 {} 失败: {}", workflow.id, e),
            }
        }
        Ok(finished)
    }

    /// 取消工作流及其全部未结束的子作业
    pub async fn cancel_workflow(&self, workflow_job_id: i64, actor: &str) -> SchedulerResult<CancelOutcome> {
        let _advance = self.advance_lock.lock().await;
        let mut workflow = self.status(workflow_job_id).await?;
        if workflow.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal(workflow.status));
        }

        for node in workflow.nodes.iter_mut() {
            match node.state {
                NodeState::Spawned { job_id } => {
                    let outcome = self
                        .controller
                        .cancel_with_reason(
                            job_id,
                            StatusReason::WorkflowCanceled { workflow_job_id },
                            actor,
                        )
                        .await?;
                    debug!("工作流 {} 子作业 {} 取消结果: {:?}", workflow_job_id, job_id, outcome);
                }
                NodeState::Pending => node.state = NodeState::DoNotRun,
                NodeState::DoNotRun => {}
            }
        }

        workflow.status = JobStatus::Canceled;
        workflow.status_reason = Some(StatusReason::CanceledBy {
            actor: actor.to_string(),
        });
        workflow.finished_at = Some(Utc::now());
        self.workflows.update_job(&workflow).await?;

        info!("工作流 {} 已由 {} 取消", workflow_job_id, actor);
        StructuredLogger::log_workflow_finished(workflow_job_id, JobStatus::Canceled);
        self.publish(WorkflowEvent::finished(workflow_job_id, JobStatus::Canceled).into())
            .await;
        Ok(CancelOutcome::Accepted)
    }

    async fn node_statuses(&self, workflow: &WorkflowJob) -> SchedulerResult<HashMap<i64, JobStatus>> {
        let mut statuses = HashMap::new();
        for job_id in workflow.spawned_job_ids() {
            let job = self.lifecycle.get(job_id).await?;
            statuses.insert(job_id, job.status);
        }
        Ok(statuses)
    }

    async fn publish(&self, event: SchedulerEvent) {
        if let Err(e) = self.lifecycle.events().publish(event).await {
            warn!("发布事件失败: {}", e);
        }
    }
}

fn set_node_state(workflow: &mut WorkflowJob, node_id: i64, state: NodeState) {
    if let Some(node) = workflow.nodes.iter_mut().find(|n| n.node_id == node_id) {
        node.state = state;
    }
}
