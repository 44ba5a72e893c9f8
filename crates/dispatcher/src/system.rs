//! 组件装配
//!
//! 以内存仓储为存储，把调度核心的各组件按配置连接起来。

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::info;

use orchestrator_core::traits::{
    AuditTrail, CredentialResolver, ExecutionLauncher, InventoryRepository, JobRepository,
    ProjectRepository, TemplateRepository, WorkflowRepository,
};
use orchestrator_core::{AppConfig, SchedulerResult};
use orchestrator_domain::{EventPublisher, FreshnessPolicy};
use orchestrator_infrastructure::{
    BroadcastEventBus, InMemoryAuditLog, InMemoryInventoryRepository, InMemoryJobRepository,
    InMemoryProjectRepository, InMemoryTemplateRepository, InMemoryWorkflowRepository,
    MetricsCollector,
};

use crate::capacity_registry::CapacityRegistry;
use crate::controller::JobController;
use crate::coordinator::Coordinator;
use crate::dependency_resolver::DependencyResolver;
use crate::instance_failure_detector::{InstanceFailureDetector, InstanceFailureDetectorConfig};
use crate::lifecycle::JobLifecycle;
use crate::recovery_service::RecoveryService;
use crate::scheduler::Scheduler;
use crate::strategies::strategy_from_name;
use crate::workflow_engine::WorkflowEngine;

/// 外部协作方
pub struct Collaborators {
    pub credentials: Arc<dyn CredentialResolver>,
    pub launcher: Arc<dyn ExecutionLauncher>,
}

/// 装配完成的调度核心
pub struct Orchestrator {
    pub templates: Arc<dyn TemplateRepository>,
    pub projects: Arc<dyn ProjectRepository>,
    pub inventories: Arc<dyn InventoryRepository>,
    pub workflows: Arc<dyn WorkflowRepository>,
    pub events: Arc<dyn EventPublisher>,
    pub capacity: Arc<CapacityRegistry>,
    pub lifecycle: Arc<JobLifecycle>,
    pub controller: Arc<JobController>,
    pub scheduler: Arc<Scheduler>,
    pub workflow_engine: Arc<WorkflowEngine>,
    pub detector: Arc<InstanceFailureDetector>,
    pub recovery: Arc<RecoveryService>,
    pub coordinator: Arc<Coordinator>,
}

impl Orchestrator {
    pub fn in_memory(config: &AppConfig, collaborators: Collaborators) -> SchedulerResult<Self> {
        let strategy = strategy_from_name(&config.dispatcher.selection_strategy)?;
        let metrics = MetricsCollector::new();
        let wake = Arc::new(Notify::new());

        let jobs: Arc<dyn JobRepository> = Arc::new(InMemoryJobRepository::new());
        let audit: Arc<dyn AuditTrail> = Arc::new(InMemoryAuditLog::new());
        let templates: Arc<dyn TemplateRepository> = Arc::new(InMemoryTemplateRepository::new());
        let projects: Arc<dyn ProjectRepository> = Arc::new(InMemoryProjectRepository::new());
        let inventories: Arc<dyn InventoryRepository> =
            Arc::new(InMemoryInventoryRepository::new());
        let workflows: Arc<dyn WorkflowRepository> = Arc::new(InMemoryWorkflowRepository::new());
        let events: Arc<dyn EventPublisher> = Arc::new(BroadcastEventBus::default());
        let capacity = Arc::new(CapacityRegistry::new());

        let lifecycle = Arc::new(JobLifecycle::new(
            Arc::clone(&jobs),
            audit,
            Arc::clone(&events),
            Arc::clone(&capacity),
            metrics.clone(),
        ));

        let resolver = DependencyResolver::new(
            Arc::clone(&projects),
            Arc::clone(&inventories),
            jobs,
            FreshnessPolicy::new(&config.dependency),
        );

        let controller = Arc::new(JobController::new(
            Arc::clone(&lifecycle),
            Arc::clone(&templates),
            Arc::clone(&projects),
            Arc::clone(&inventories),
            Arc::clone(&collaborators.credentials),
            Arc::clone(&collaborators.launcher),
            Arc::clone(&capacity),
            resolver,
            config.jobs.clone(),
            metrics.clone(),
            Arc::clone(&wake),
        ));

        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&lifecycle),
            Arc::clone(&capacity),
            strategy,
            Arc::clone(&collaborators.launcher),
            collaborators.credentials,
            Arc::clone(&templates),
            Arc::clone(&projects),
            Arc::clone(&inventories),
            config.dispatcher.clone(),
            config.jobs.clone(),
            metrics.clone(),
            Arc::clone(&wake),
        ));

        let workflow_engine = Arc::new(WorkflowEngine::new(
            Arc::clone(&workflows),
            Arc::clone(&templates),
            Arc::clone(&controller),
            Arc::clone(&lifecycle),
        ));

        let detector = Arc::new(InstanceFailureDetector::new(
            Arc::clone(&capacity),
            Arc::clone(&scheduler),
            Arc::clone(&events),
            metrics,
            Some(InstanceFailureDetectorConfig::from(&config.instances)),
        ));

        let recovery = Arc::new(RecoveryService::new(
            Arc::clone(&lifecycle),
            Arc::clone(&workflows),
            Arc::clone(&capacity),
            collaborators.launcher,
        ));

        let coordinator = Arc::new(Coordinator::new(
            Arc::clone(&scheduler),
            Arc::clone(&workflow_engine),
            wake,
            config.dispatcher.schedule_interval_seconds,
        ));

        info!(
            "调度核心装配完成，实例选择策略: {}",
            config.dispatcher.selection_strategy
        );

        Ok(Self {
            templates,
            projects,
            inventories,
            workflows,
            events,
            capacity,
            lifecycle,
            controller,
            scheduler,
            workflow_engine,
            detector,
            recovery,
            coordinator,
        })
    }
}
