#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use orchestrator_core::models::{ExecutionOutcome, JobStatus, JobTemplate};
use orchestrator_core::traits::{InventoryRepository, ProjectRepository, TemplateRepository};
use orchestrator_core::AppConfig;
use orchestrator_dispatcher::{Collaborators, Orchestrator, SchedulePassReport};
use orchestrator_testing_utils::{
    InstanceRegistrationBuilder, InventoryBuilder, JobTemplateBuilder, MockCredentialResolver,
    MockLauncher, ProjectBuilder,
};

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub launcher: MockLauncher,
    pub credentials: MockCredentialResolver,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(AppConfig::default()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        Self::with_collaborators(config, MockLauncher::new(), MockCredentialResolver::new()).await
    }

    pub async fn with_collaborators(
        config: AppConfig,
        launcher: MockLauncher,
        credentials: MockCredentialResolver,
    ) -> Self {
        let orchestrator = Orchestrator::in_memory(
            &config,
            Collaborators {
                credentials: Arc::new(credentials.clone()),
                launcher: Arc::new(launcher.clone()),
            },
        )
        .unwrap();
        Self {
            orchestrator,
            launcher,
            credentials,
        }
    }

    pub async fn add_instance(&self, id: &str, capacity: u32) {
        self.orchestrator
            .controller
            .register_instance(
                InstanceRegistrationBuilder::new(id)
                    .with_capacity(capacity)
                    .build(),
            )
            .await;
    }

    /// 保存已同步的项目和清单，并返回引用它们的模板构建器
    pub async fn playbook(&self, template_id: i64) -> JobTemplateBuilder {
        let project_id = template_id * 10;
        let inventory_id = template_id * 10 + 1;
        self.orchestrator
            .projects
            .save(ProjectBuilder::new(project_id).build())
            .await
            .unwrap();
        self.orchestrator
            .inventories
            .save(InventoryBuilder::new(inventory_id).build())
            .await
            .unwrap();
        JobTemplateBuilder::new(template_id)
            .with_project(project_id)
            .with_inventory(inventory_id)
    }

    pub async fn save_template(&self, template: JobTemplate) {
        self.orchestrator.templates.save(template).await.unwrap();
    }

    pub async fn pass(&self) -> SchedulePassReport {
        self.orchestrator.scheduler.run_pass(Utc::now()).await.unwrap()
    }

    pub async fn status(&self, job_id: i64) -> JobStatus {
        self.orchestrator.controller.status(job_id).await.unwrap().status
    }

    pub async fn succeed(&self, job_id: i64) {
        self.orchestrator
            .scheduler
            .complete(job_id, ExecutionOutcome::Completed { exit_code: 0 })
            .await
            .unwrap();
    }

    pub async fn fail(&self, job_id: i64, exit_code: i32) {
        self.orchestrator
            .scheduler
            .complete(job_id, ExecutionOutcome::Completed { exit_code })
            .await
            .unwrap();
    }

    pub async fn consumed(&self, instance_id: &str) -> u32 {
        self.orchestrator
            .capacity
            .get(instance_id)
            .await
            .unwrap()
            .consumed
    }
}
