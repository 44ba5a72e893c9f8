#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use orchestrator_core::config::DependencyConfig;
    use orchestrator_core::models::{JobKind, JobSpec, JobType, SyncTarget};
    use orchestrator_core::traits::{InventoryRepository, JobRepository, ProjectRepository};
    use orchestrator_core::SchedulerError;
    use orchestrator_dispatcher::DependencyResolver;
    use orchestrator_domain::FreshnessPolicy;
    use orchestrator_infrastructure::{
        InMemoryInventoryRepository, InMemoryJobRepository, InMemoryProjectRepository,
    };
    use orchestrator_testing_utils::{InventoryBuilder, ProjectBuilder};

    struct Fixture {
        projects: Arc<InMemoryProjectRepository>,
        inventories: Arc<InMemoryInventoryRepository>,
        jobs: Arc<InMemoryJobRepository>,
        resolver: DependencyResolver,
    }

    fn fixture() -> Fixture {
        let projects = Arc::new(InMemoryProjectRepository::new());
        let inventories = Arc::new(InMemoryInventoryRepository::new());
        let jobs = Arc::new(InMemoryJobRepository::new());
        let resolver = DependencyResolver::new(
            projects.clone(),
            inventories.clone(),
            jobs.clone(),
            FreshnessPolicy::new(&DependencyConfig::default()),
        );
        Fixture {
            projects,
            inventories,
            jobs,
            resolver,
        }
    }

    fn playbook(project_id: i64, inventory_id: i64) -> JobSpec {
        JobSpec {
            kind: JobKind::Playbook,
            name: "deploy".to_string(),
            template_id: Some(1),
            job_type: JobType::Run,
            project_id: Some(project_id),
            inventory_id: Some(inventory_id),
            credential_id: None,
            extra_vars: serde_json::json!({}),
            capacity_units: 1,
            priority: 0,
            timeout_seconds: 0,
            created_by: "admin".to_string(),
            workflow_job_id: None,
        }
    }

    fn targets(prerequisites: &[orchestrator_dispatcher::Prerequisite]) -> Vec<SyncTarget> {
        prerequisites.iter().map(|p| p.target).collect()
    }

    #[tokio::test]
    async fn test_fresh_objects_need_no_sync() {
        let f = fixture();
        f.projects.save(ProjectBuilder::new(10).build()).await.unwrap();
        f.inventories.save(InventoryBuilder::new(20).build()).await.unwrap();

        let prerequisites = f.resolver.resolve(&playbook(10, 20), Utc::now()).await.unwrap();
        assert!(prerequisites.is_empty());
    }

    #[tokio::test]
    async fn test_project_sync_precedes_inventory_sync() {
        let f = fixture();
        f.projects
            .save(ProjectBuilder::new(10).never_synced().build())
            .await
            .unwrap();
        f.inventories
            .save(
                InventoryBuilder::new(20)
                    .synced_ago(Duration::days(10))
                    .build(),
            )
            .await
            .unwrap();

        let prerequisites = f.resolver.resolve(&playbook(10, 20), Utc::now()).await.unwrap();
        assert_eq!(
            targets(&prerequisites),
            vec![SyncTarget::Project(10), SyncTarget::Inventory(20)]
        );
        assert!(prerequisites.iter().all(|p| p.existing_job_id.is_none()));
    }

    #[tokio::test]
    async fn test_resolution_is_deterministic() {
        let f = fixture();
        f.projects
            .save(ProjectBuilder::new(10).never_synced().build())
            .await
            .unwrap();
        f.projects
            .save(ProjectBuilder::new(30).never_synced().build())
            .await
            .unwrap();
        f.inventories
            .save(
                InventoryBuilder::new(20)
                    .never_synced()
                    .with_source_project(30)
                    .build(),
            )
            .await
            .unwrap();

        let now = Utc::now();
        let first = f.resolver.resolve(&playbook(10, 20), now).await.unwrap();
        for _ in 0..5 {
            let again = f.resolver.resolve(&playbook(10, 20), now).await.unwrap();
            assert_eq!(again, first);
        }
    }

    #[tokio::test]
    async fn test_scm_inventory_source_syncs_project_first() {
        let f = fixture();
        f.projects.save(ProjectBuilder::new(10).build()).await.unwrap();
        f.projects
            .save(ProjectBuilder::new(30).never_synced().build())
            .await
            .unwrap();
        f.inventories
            .save(
                InventoryBuilder::new(20)
                    .never_synced()
                    .with_source_project(30)
                    .build(),
            )
            .await
            .unwrap();

        let prerequisites = f.resolver.resolve(&playbook(10, 20), Utc::now()).await.unwrap();
        assert_eq!(
            targets(&prerequisites),
            vec![SyncTarget::Project(30), SyncTarget::Inventory(20)]
        );
        assert_eq!(prerequisites[1].depends_on, vec![SyncTarget::Project(30)]);
    }

    #[tokio::test]
    async fn test_insights_cycle_is_rejected() {
        let f = fixture();
        f.projects
            .save(ProjectBuilder::new(10).never_synced().with_inventory(20).build())
            .await
            .unwrap();
        f.inventories
            .save(
                InventoryBuilder::new(20)
                    .never_synced()
                    .with_source_project(10)
                    .build(),
            )
            .await
            .unwrap();

        let err = f
            .resolver
            .resolve(&playbook(10, 20), Utc::now())
            .await
            .unwrap_err();
        match err {
            SchedulerError::CyclicDependency { chain } => {
                assert!(chain.contains("->"));
                assert!(chain.contains("project_update(10)"));
            }
            other => panic!("意外的错误: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_active_sync_is_reused() {
        let f = fixture();
        f.projects.save(ProjectBuilder::new(10).build()).await.unwrap();
        f.inventories
            .save(InventoryBuilder::new(20).never_synced().build())
            .await
            .unwrap();
        let running_sync = f
            .jobs
            .create(JobSpec::sync(SyncTarget::Inventory(20), "admin"))
            .await
            .unwrap();

        let prerequisites = f.resolver.resolve(&playbook(10, 20), Utc::now()).await.unwrap();
        assert_eq!(prerequisites.len(), 1);
        assert_eq!(prerequisites[0].target, SyncTarget::Inventory(20));
        assert_eq!(prerequisites[0].existing_job_id, Some(running_sync.id));
    }

    #[tokio::test]
    async fn test_update_on_launch_disabled_skips_sync() {
        let f = fixture();
        f.projects
            .save(
                ProjectBuilder::new(10)
                    .never_synced()
                    .update_on_launch(false)
                    .build(),
            )
            .await
            .unwrap();
        f.inventories
            .save(
                InventoryBuilder::new(20)
                    .never_synced()
                    .update_on_launch(false)
                    .build(),
            )
            .await
            .unwrap();

        let prerequisites = f.resolver.resolve(&playbook(10, 20), Utc::now()).await.unwrap();
        assert!(prerequisites.is_empty());
    }

    #[tokio::test]
    async fn test_object_cache_timeout_overrides_global_threshold() {
        let f = fixture();
        f.projects.save(ProjectBuilder::new(10).build()).await.unwrap();
        f.inventories
            .save(
                InventoryBuilder::new(20)
                    .synced_ago(Duration::minutes(10))
                    .with_cache_timeout(60)
                    .build(),
            )
            .await
            .unwrap();

        let prerequisites = f.resolver.resolve(&playbook(10, 20), Utc::now()).await.unwrap();
        assert_eq!(targets(&prerequisites), vec![SyncTarget::Inventory(20)]);
    }

    #[tokio::test]
    async fn test_missing_project_is_invalid_spec() {
        let f = fixture();
        f.inventories.save(InventoryBuilder::new(20).build()).await.unwrap();

        let err = f
            .resolver
            .resolve(&playbook(10, 20), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSpec(_)));
    }
}
