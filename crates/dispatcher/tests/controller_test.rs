mod common;

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use orchestrator_core::models::{
        AdHocCommandRequest, JobKind, JobStatus, LaunchOverrides, StatusReason,
    };
    use orchestrator_core::traits::{InventoryRepository, JobRepository};
    use orchestrator_core::{AppConfig, SchedulerError};
    use orchestrator_dispatcher::CancelOutcome;
    use orchestrator_domain::{JobEvent, SchedulerEvent};
    use orchestrator_testing_utils::{
        InventoryBuilder, JobTemplateBuilder, MockCredentialResolver, MockLauncher,
    };

    use crate::common::Harness;

    #[tokio::test]
    async fn test_launch_creates_pending_job() {
        let harness = Harness::new().await;
        let template = harness.playbook(1).await.build();
        harness.save_template(template).await;

        let job_id = harness
            .orchestrator
            .controller
            .launch(1, LaunchOverrides::by("alice"))
            .await
            .unwrap();

        let view = harness.orchestrator.controller.status(job_id).await.unwrap();
        assert_eq!(view.job_id, job_id);
        assert_eq!(view.status, JobStatus::Pending);
        assert!(view.instance_id.is_none());

        let history = harness.orchestrator.controller.history(job_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from, JobStatus::New);
        assert_eq!(history[0].to, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_second_launch_of_exclusive_template_is_rejected() {
        let harness = Harness::new().await;
        let template = harness.playbook(1).await.allow_simultaneous(false).build();
        harness.save_template(template).await;

        let controller = &harness.orchestrator.controller;
        let first = controller.launch(1, LaunchOverrides::by("alice")).await.unwrap();
        let err = controller
            .launch(1, LaunchOverrides::by("bob"))
            .await
            .unwrap_err();

        match err {
            SchedulerError::ConcurrentJobBlocked {
                template_id,
                blocking_job_id,
            } => {
                assert_eq!(template_id, 1);
                assert_eq!(blocking_job_id, first);
            }
            other => panic!("意外的错误: {other:?}"),
        }

        // 被拒绝的启动不留下作业记录
        let all = harness.orchestrator.lifecycle.jobs().list_all().await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_exclusive_template_can_launch_after_cancel() {
        let harness = Harness::new().await;
        let template = harness.playbook(1).await.build();
        harness.save_template(template).await;

        let controller = &harness.orchestrator.controller;
        let first = controller.launch(1, LaunchOverrides::by("alice")).await.unwrap();
        assert_eq!(
            controller.cancel(first, "alice").await.unwrap(),
            CancelOutcome::Accepted
        );

        let second = controller.launch(1, LaunchOverrides::by("alice")).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(harness.status(second).await, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_simultaneous_template_allows_parallel_launches() {
        let harness = Harness::new().await;
        let template = harness.playbook(1).await.allow_simultaneous(true).build();
        harness.save_template(template).await;

        let controller = &harness.orchestrator.controller;
        let first = controller.launch(1, LaunchOverrides::by("alice")).await.unwrap();
        let second = controller.launch(1, LaunchOverrides::by("bob")).await.unwrap();
        assert_eq!(harness.status(first).await, JobStatus::Pending);
        assert_eq!(harness.status(second).await, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_missing_inventory_is_invalid_spec() {
        let harness = Harness::new().await;
        let template = harness.playbook(1).await.with_inventory(999).build();
        harness.save_template(template).await;

        let err = harness
            .orchestrator
            .controller
            .launch(1, LaunchOverrides::by("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSpec(_)));
        assert!(err.to_string().contains("999"));
    }

    #[tokio::test]
    async fn test_unknown_template_is_rejected() {
        let harness = Harness::new().await;
        let err = harness
            .orchestrator
            .controller
            .launch(42, LaunchOverrides::by("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSpec(_)));
        assert!(err.to_string().contains("42"));
        assert!(harness
            .orchestrator
            .lifecycle
            .jobs()
            .list_all()
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_stale_inventory_adds_sync_prerequisite() {
        let harness = Harness::new().await;
        let template = harness.playbook(1).await.build();
        harness
            .orchestrator
            .inventories
            .save(
                InventoryBuilder::new(11)
                    .synced_ago(Duration::days(10))
                    .build(),
            )
            .await
            .unwrap();
        harness.save_template(template).await;

        let job_id = harness
            .orchestrator
            .controller
            .launch(1, LaunchOverrides::by("alice"))
            .await
            .unwrap();

        let job = harness.orchestrator.lifecycle.get(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Waiting);
        assert_eq!(job.dependencies.len(), 1);

        let sync = harness
            .orchestrator
            .lifecycle
            .get(job.dependencies[0])
            .await
            .unwrap();
        assert_eq!(sync.kind, JobKind::InventoryUpdate);
        assert_eq!(sync.inventory_id, Some(11));
        assert_eq!(sync.status, JobStatus::Pending);
        assert!(sync.id < job_id);
    }

    #[tokio::test]
    async fn test_cancel_twice_reports_already_terminal() {
        let harness = Harness::new().await;
        let template = harness.playbook(1).await.build();
        harness.save_template(template).await;

        let controller = &harness.orchestrator.controller;
        let job_id = controller.launch(1, LaunchOverrides::by("alice")).await.unwrap();

        assert_eq!(
            controller.cancel(job_id, "alice").await.unwrap(),
            CancelOutcome::Accepted
        );
        assert_eq!(
            controller.cancel(job_id, "bob").await.unwrap(),
            CancelOutcome::AlreadyTerminal(JobStatus::Canceled)
        );

        let view = controller.status(job_id).await.unwrap();
        assert_eq!(
            view.status_reason,
            Some(StatusReason::CanceledBy {
                actor: "alice".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_cancel_running_job_notifies_launcher_and_releases_capacity() {
        let harness = Harness::new().await;
        harness.add_instance("node-a", 10).await;
        let template = harness.playbook(1).await.with_task_impact(4).build();
        harness.save_template(template).await;

        let job_id = harness
            .orchestrator
            .controller
            .launch(1, LaunchOverrides::by("alice"))
            .await
            .unwrap();
        harness.pass().await;
        assert_eq!(harness.consumed("node-a").await, 4);

        harness.orchestrator.controller.cancel(job_id, "alice").await.unwrap();

        assert_eq!(harness.status(job_id).await, JobStatus::Canceled);
        assert_eq!(harness.launcher.canceled(), vec![(job_id, "node-a".to_string())]);
        assert_eq!(harness.consumed("node-a").await, 0);
    }

    #[tokio::test]
    async fn test_cancel_unknown_job_is_not_found() {
        let harness = Harness::new().await;
        let err = harness
            .orchestrator
            .controller
            .cancel(404, "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::JobNotFound { id: 404 }));
    }

    #[tokio::test]
    async fn test_ad_hoc_with_unresolvable_credential_is_rejected() {
        let harness = Harness::with_collaborators(
            AppConfig::default(),
            MockLauncher::new(),
            MockCredentialResolver::with_missing(&[7]),
        )
        .await;
        harness
            .orchestrator
            .inventories
            .save(InventoryBuilder::new(3).build())
            .await
            .unwrap();

        let request = AdHocCommandRequest {
            inventory_id: 3,
            credential_id: 7,
            module_name: "ping".to_string(),
            module_args: String::new(),
            limit: None,
            created_by: "alice".to_string(),
        };
        let err = harness
            .orchestrator
            .controller
            .launch_ad_hoc(request.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSpec(_)));
        assert!(err.to_string().contains("凭据 7"));

        let job_id = harness
            .orchestrator
            .controller
            .launch_ad_hoc(AdHocCommandRequest {
                credential_id: 8,
                ..request
            })
            .await
            .unwrap();
        let job = harness.orchestrator.lifecycle.get(job_id).await.unwrap();
        assert_eq!(job.kind, JobKind::AdHocCommand);
        assert_eq!(job.extra_vars["module_name"], "ping");
        assert_eq!(harness.credentials.resolve_count(8), 1);
    }

    #[tokio::test]
    async fn test_system_job_requires_system_template() {
        let harness = Harness::new().await;
        let playbook = harness.playbook(1).await.build();
        harness.save_template(playbook).await;
        harness
            .save_template(JobTemplateBuilder::system_job(2).build())
            .await;

        let controller = &harness.orchestrator.controller;
        let err = controller
            .launch_system_job(1, LaunchOverrides::by("admin"))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSpec(_)));

        let job_id = controller
            .launch_system_job(2, LaunchOverrides::by("admin"))
            .await
            .unwrap();
        let job = harness.orchestrator.lifecycle.get(job_id).await.unwrap();
        assert_eq!(job.kind, JobKind::SystemJob);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_launch_publishes_job_created_event() {
        let harness = Harness::new().await;
        let template = harness.playbook(1).await.build();
        harness.save_template(template).await;
        let mut events = harness.orchestrator.controller.subscribe();

        let job_id = harness
            .orchestrator
            .controller
            .launch(1, LaunchOverrides::by("alice"))
            .await
            .unwrap();

        match events.try_recv().unwrap() {
            SchedulerEvent::Job(JobEvent::JobCreated {
                job_id: created,
                created_by,
                ..
            }) => {
                assert_eq!(created, job_id);
                assert_eq!(created_by, "alice");
            }
            other => panic!("意外的事件: {other:?}"),
        }
        match events.try_recv().unwrap() {
            SchedulerEvent::Job(JobEvent::JobStateChanged { from, to, .. }) => {
                assert_eq!(from, JobStatus::New);
                assert_eq!(to, JobStatus::Pending);
            }
            other => panic!("意外的事件: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_report_capacity_for_unknown_instance_fails() {
        let harness = Harness::new().await;
        let err = harness
            .orchestrator
            .controller
            .report_capacity("ghost", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InstanceNotFound { .. }));

        harness.add_instance("node-a", 10).await;
        let instance = harness
            .orchestrator
            .controller
            .report_capacity("node-a", 25)
            .await
            .unwrap();
        assert_eq!(instance.capacity, 25);
    }
}
