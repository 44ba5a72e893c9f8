mod common;

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use orchestrator_core::models::{
        ExecutionOutcome, JobKind, JobStatus, LaunchOverrides, StatusReason,
    };
    use orchestrator_core::traits::InventoryRepository;
    use orchestrator_core::{AppConfig, SchedulerError};
    use orchestrator_testing_utils::{InventoryBuilder, MockCredentialResolver, MockLauncher};

    use crate::common::Harness;

    async fn launch(harness: &Harness, template_id: i64) -> i64 {
        harness
            .orchestrator
            .controller
            .launch(template_id, LaunchOverrides::by("alice"))
            .await
            .unwrap()
    }

    /// 清单过期的模板：返回 (同步作业, 主作业)
    async fn launch_with_stale_inventory(harness: &Harness) -> (i64, i64) {
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

        let job_id = launch(harness, 1).await;
        let job = harness.orchestrator.lifecycle.get(job_id).await.unwrap();
        (job.dependencies[0], job_id)
    }

    #[tokio::test]
    async fn test_pending_job_is_dispatched_to_instance() {
        let harness = Harness::new().await;
        harness.add_instance("node-a", 100).await;
        let template = harness.playbook(1).await.with_task_impact(30).build();
        harness.save_template(template).await;
        let job_id = launch(&harness, 1).await;

        let report = harness.pass().await;

        assert_eq!(report.dispatched, vec![job_id]);
        let view = harness.orchestrator.controller.status(job_id).await.unwrap();
        assert_eq!(view.status, JobStatus::Running);
        assert_eq!(view.instance_id.as_deref(), Some("node-a"));
        assert!(view.started_at.is_some());
        assert_eq!(harness.consumed("node-a").await, 30);
        assert_eq!(harness.launcher.launched_ids(), vec![job_id]);
    }

    #[tokio::test]
    async fn test_job_larger_than_capacity_stays_pending() {
        let harness = Harness::new().await;
        harness.add_instance("node-a", 100).await;
        let template = harness.playbook(1).await.with_task_impact(150).build();
        harness.save_template(template).await;
        let job_id = launch(&harness, 1).await;

        let report = harness.pass().await;

        assert!(report.dispatched.is_empty());
        assert_eq!(report.deferred, vec![job_id]);
        assert_eq!(harness.status(job_id).await, JobStatus::Pending);
        assert_eq!(harness.consumed("node-a").await, 0);
        assert_eq!(harness.launcher.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_no_instances_defers_everything() {
        let harness = Harness::new().await;
        let template = harness.playbook(1).await.build();
        harness.save_template(template).await;
        let job_id = launch(&harness, 1).await;

        let report = harness.pass().await;
        assert_eq!(report.deferred, vec![job_id]);
        assert_eq!(harness.status(job_id).await, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_higher_priority_dispatches_first() {
        let harness = Harness::new().await;
        harness.add_instance("node-a", 1).await;
        let low = harness
            .playbook(1)
            .await
            .allow_simultaneous(true)
            .with_priority(1)
            .build();
        let high = harness
            .playbook(2)
            .await
            .allow_simultaneous(true)
            .with_priority(10)
            .build();
        harness.save_template(low).await;
        harness.save_template(high).await;

        let low_job = launch(&harness, 1).await;
        let high_job = launch(&harness, 2).await;

        let report = harness.pass().await;
        assert_eq!(report.dispatched, vec![high_job]);
        assert_eq!(report.deferred, vec![low_job]);

        harness.succeed(high_job).await;
        let report = harness.pass().await;
        assert_eq!(report.dispatched, vec![low_job]);
    }

    #[tokio::test]
    async fn test_max_dispatches_per_pass_is_respected() {
        let mut config = AppConfig::default();
        config.dispatcher.max_dispatches_per_pass = 1;
        let harness = Harness::with_config(config).await;
        harness.add_instance("node-a", 100).await;
        let template = harness.playbook(1).await.allow_simultaneous(true).build();
        harness.save_template(template).await;

        let first = launch(&harness, 1).await;
        let second = launch(&harness, 1).await;

        assert_eq!(harness.pass().await.dispatched, vec![first]);
        assert_eq!(harness.pass().await.dispatched, vec![second]);
    }

    #[tokio::test]
    async fn test_deferred_jobs_do_not_use_dispatch_budget() {
        let mut config = AppConfig::default();
        config.dispatcher.max_dispatches_per_pass = 1;
        let harness = Harness::with_config(config).await;
        harness.add_instance("node-a", 100).await;
        let oversized = harness.playbook(1).await.with_task_impact(150).build();
        harness.save_template(oversized).await;
        let small = harness.playbook(2).await.build();
        harness.save_template(small).await;

        let big = launch(&harness, 1).await;
        let little = launch(&harness, 2).await;

        let report = harness.pass().await;
        assert_eq!(report.deferred, vec![big]);
        assert_eq!(report.dispatched, vec![little]);
        assert_eq!(harness.status(big).await, JobStatus::Pending);
        assert_eq!(harness.status(little).await, JobStatus::Running);
        assert_eq!(harness.consumed("node-a").await, 1);
    }

    #[tokio::test]
    async fn test_waiting_job_released_after_sync_succeeds() {
        let harness = Harness::new().await;
        harness.add_instance("node-a", 10).await;
        let (sync_id, job_id) = launch_with_stale_inventory(&harness).await;

        let report = harness.pass().await;
        assert_eq!(report.dispatched, vec![sync_id]);
        assert_eq!(harness.status(job_id).await, JobStatus::Waiting);

        let before = Utc::now();
        harness.succeed(sync_id).await;
        let inventory = harness
            .orchestrator
            .inventories
            .get(11)
            .await
            .unwrap()
            .unwrap();
        assert!(inventory.last_successful_sync.unwrap() >= before);

        let report = harness.pass().await;
        assert_eq!(report.released, vec![job_id]);
        assert_eq!(report.dispatched, vec![job_id]);
        assert_eq!(harness.status(job_id).await, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_failed_sync_fails_dependent_job() {
        let harness = Harness::new().await;
        harness.add_instance("node-a", 10).await;
        let (sync_id, job_id) = launch_with_stale_inventory(&harness).await;

        harness.pass().await;
        harness.fail(sync_id, 1).await;

        let report = harness.pass().await;
        assert_eq!(report.dependency_failed, vec![job_id]);

        let view = harness.orchestrator.controller.status(job_id).await.unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(
            view.status_reason,
            Some(StatusReason::DependencyFailed {
                dependency_id: sync_id
            })
        );
        // 依赖失败的作业从未运行
        assert!(view.started_at.is_none());
        assert!(!harness.launcher.launched_ids().contains(&job_id));
    }

    #[tokio::test]
    async fn test_canceled_sync_fails_dependent_job() {
        let harness = Harness::new().await;
        let (sync_id, job_id) = launch_with_stale_inventory(&harness).await;

        harness
            .orchestrator
            .controller
            .cancel(sync_id, "alice")
            .await
            .unwrap();
        harness.pass().await;

        assert_eq!(harness.status(job_id).await, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_sync_job_uses_sync_capacity() {
        let mut config = AppConfig::default();
        config.jobs.sync_capacity_units = 3;
        let harness = Harness::with_config(config).await;
        harness.add_instance("node-a", 10).await;
        let (sync_id, _) = launch_with_stale_inventory(&harness).await;

        harness.pass().await;
        let sync = harness.orchestrator.lifecycle.get(sync_id).await.unwrap();
        assert_eq!(sync.kind, JobKind::InventoryUpdate);
        assert_eq!(sync.status, JobStatus::Running);
        assert_eq!(harness.consumed("node-a").await, 3);
    }

    #[tokio::test]
    async fn test_timed_out_job_fails_and_releases_capacity() {
        let harness = Harness::new().await;
        harness.add_instance("node-a", 10).await;
        let template = harness
            .playbook(1)
            .await
            .with_task_impact(5)
            .with_timeout(30)
            .build();
        harness.save_template(template).await;
        let job_id = launch(&harness, 1).await;
        harness.pass().await;
        assert_eq!(harness.consumed("node-a").await, 5);

        let report = harness
            .orchestrator
            .scheduler
            .run_pass(Utc::now() + Duration::seconds(60))
            .await
            .unwrap();

        assert_eq!(report.timed_out, vec![job_id]);
        let view = harness.orchestrator.controller.status(job_id).await.unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(
            view.status_reason,
            Some(StatusReason::Timeout { limit_seconds: 30 })
        );
        assert_eq!(harness.consumed("node-a").await, 0);
        assert_eq!(harness.launcher.canceled(), vec![(job_id, "node-a".to_string())]);
    }

    #[tokio::test]
    async fn test_default_timeout_applies_when_template_has_none() {
        let mut config = AppConfig::default();
        config.jobs.default_timeout_seconds = 120;
        let harness = Harness::with_config(config).await;
        let template = harness.playbook(1).await.build();
        harness.save_template(template).await;

        let job_id = launch(&harness, 1).await;
        let job = harness.orchestrator.lifecycle.get(job_id).await.unwrap();
        assert_eq!(job.timeout_seconds, 120);
    }

    #[tokio::test]
    async fn test_launch_failure_marks_job_error() {
        let harness = Harness::with_collaborators(
            AppConfig::default(),
            MockLauncher::failing(),
            MockCredentialResolver::new(),
        )
        .await;
        harness.add_instance("node-a", 10).await;
        let template = harness.playbook(1).await.with_task_impact(4).build();
        harness.save_template(template).await;
        let job_id = launch(&harness, 1).await;

        let report = harness.pass().await;

        assert_eq!(report.launch_failed, vec![job_id]);
        let view = harness.orchestrator.controller.status(job_id).await.unwrap();
        assert_eq!(view.status, JobStatus::Error);
        assert!(matches!(
            view.status_reason,
            Some(StatusReason::LaunchFailed { .. })
        ));
        assert_eq!(harness.consumed("node-a").await, 0);
    }

    #[tokio::test]
    async fn test_credential_is_resolved_at_dispatch() {
        let harness = Harness::new().await;
        harness.add_instance("node-a", 10).await;
        let template = harness.playbook(1).await.with_credential(5).build();
        harness.save_template(template).await;
        let job_id = launch(&harness, 1).await;

        harness.pass().await;

        let launched = harness.launcher.launched();
        assert_eq!(launched.len(), 1);
        assert_eq!(launched[0].job_id, job_id);
        assert!(launched[0].credential.is_some());
        // 启动校验一次，派发一次
        assert_eq!(harness.credentials.resolve_count(5), 2);
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails_job() {
        let harness = Harness::new().await;
        harness.add_instance("node-a", 10).await;
        let template = harness.playbook(1).await.build();
        harness.save_template(template).await;
        let job_id = launch(&harness, 1).await;
        harness.pass().await;

        harness.fail(job_id, 2).await;

        let job = harness.orchestrator.lifecycle.get(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.exit_code, Some(2));
        assert_eq!(
            job.status_reason,
            Some(StatusReason::ExecutionFailed { exit_code: 2 })
        );
        assert!(job.finished_at.is_some());
        assert_eq!(harness.consumed("node-a").await, 0);
    }

    #[tokio::test]
    async fn test_crashed_execution_marks_job_error() {
        let harness = Harness::new().await;
        harness.add_instance("node-a", 10).await;
        let template = harness.playbook(1).await.build();
        harness.save_template(template).await;
        let job_id = launch(&harness, 1).await;
        harness.pass().await;

        let job = harness
            .orchestrator
            .scheduler
            .complete(
                job_id,
                ExecutionOutcome::Crashed {
                    message: "segfault".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.exit_code.is_none());
    }

    #[tokio::test]
    async fn test_completion_after_cancel_is_ignored() {
        let harness = Harness::new().await;
        harness.add_instance("node-a", 10).await;
        let template = harness.playbook(1).await.build();
        harness.save_template(template).await;
        let job_id = launch(&harness, 1).await;
        harness.pass().await;
        harness
            .orchestrator
            .controller
            .cancel(job_id, "alice")
            .await
            .unwrap();

        let job = harness
            .orchestrator
            .scheduler
            .complete(job_id, ExecutionOutcome::Completed { exit_code: 0 })
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Canceled);
        assert!(job.cancel_requested);
        let history = harness.orchestrator.controller.history(job_id).await.unwrap();
        assert_eq!(history.last().unwrap().to, JobStatus::Canceled);
    }

    #[tokio::test]
    async fn test_completion_of_pending_job_is_invalid() {
        let harness = Harness::new().await;
        let template = harness.playbook(1).await.build();
        harness.save_template(template).await;
        let job_id = launch(&harness, 1).await;

        let err = harness
            .orchestrator
            .scheduler
            .complete(job_id, ExecutionOutcome::Completed { exit_code: 0 })
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidTransition { .. }));
        assert_eq!(harness.status(job_id).await, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_lost_instance_errors_its_running_jobs() {
        let harness = Harness::new().await;
        harness.add_instance("node-a", 10).await;
        let template = harness.playbook(1).await.build();
        harness.save_template(template).await;
        let job_id = launch(&harness, 1).await;
        harness.pass().await;

        let reaped = harness
            .orchestrator
            .scheduler
            .handle_lost_instance("node-a")
            .await
            .unwrap();

        assert_eq!(reaped, vec![job_id]);
        let view = harness.orchestrator.controller.status(job_id).await.unwrap();
        assert_eq!(view.status, JobStatus::Error);
        assert_eq!(
            view.status_reason,
            Some(StatusReason::InstanceLost {
                instance_id: "node-a".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_transition_history_is_ordered() {
        let harness = Harness::new().await;
        harness.add_instance("node-a", 10).await;
        let template = harness.playbook(1).await.build();
        harness.save_template(template).await;
        let job_id = launch(&harness, 1).await;
        harness.pass().await;
        harness.succeed(job_id).await;

        let history = harness.orchestrator.controller.history(job_id).await.unwrap();
        let path: Vec<(JobStatus, JobStatus)> = history.iter().map(|t| (t.from, t.to)).collect();
        assert_eq!(
            path,
            vec![
                (JobStatus::New, JobStatus::Pending),
                (JobStatus::Pending, JobStatus::Running),
                (JobStatus::Running, JobStatus::Successful),
            ]
        );
        assert!(history.windows(2).all(|w| w[0].sequence < w[1].sequence));
    }
}
