mod common;

#[cfg(test)]
mod tests {
    use orchestrator_core::models::{
        JobStatus, LaunchOverrides, StateSnapshot, StatusReason,
    };
    use orchestrator_core::AppConfig;
    use orchestrator_testing_utils::{JobBuilder, MockCredentialResolver, MockLauncher};

    use crate::common::Harness;

    fn restart_snapshot() -> StateSnapshot {
        StateSnapshot::new(
            vec![
                JobBuilder::new(1).running_on("node-a", 3).build(),
                JobBuilder::new(2).running_on("node-a", 2).build(),
                JobBuilder::new(3).with_status(JobStatus::Pending).build(),
            ],
            Vec::new(),
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn test_reconcile_reattaches_live_jobs_and_orphans_the_rest() {
        let launcher = MockLauncher::new();
        launcher.mark_alive(1);
        let harness = Harness::with_collaborators(
            AppConfig::default(),
            launcher,
            MockCredentialResolver::new(),
        )
        .await;
        harness.add_instance("node-a", 10).await;

        let recovery = &harness.orchestrator.recovery;
        recovery.restore(restart_snapshot()).await.unwrap();
        let report = recovery.reconcile().await.unwrap();

        assert_eq!(report.reattached, vec![1]);
        assert_eq!(report.orphaned, vec![2]);
        assert!(report.errors.is_empty());

        assert_eq!(harness.status(1).await, JobStatus::Running);
        let orphan = harness.orchestrator.lifecycle.get(2).await.unwrap();
        assert_eq!(orphan.status, JobStatus::Error);
        assert_eq!(orphan.status_reason, Some(StatusReason::OrphanedOnRestart));
        assert!(orphan.instance_id.is_none());
        assert_eq!(harness.status(3).await, JobStatus::Pending);

        // 只有存活作业重新占用了容量
        assert_eq!(harness.consumed("node-a").await, 3);
    }

    #[tokio::test]
    async fn test_live_job_on_unregistered_instance_is_orphaned() {
        let launcher = MockLauncher::new();
        launcher.mark_alive(1);
        let harness = Harness::with_collaborators(
            AppConfig::default(),
            launcher.clone(),
            MockCredentialResolver::new(),
        )
        .await;

        let recovery = &harness.orchestrator.recovery;
        recovery.restore(restart_snapshot()).await.unwrap();
        let report = recovery.reconcile().await.unwrap();

        assert!(report.reattached.is_empty());
        assert_eq!(report.orphaned, vec![1, 2]);
        assert_eq!(launcher.canceled(), vec![(1, "node-a".to_string())]);
    }

    #[tokio::test]
    async fn test_live_job_without_room_is_stopped_and_orphaned() {
        let launcher = MockLauncher::new();
        launcher.mark_alive(1);
        let harness = Harness::with_collaborators(
            AppConfig::default(),
            launcher.clone(),
            MockCredentialResolver::new(),
        )
        .await;
        harness.add_instance("node-a", 2).await;

        let recovery = &harness.orchestrator.recovery;
        recovery.restore(restart_snapshot()).await.unwrap();
        let report = recovery.reconcile().await.unwrap();

        assert!(report.reattached.is_empty());
        assert_eq!(report.orphaned, vec![1, 2]);
        assert!(report.errors.is_empty());

        // 作业1仍在执行层运行，需要被通知停下；作业2已不存活，无需通知
        assert_eq!(launcher.canceled(), vec![(1, "node-a".to_string())]);
        let orphan = harness.orchestrator.lifecycle.get(1).await.unwrap();
        assert_eq!(orphan.status, JobStatus::Error);
        assert_eq!(orphan.status_reason, Some(StatusReason::OrphanedOnRestart));
        assert_eq!(harness.consumed("node-a").await, 0);
    }

    #[tokio::test]
    async fn test_restored_ids_are_not_reused() {
        let harness = Harness::new().await;
        let template = harness.playbook(1).await.build();
        harness.save_template(template).await;
        harness
            .orchestrator
            .recovery
            .restore(restart_snapshot())
            .await
            .unwrap();

        let job_id = harness
            .orchestrator
            .controller
            .launch(1, LaunchOverrides::by("alice"))
            .await
            .unwrap();
        assert_eq!(job_id, 4);
    }

    #[tokio::test]
    async fn test_snapshot_survives_restart() {
        let before = Harness::new().await;
        before.add_instance("node-a", 10).await;
        let template = before.playbook(1).await.build();
        before.save_template(template).await;
        let done = before
            .orchestrator
            .controller
            .launch(1, LaunchOverrides::by("alice"))
            .await
            .unwrap();
        before.pass().await;
        before.succeed(done).await;

        let snapshot = before.orchestrator.recovery.snapshot().await.unwrap();
        assert_eq!(snapshot.jobs.len(), 1);
        assert_eq!(snapshot.transitions.len(), 3);
        let raw = snapshot.to_json().unwrap();

        let after = Harness::new().await;
        after
            .orchestrator
            .recovery
            .restore(StateSnapshot::from_json(&raw).unwrap())
            .await
            .unwrap();

        assert_eq!(after.status(done).await, JobStatus::Successful);
        let history = after.orchestrator.controller.history(done).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history.last().unwrap().to, JobStatus::Successful);

        let report = after.orchestrator.recovery.reconcile().await.unwrap();
        assert!(report.reattached.is_empty());
        assert!(report.orphaned.is_empty());
    }
}
