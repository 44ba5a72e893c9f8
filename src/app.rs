use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use orchestrator_core::models::InstanceRegistration;
use orchestrator_core::AppConfig;
use orchestrator_dispatcher::{Collaborators, Orchestrator, RecoveryReport};
use orchestrator_infrastructure::{
    ChannelLauncher, LauncherCommand, ReferenceCredentialResolver, SnapshotStore,
};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::shutdown::join_with_grace;

const LAUNCH_QUEUE_SIZE: usize = 1024;
const TASK_GRACE: Duration = Duration::from_secs(10);

/// 主应用程序
///
/// 把调度核心、执行通道和快照存储装配在一起，并负责后台任务的启停。
pub struct Application {
    config: AppConfig,
    orchestrator: Orchestrator,
    launcher: Arc<ChannelLauncher>,
    commands: Mutex<Option<mpsc::Receiver<LauncherCommand>>>,
    snapshots: SnapshotStore,
}

impl Application {
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate().context("配置校验失败")?;

        let (launcher, commands) = ChannelLauncher::new(LAUNCH_QUEUE_SIZE);
        let launcher = Arc::new(launcher);
        let collaborators = Collaborators {
            credentials: Arc::new(ReferenceCredentialResolver::new()),
            launcher: launcher.clone(),
        };
        let orchestrator =
            Orchestrator::in_memory(&config, collaborators).context("装配调度核心失败")?;
        let snapshots = SnapshotStore::new(&config.state.snapshot_path);

        Ok(Self {
            config,
            orchestrator,
            launcher,
            commands: Mutex::new(Some(commands)),
            snapshots,
        })
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 运行直到收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let local_instance = self.register_local_instance().await;

        if self.config.state.load_on_startup {
            self.restore_state().await?;
        }

        let mut handles: Vec<(&str, JoinHandle<()>)> = Vec::new();

        let coordinator = self.orchestrator.coordinator.clone();
        let coordinator_rx = shutdown_rx.resubscribe();
        handles.push((
            "调度循环",
            tokio::spawn(async move {
                if let Err(e) = coordinator.run(coordinator_rx).await {
                    error!("调度循环异常退出: {}", e);
                }
            }),
        ));

        let detector = self.orchestrator.detector.clone();
        let detector_handle = tokio::spawn(async move {
            if let Err(e) = detector.start_detection().await {
                error!("实例失联检测异常退出: {}", e);
            }
        });

        if let Some((instance_id, capacity)) = local_instance {
            handles.push((
                "本机心跳",
                self.spawn_local_heartbeat(instance_id, capacity, shutdown_rx.resubscribe()),
            ));
        }

        if let Some(commands) = self.commands.lock().await.take() {
            handles.push((
                "执行通道",
                spawn_command_drain(commands, self.launcher.clone(), shutdown_rx.resubscribe()),
            ));
        }

        let mut shutdown_rx = shutdown_rx;
        let _ = shutdown_rx.recv().await;
        info!("开始停止后台任务");

        if let Err(e) = self.orchestrator.detector.stop_detection().await {
            warn!("停止实例失联检测失败: {}", e);
        }
        detector_handle.abort();

        join_all(
            handles
                .into_iter()
                .map(|(name, handle)| join_with_grace(name, handle, TASK_GRACE)),
        )
        .await;

        if self.config.state.save_on_shutdown {
            self.save_state().await?;
        }

        info!("应用已停止");
        Ok(())
    }

    /// 读取快照并与执行层对账；没有快照时返回 None
    pub async fn restore_state(&self) -> Result<Option<RecoveryReport>> {
        let Some(snapshot) = self
            .snapshots
            .load()
            .await
            .context("读取状态快照失败")?
        else {
            info!("未找到状态快照，从空状态启动");
            return Ok(None);
        };

        let recovery = &self.orchestrator.recovery;
        recovery.restore(snapshot).await.context("恢复状态快照失败")?;
        let report = recovery.reconcile().await.context("对账失败")?;
        info!(
            "状态恢复完成: 重新接管 {} 个作业, {} 个作业成为孤儿, 耗时 {}ms",
            report.reattached.len(),
            report.orphaned.len(),
            report.recovery_duration_ms
        );
        for e in &report.errors {
            warn!("对账错误: {}", e);
        }
        Ok(Some(report))
    }

    pub async fn save_state(&self) -> Result<()> {
        let snapshot = self
            .orchestrator
            .recovery
            .snapshot()
            .await
            .context("生成状态快照失败")?;
        self.snapshots
            .save(&snapshot)
            .await
            .context("写入状态快照失败")?;
        Ok(())
    }

    async fn register_local_instance(&self) -> Option<(String, u32)> {
        let instances = &self.config.instances;
        if !instances.register_local {
            return None;
        }

        let hostname = local_hostname();
        let id = instances
            .local_instance_id
            .clone()
            .unwrap_or_else(|| hostname.clone());
        let instance = self
            .orchestrator
            .controller
            .register_instance(InstanceRegistration {
                id,
                hostname,
                capacity: instances.local_capacity,
            })
            .await;
        info!("已注册本机实例 {}，容量 {}", instance.id, instance.capacity);
        Some((instance.id, instance.capacity))
    }

    /// 本机实例没有外部执行层代为上报，需要自己定期刷新心跳
    fn spawn_local_heartbeat(
        &self,
        instance_id: String,
        capacity: u32,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let controller = self.orchestrator.controller.clone();
        let period = Duration::from_secs(
            (self.config.instances.heartbeat_window_seconds / 3).max(1) as u64,
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = controller.report_capacity(&instance_id, capacity).await {
                            warn!("本机实例 {} 上报容量失败: {}", instance_id, e);
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        })
    }
}

/// 执行层接入前，只记录下发的指令
fn spawn_command_drain(
    mut commands: mpsc::Receiver<LauncherCommand>,
    launcher: Arc<ChannelLauncher>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(LauncherCommand::Launch(request)) => info!(
                        job_id = request.job_id,
                        instance_id = %request.instance_id,
                        "下发作业 {} ({:?}) 到实例 {}",
                        request.name,
                        request.kind,
                        request.instance_id
                    ),
                    Some(LauncherCommand::Cancel { job_id, instance_id }) => {
                        info!("通知实例 {} 取消作业 {}", instance_id, job_id);
                        launcher.mark_finished(job_id).await;
                    }
                    None => break,
                },
                _ = shutdown_rx.recv() => break,
            }
        }
    })
}

fn local_hostname() -> String {
    hostname::get()
        .unwrap_or_else(|_| "unknown".into())
        .to_string_lossy()
        .to_string()
}
