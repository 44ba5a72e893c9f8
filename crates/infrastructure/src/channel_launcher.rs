use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use orchestrator_core::models::LaunchRequest;
use orchestrator_core::traits::ExecutionLauncher;
use orchestrator_core::{SchedulerError, SchedulerResult};

/// 发往执行层的指令
#[derive(Debug, Clone)]
pub enum LauncherCommand {
    Launch(LaunchRequest),
    Cancel { job_id: i64, instance_id: String },
}

/// 通过 mpsc 通道把启动请求交给执行层
///
/// 已派发且尚未由 `mark_finished` 结束的作业视为存活。
#[derive(Debug)]
pub struct ChannelLauncher {
    sender: mpsc::Sender<LauncherCommand>,
    live_jobs: RwLock<HashSet<i64>>,
}

impl ChannelLauncher {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<LauncherCommand>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (
            Self {
                sender,
                live_jobs: RwLock::new(HashSet::new()),
            },
            receiver,
        )
    }

    /// 执行层上报结束后清除存活标记
    pub async fn mark_finished(&self, job_id: i64) {
        self.live_jobs.write().await.remove(&job_id);
    }
}

#[async_trait]
impl ExecutionLauncher for ChannelLauncher {
    async fn launch(&self, request: LaunchRequest) -> SchedulerResult<()> {
        let job_id = request.job_id;
        self.live_jobs.write().await.insert(job_id);
        if let Err(e) = self.sender.try_send(LauncherCommand::Launch(request)) {
            self.live_jobs.write().await.remove(&job_id);
            return Err(SchedulerError::Launch(format!("执行通道不可用: {e}")));
        }
        debug!("作业 {} 已交给执行通道", job_id);
        Ok(())
    }

    async fn cancel(&self, job_id: i64, instance_id: &str) -> SchedulerResult<()> {
        self.sender
            .try_send(LauncherCommand::Cancel {
                job_id,
                instance_id: instance_id.to_string(),
            })
            .map_err(|e| SchedulerError::Launch(format!("执行通道不可用: {e}")))?;
        self.live_jobs.write().await.remove(&job_id);
        Ok(())
    }

    async fn is_alive(&self, job_id: i64) -> SchedulerResult<bool> {
        Ok(self.live_jobs.read().await.contains(&job_id))
    }
}
