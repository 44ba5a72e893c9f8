use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use orchestrator_core::SchedulerResult;

use crate::scheduler::{SchedulePassReport, Scheduler};
use crate::workflow_engine::WorkflowEngine;

/// 调度主循环
///
/// 按固定间隔运行，作业创建、结束或容量变化时通过 `Notify` 提前唤醒。
/// 同一时刻只有一个调度在执行。
pub struct Coordinator {
    scheduler: Arc<Scheduler>,
    workflows: Arc<WorkflowEngine>,
    wake: Arc<Notify>,
    interval: Duration,
}

impl Coordinator {
    pub fn new(
        scheduler: Arc<Scheduler>,
        workflows: Arc<WorkflowEngine>,
        wake: Arc<Notify>,
        interval_seconds: u64,
    ) -> Self {
        Self {
            scheduler,
            workflows,
            wake,
            interval: Duration::from_secs(interval_seconds.max(1)),
        }
    }

    /// 执行一次调度并推进工作流
    pub async fn run_once(&self) -> SchedulerResult<SchedulePassReport> {
        let report = self.scheduler.run_pass(Utc::now()).await?;
        let finished = self.workflows.advance_active().await?;
        if !finished.is_empty() {
            debug!("本轮结束的工作流: {:?}", finished);
        }
        Ok(report)
    }

    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> SchedulerResult<()> {
        info!("调度循环启动，间隔 {:?}", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.wake.notified() => {
                    debug!("收到唤醒事件");
                }
                _ = shutdown_rx.recv() => {
                    info!("收到关闭信号，退出调度循环");
                    break;
                }
            }

            if let Err(e) = self.run_once().await {
                error!("调度执行失败: {}", e);
            }
        }
        Ok(())
    }
}
