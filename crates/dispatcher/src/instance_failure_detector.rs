use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use orchestrator_core::config::InstancesConfig;
use orchestrator_core::SchedulerResult;
use orchestrator_domain::{EventPublisher, InstanceEvent};
use orchestrator_infrastructure::{MetricsCollector, StructuredLogger};

use crate::capacity_registry::CapacityRegistry;
use crate::scheduler::Scheduler;

/// 实例失联检测配置
#[derive(Debug, Clone)]
pub struct InstanceFailureDetectorConfig {
    /// 存活窗口（秒），超过该时间未上报即视为失联
    pub heartbeat_window_seconds: i64,
    /// 检测间隔（秒）
    pub check_interval_seconds: u64,
}

impl Default for InstanceFailureDetectorConfig {
    fn default() -> Self {
        Self {
            heartbeat_window_seconds: 90,
            check_interval_seconds: 30,
        }
    }
}

impl From<&InstancesConfig> for InstanceFailureDetectorConfig {
    fn from(config: &InstancesConfig) -> Self {
        Self {
            heartbeat_window_seconds: config.heartbeat_window_seconds,
            check_interval_seconds: config.check_interval_seconds,
        }
    }
}

/// 实例失联检测
///
/// 失联实例只在登记处标记为不可用，其上运行中的作业交给调度器处理。
pub struct InstanceFailureDetector {
    capacity: Arc<CapacityRegistry>,
    scheduler: Arc<Scheduler>,
    events: Arc<dyn EventPublisher>,
    metrics: MetricsCollector,
    config: InstanceFailureDetectorConfig,
    running: Arc<tokio::sync::RwLock<bool>>,
}

impl InstanceFailureDetector {
    pub fn new(
        capacity: Arc<CapacityRegistry>,
        scheduler: Arc<Scheduler>,
        events: Arc<dyn EventPublisher>,
        metrics: MetricsCollector,
        config: Option<InstanceFailureDetectorConfig>,
    ) -> Self {
        Self {
            capacity,
            scheduler,
            events,
            metrics,
            config: config.unwrap_or_default(),
            running: Arc::new(tokio::sync::RwLock::new(false)),
        }
    }

    /// 执行一次检测，返回本次判定失联的实例
    pub async fn detect_once(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<String>> {
        debug!("开始检测失联实例");
        let before = self.capacity.list().await;
        let lost = self
            .capacity
            .mark_stale(now, self.config.heartbeat_window_seconds)
            .await;

        for instance_id in &lost {
            let silent_for = before
                .iter()
                .find(|i| &i.id == instance_id)
                .map(|i| (now - i.last_heartbeat).num_seconds())
                .unwrap_or_default();
            StructuredLogger::log_instance_lost(instance_id, silent_for);

            if let Err(e) = self.events.publish(InstanceEvent::lost(instance_id).into()).await {
                error!("发布实例失联事件失败: {}", e);
            }
            match self.scheduler.handle_lost_instance(instance_id).await {
                Ok(reaped) if !reaped.is_empty() => {
                    info!("实例 {} 上的作业 {:?} 已处理", instance_id, reaped);
                }
                Ok(_) => {}
                Err(e) => error!("处理失联实例 {} 的作业时出错: {}", instance_id, e),
            }
        }

        if !lost.is_empty() {
            let available = self.capacity.available_instances().await.len();
            self.metrics.update_available_instances(available);
        }
        Ok(lost)
    }

    /// 启动检测循环，直到调用 `stop_detection`
    pub async fn start_detection(&self) -> SchedulerResult<()> {
        info!("启动实例失联检测服务");
        {
            let mut running = self.running.write().await;
            *running = true;
        }

        let interval = Duration::from_secs(self.config.check_interval_seconds.max(1));
        loop {
            if !*self.running.read().await {
                info!("收到停止信号，退出实例失联检测循环");
                break;
            }

            match self.detect_once(Utc::now()).await {
                Ok(lost) if !lost.is_empty() => info!("检测到 {} 个失联实例", lost.len()),
                Ok(_) => {}
                Err(e) => error!("实例失联检测时出错: {}", e),
            }

            tokio::time::sleep(interval).await;
        }
        Ok(())
    }

    pub async fn stop_detection(&self) -> SchedulerResult<()> {
        info!("停止实例失联检测服务");
        let mut running = self.running.write().await;
        *running = false;
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}
