//! 容量登记
//!
//! 所有实例保存在同一把锁后面，检查与占用在锁内完成，
//! 因此同一实例上的并发 `reserve` 不会超额分配。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use orchestrator_core::models::{Instance, InstanceRegistration, InstanceStatus};
use orchestrator_core::{SchedulerError, SchedulerResult};

/// 容量占用结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Granted { remaining: u32 },
    Insufficient { remaining: u32 },
    /// 实例已失联，不接受新作业
    Unavailable,
}

impl Reservation {
    pub fn is_granted(&self) -> bool {
        matches!(self, Reservation::Granted { .. })
    }
}

#[derive(Debug, Default)]
pub struct CapacityRegistry {
    instances: RwLock<BTreeMap<String, Instance>>,
}

impl CapacityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册实例；重复注册时刷新容量和心跳，保留已占用量
    pub async fn register(&self, registration: InstanceRegistration) -> Instance {
        let now = Utc::now();
        let mut instances = self.instances.write().await;
        let instance = match instances.get_mut(&registration.id) {
            Some(existing) => {
                if let Some(capacity) = registration.capacity {
                    existing.capacity = capacity;
                }
                existing.hostname = registration.hostname;
                existing.status = InstanceStatus::Available;
                existing.last_heartbeat = now;
                existing.clone()
            }
            None => {
                let instance = Instance::new(registration, now);
                instances.insert(instance.id.clone(), instance.clone());
                instance
            }
        };
        info!(
            "实例已注册: {} ({}), 容量 {}",
            instance.id, instance.hostname, instance.capacity
        );
        instance
    }

    /// 处理容量上报
    ///
    /// 上报值作为新的总容量，同时刷新心跳并恢复可用。上报值低于已占用量时
    /// 不影响运行中的作业，只是在释放足够容量前不再接收新作业。
    pub async fn report_capacity(
        &self,
        instance_id: &str,
        capacity: u32,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Instance> {
        let mut instances = self.instances.write().await;
        let instance = instances
            .get_mut(instance_id)
            .ok_or_else(|| SchedulerError::instance_not_found(instance_id))?;

        if instance.status == InstanceStatus::Unavailable {
            info!("实例 {} 恢复上报，重新标记为可用", instance_id);
        }
        if capacity < instance.consumed {
            warn!(
                "实例 {} 上报容量 {} 低于已占用量 {}，暂停接收新作业",
                instance_id, capacity, instance.consumed
            );
        }
        instance.capacity = capacity;
        instance.last_heartbeat = now;
        instance.status = InstanceStatus::Available;
        Ok(instance.clone())
    }

    /// 原子地检查并占用容量
    pub async fn reserve(&self, instance_id: &str, units: u32) -> SchedulerResult<Reservation> {
        let mut instances = self.instances.write().await;
        let instance = instances
            .get_mut(instance_id)
            .ok_or_else(|| SchedulerError::instance_not_found(instance_id))?;

        if !instance.is_available() {
            return Ok(Reservation::Unavailable);
        }
        let remaining = instance.remaining();
        if units > remaining {
            debug!(
                "实例 {} 剩余容量 {} 不足以占用 {}",
                instance_id, remaining, units
            );
            return Ok(Reservation::Insufficient { remaining });
        }

        instance.consumed += units;
        Ok(Reservation::Granted {
            remaining: instance.remaining(),
        })
    }

    /// 释放容量，最多释放到 0
    pub async fn release(&self, instance_id: &str, units: u32) -> SchedulerResult<()> {
        let mut instances = self.instances.write().await;
        let instance = instances
            .get_mut(instance_id)
            .ok_or_else(|| SchedulerError::instance_not_found(instance_id))?;

        if units > instance.consumed {
            warn!(
                "实例 {} 释放容量 {} 超过已占用量 {}",
                instance_id, units, instance.consumed
            );
        }
        instance.consumed = instance.consumed.saturating_sub(units);
        Ok(())
    }

    /// 将超过存活窗口未上报的实例标记为不可用，返回本次新标记的实例
    pub async fn mark_stale(&self, now: DateTime<Utc>, window_seconds: i64) -> Vec<String> {
        let mut instances = self.instances.write().await;
        let mut lost = Vec::new();
        for instance in instances.values_mut() {
            if instance.is_available() && instance.is_heartbeat_expired(now, window_seconds) {
                instance.status = InstanceStatus::Unavailable;
                lost.push(instance.id.clone());
            }
        }
        lost
    }

    pub async fn available_instances(&self) -> Vec<Instance> {
        let instances = self.instances.read().await;
        instances
            .values()
            .filter(|i| i.is_available())
            .cloned()
            .collect()
    }

    pub async fn get(&self, instance_id: &str) -> Option<Instance> {
        self.instances.read().await.get(instance_id).cloned()
    }

    pub async fn list(&self) -> Vec<Instance> {
        self.instances.read().await.values().cloned().collect()
    }

    pub async fn deregister(&self, instance_id: &str) -> Option<Instance> {
        let removed = self.instances.write().await.remove(instance_id);
        if let Some(instance) = &removed {
            if instance.consumed > 0 {
                warn!(
                    "注销的实例 {} 仍有 {} 容量被占用",
                    instance_id, instance.consumed
                );
            }
        }
        removed
    }
}
