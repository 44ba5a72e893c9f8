use chrono::{DateTime, Utc};

use orchestrator_core::config::DependencyConfig;
use orchestrator_core::models::{Inventory, Project};

/// 同步新鲜度判定
///
/// 对象自身的 `cache_timeout_seconds` 优先于全局阈值；阈值为 0 表示每次启动都同步。
#[derive(Debug, Clone)]
pub struct FreshnessPolicy {
    inventory_threshold_seconds: i64,
    project_threshold_seconds: i64,
}

impl FreshnessPolicy {
    pub fn new(config: &DependencyConfig) -> Self {
        Self {
            inventory_threshold_seconds: config.inventory_freshness_seconds,
            project_threshold_seconds: config.project_freshness_seconds,
        }
    }

    pub fn inventory_is_stale(&self, inventory: &Inventory, now: DateTime<Utc>) -> bool {
        inventory.update_on_launch
            && is_stale(
                inventory.last_successful_sync,
                inventory
                    .cache_timeout_seconds
                    .unwrap_or(self.inventory_threshold_seconds),
                now,
            )
    }

    pub fn project_is_stale(&self, project: &Project, now: DateTime<Utc>) -> bool {
        project.update_on_launch
            && is_stale(
                project.last_successful_sync,
                project
                    .cache_timeout_seconds
                    .unwrap_or(self.project_threshold_seconds),
                now,
            )
    }
}

fn is_stale(last_sync: Option<DateTime<Utc>>, threshold_seconds: i64, now: DateTime<Utc>) -> bool {
    match last_sync {
        None => true,
        Some(_) if threshold_seconds <= 0 => true,
        Some(synced_at) => (now - synced_at).num_seconds() > threshold_seconds,
    }
}
