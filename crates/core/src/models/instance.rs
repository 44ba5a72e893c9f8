use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 未声明容量的实例默认容量
pub const DEFAULT_INSTANCE_CAPACITY: u32 = 100;

/// 执行实例（工作节点）信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub hostname: String,
    /// 最近一次上报的总容量
    pub capacity: u32,
    /// 已被运行中作业占用的容量
    pub consumed: u32,
    pub status: InstanceStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
}

/// 实例可用状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Available,
    Unavailable,
}

/// 实例注册请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRegistration {
    pub id: String,
    pub hostname: String,
    pub capacity: Option<u32>,
}

impl Instance {
    /// 创建新的实例信息
    pub fn new(registration: InstanceRegistration, now: DateTime<Utc>) -> Self {
        Self {
            id: registration.id,
            hostname: registration.hostname,
            capacity: registration.capacity.unwrap_or(DEFAULT_INSTANCE_CAPACITY),
            consumed: 0,
            status: InstanceStatus::Available,
            last_heartbeat: now,
            registered_at: now,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.status, InstanceStatus::Available)
    }

    /// 剩余容量；上报容量低于已占用时为 0
    pub fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.consumed)
    }

    pub fn can_fit(&self, units: u32) -> bool {
        self.is_available() && units <= self.remaining()
    }

    /// 获取实例负载率
    pub fn load_percentage(&self) -> f64 {
        if self.capacity == 0 {
            100.0
        } else {
            (self.consumed as f64 / self.capacity as f64) * 100.0
        }
    }

    /// 检查心跳是否超过存活窗口
    pub fn is_heartbeat_expired(&self, now: DateTime<Utc>, window_seconds: i64) -> bool {
        (now - self.last_heartbeat).num_seconds() > window_seconds
    }
}
