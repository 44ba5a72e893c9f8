use serde::{Deserialize, Serialize};

/// 支持的实例选择策略
pub const SELECTION_STRATEGIES: [&str; 2] = ["least_loaded", "round_robin"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// 协调循环的固定间隔
    pub schedule_interval_seconds: u64,
    /// 单次调度最多派发的作业数
    pub max_dispatches_per_pass: usize,
    pub selection_strategy: String,
    /// 实例失联时是否将其运行中的作业置为 error
    pub reap_jobs_on_lost_instance: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            schedule_interval_seconds: 5,
            max_dispatches_per_pass: 100,
            selection_strategy: "least_loaded".to_string(),
            reap_jobs_on_lost_instance: true,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.schedule_interval_seconds == 0 {
            return Err(anyhow::anyhow!("调度间隔必须大于0"));
        }

        if self.max_dispatches_per_pass == 0 {
            return Err(anyhow::anyhow!("单次调度最大派发数必须大于0"));
        }

        if !SELECTION_STRATEGIES.contains(&self.selection_strategy.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的实例选择策略: {}，支持的策略: {:?}",
                self.selection_strategy,
                SELECTION_STRATEGIES
            ));
        }

        Ok(())
    }
}

/// 前置同步的新鲜度配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyConfig {
    /// 清单未单独配置 `cache_timeout_seconds` 时使用
    pub inventory_freshness_seconds: i64,
    /// 项目未单独配置 `cache_timeout_seconds` 时使用
    pub project_freshness_seconds: i64,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            inventory_freshness_seconds: 86_400,
            project_freshness_seconds: 86_400,
        }
    }
}

impl DependencyConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.inventory_freshness_seconds < 0 {
            return Err(anyhow::anyhow!("清单新鲜度阈值不能为负数"));
        }
        if self.project_freshness_seconds < 0 {
            return Err(anyhow::anyhow!("项目新鲜度阈值不能为负数"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// 作业未设置超时时使用，0 表示不限制
    pub default_timeout_seconds: u64,
    pub enforce_timeouts: bool,
    /// 同步作业占用的容量单位
    pub sync_capacity_units: u32,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            default_timeout_seconds: 0,
            enforce_timeouts: true,
            sync_capacity_units: 1,
        }
    }
}

impl JobsConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sync_capacity_units == 0 {
            return Err(anyhow::anyhow!("同步作业容量单位必须大于0"));
        }
        Ok(())
    }
}

/// 执行实例配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstancesConfig {
    /// 超过该时长未上报即视为失联
    pub heartbeat_window_seconds: i64,
    pub check_interval_seconds: u64,
    /// 启动时是否注册本机实例
    pub register_local: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_instance_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_capacity: Option<u32>,
}

impl Default for InstancesConfig {
    fn default() -> Self {
        Self {
            heartbeat_window_seconds: 90,
            check_interval_seconds: 30,
            register_local: true,
            local_instance_id: None,
            local_capacity: None,
        }
    }
}

impl InstancesConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.heartbeat_window_seconds <= 0 {
            return Err(anyhow::anyhow!("实例心跳窗口必须大于0"));
        }
        if self.check_interval_seconds == 0 {
            return Err(anyhow::anyhow!("实例检查间隔必须大于0"));
        }
        if let Some(id) = &self.local_instance_id {
            if id.trim().is_empty() {
                return Err(anyhow::anyhow!("本机实例ID不能为空"));
            }
        }
        Ok(())
    }
}
