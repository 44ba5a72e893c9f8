use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{JobKind, JobSpec, JobType};

/// 作业模板
///
/// 操作员创建的启动蓝图。启动后的作业只引用模板，不会修改模板。
///
/// # 字段说明
///
/// - `kind`: 模板作业 (`playbook`) 或系统作业 (`system_job`)
/// - `allow_simultaneous`: 为 false 时同一模板同时只能有一个未结束的作业
/// - `priority`: 调度优先级，数值越大越先调度
/// - `task_impact`: 每次执行占用的容量单位
/// - `timeout_seconds`: 最大运行时间，0 表示不限制
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTemplate {
    pub id: i64,
    pub name: String,
    pub kind: JobKind,
    pub job_type: JobType,
    pub project_id: Option<i64>,
    pub inventory_id: Option<i64>,
    pub credential_id: Option<i64>,
    pub extra_vars: serde_json::Value,
    pub allow_simultaneous: bool,
    pub priority: i32,
    pub task_impact: u32,
    pub timeout_seconds: u64,
    pub created_at: DateTime<Utc>,
}

impl JobTemplate {
    pub fn new(id: i64, name: &str, kind: JobKind, job_type: JobType) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            job_type,
            project_id: None,
            inventory_id: None,
            credential_id: None,
            extra_vars: serde_json::json!({}),
            allow_simultaneous: false,
            priority: 0,
            task_impact: 1,
            timeout_seconds: 0,
            created_at: Utc::now(),
        }
    }

    /// 依据模板与启动参数生成作业描述
    pub fn to_job_spec(&self, overrides: &LaunchOverrides) -> JobSpec {
        JobSpec {
            kind: self.kind,
            name: self.name.clone(),
            template_id: Some(self.id),
            job_type: self.job_type,
            project_id: self.project_id,
            inventory_id: self.inventory_id,
            credential_id: self.credential_id,
            extra_vars: merge_extra_vars(&self.extra_vars, overrides.extra_vars.as_ref()),
            capacity_units: self.task_impact,
            priority: overrides.priority.unwrap_or(self.priority),
            timeout_seconds: overrides.timeout_seconds.unwrap_or(self.timeout_seconds),
            created_by: overrides.created_by.clone(),
            workflow_job_id: None,
        }
    }
}

/// 合并额外变量：启动参数覆盖模板默认值
pub fn merge_extra_vars(
    defaults: &serde_json::Value,
    overrides: Option<&serde_json::Value>,
) -> serde_json::Value {
    let mut merged = match defaults {
        serde_json::Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    if let Some(serde_json::Value::Object(extra)) = overrides {
        for (key, value) in extra {
            merged.insert(key.clone(), value.clone());
        }
    }
    serde_json::Value::Object(merged)
}

/// 启动时的运行参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchOverrides {
    pub created_by: String,
    pub extra_vars: Option<serde_json::Value>,
    pub priority: Option<i32>,
    pub timeout_seconds: Option<u64>,
}

impl LaunchOverrides {
    pub fn by(actor: &str) -> Self {
        Self {
            created_by: actor.to_string(),
            extra_vars: None,
            priority: None,
            timeout_seconds: None,
        }
    }

    pub fn with_extra_vars(mut self, extra_vars: serde_json::Value) -> Self {
        self.extra_vars = Some(extra_vars);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }
}

/// 临时命令请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdHocCommandRequest {
    pub inventory_id: i64,
    pub credential_id: i64,
    pub module_name: String,
    pub module_args: String,
    pub limit: Option<String>,
    pub created_by: String,
}

impl AdHocCommandRequest {
    pub fn to_job_spec(&self) -> JobSpec {
        let mut extra_vars = serde_json::json!({
            "module_name": self.module_name,
            "module_args": self.module_args,
        });
        if let Some(limit) = &self.limit {
            extra_vars["limit"] = serde_json::Value::String(limit.clone());
        }
        JobSpec {
            kind: JobKind::AdHocCommand,
            name: format!("ad-hoc {}", self.module_name),
            template_id: None,
            job_type: JobType::Run,
            project_id: None,
            inventory_id: Some(self.inventory_id),
            credential_id: Some(self.credential_id),
            extra_vars,
            capacity_units: 1,
            priority: 0,
            timeout_seconds: 0,
            created_by: self.created_by.clone(),
            workflow_job_id: None,
        }
    }
}

/// 项目（作业源码仓库）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub scm_url: String,
    pub update_on_launch: bool,
    /// 新鲜度阈值（秒），None 时使用全局配置
    pub cache_timeout_seconds: Option<i64>,
    pub last_successful_sync: Option<DateTime<Utc>>,
    /// Insights 项目同步时限定的清单
    pub inventory_id: Option<i64>,
}

impl Project {
    pub fn new(id: i64, name: &str, scm_url: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            scm_url: scm_url.to_string(),
            update_on_launch: true,
            cache_timeout_seconds: None,
            last_successful_sync: None,
            inventory_id: None,
        }
    }
}

/// 清单
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    pub id: i64,
    pub name: String,
    pub update_on_launch: bool,
    pub cache_timeout_seconds: Option<i64>,
    pub last_successful_sync: Option<DateTime<Utc>>,
    /// SCM 清单来源所在的项目
    pub source_project_id: Option<i64>,
}

impl Inventory {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            update_on_launch: true,
            cache_timeout_seconds: None,
            last_successful_sync: None,
            source_project_id: None,
        }
    }
}
