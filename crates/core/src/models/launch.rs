use std::fmt;

use serde::{Deserialize, Serialize};

use super::job::{Job, JobKind, JobType};

/// 凭据解析结果：不透明的密钥句柄，核心只转交不解读
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretHandle(String);

impl SecretHandle {
    pub fn new<S: Into<String>>(handle: S) -> Self {
        Self(handle.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretHandle(***)")
    }
}

/// 交给执行层的启动请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub job_id: i64,
    pub kind: JobKind,
    pub name: String,
    pub job_type: JobType,
    pub instance_id: String,
    pub project_id: Option<i64>,
    pub inventory_id: Option<i64>,
    pub credential: Option<SecretHandle>,
    pub extra_vars: serde_json::Value,
    pub timeout_seconds: u64,
}

impl LaunchRequest {
    pub fn for_job(job: &Job, instance_id: &str, credential: Option<SecretHandle>) -> Self {
        Self {
            job_id: job.id,
            kind: job.kind,
            name: job.name.clone(),
            job_type: job.job_type,
            instance_id: instance_id.to_string(),
            project_id: job.project_id,
            inventory_id: job.inventory_id,
            credential,
            extra_vars: job.extra_vars.clone(),
            timeout_seconds: job.timeout_seconds,
        }
    }
}

/// 执行层回报的执行结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// 任务已运行完毕并给出退出码
    Completed { exit_code: i32 },
    /// 无法启动或执行进程崩溃
    Crashed { message: String },
}
