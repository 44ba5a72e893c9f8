use thiserror::Error;

use crate::models::JobStatus;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("无效的作业定义: {0}")]
    InvalidSpec(String),

    #[error("检测到循环依赖: {chain}")]
    CyclicDependency { chain: String },

    #[error("作业模板 {template_id} 不允许并发执行，已有未结束的作业 {blocking_job_id}")]
    ConcurrentJobBlocked {
        template_id: i64,
        blocking_job_id: i64,
    },

    #[error("作业未找到: {id}")]
    JobNotFound { id: i64 },

    #[error("工作流作业未找到: {id}")]
    WorkflowJobNotFound { id: i64 },

    #[error("实例未找到: {id}")]
    InstanceNotFound { id: String },

    #[error("非法的状态转换: 作业 {job_id} 从 {from} 到 {to}")]
    InvalidTransition {
        job_id: i64,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("并发修改冲突: 作业 {job_id} 期望版本 {expected}，实际版本 {actual}")]
    ConcurrentModification {
        job_id: i64,
        expected: u64,
        actual: u64,
    },

    #[error("凭据解析失败: {0}")]
    Credential(String),

    #[error("作业启动失败: {0}")]
    Launch(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    pub fn invalid_spec<S: Into<String>>(msg: S) -> Self {
        Self::InvalidSpec(msg.into())
    }
    pub fn cyclic<S: Into<String>>(chain: S) -> Self {
        Self::CyclicDependency {
            chain: chain.into(),
        }
    }
    pub fn job_not_found(id: i64) -> Self {
        Self::JobNotFound { id }
    }
    pub fn instance_not_found<S: Into<String>>(id: S) -> Self {
        Self::InstanceNotFound { id: id.into() }
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// 启动阶段的校验错误：同步返回给调用方，不会留下作业记录
    pub fn is_launch_rejection(&self) -> bool {
        matches!(
            self,
            SchedulerError::InvalidSpec(_)
                | SchedulerError::CyclicDependency { .. }
                | SchedulerError::ConcurrentJobBlocked { .. }
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulerError::ConcurrentModification { .. } | SchedulerError::Storage(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SchedulerError::Internal(_) | SchedulerError::Configuration(_)
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        SchedulerError::Internal(err.to_string())
    }
}
