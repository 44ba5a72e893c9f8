//! 外部协作方接口
//!
//! 核心不执行任务也不保存密钥，只通过以下两个接口与外部交互：
//! - `CredentialResolver`：把凭据引用解析为不透明的密钥句柄
//! - `ExecutionLauncher`：把启动请求交给执行层，执行结果通过完成回调返回

use async_trait::async_trait;

use crate::models::{LaunchRequest, SecretHandle};
use crate::SchedulerResult;

/// 凭据解析接口
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// 解析凭据引用
    ///
    /// 凭据不存在或不可用时返回 `SchedulerError::Credential`。
    async fn resolve(&self, credential_id: i64) -> SchedulerResult<SecretHandle>;
}

/// 执行层接口
///
/// `launch` 返回 Ok 只代表执行层已接受请求，最终结果由调度器的
/// `complete` 回调上报。
#[async_trait]
pub trait ExecutionLauncher: Send + Sync {
    async fn launch(&self, request: LaunchRequest) -> SchedulerResult<()>;

    /// 协作式取消：通知执行层停止，作业状态由核心负责
    async fn cancel(&self, job_id: i64, instance_id: &str) -> SchedulerResult<()>;

    /// 作业在执行层是否仍有存活心跳
    async fn is_alive(&self, job_id: i64) -> SchedulerResult<bool>;
}
