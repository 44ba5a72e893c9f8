use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use orchestrator_core::models::SecretHandle;
use orchestrator_core::traits::CredentialResolver;
use orchestrator_core::{SchedulerError, SchedulerResult};

/// 引用式凭据解析
///
/// 不接触密钥内容，只把凭据ID转换为 `credential://{id}` 形式的句柄，
/// 由执行层凭句柄向密钥服务取回真实凭据。被吊销的凭据解析失败。
#[derive(Debug, Default)]
pub struct ReferenceCredentialResolver {
    revoked: RwLock<HashSet<i64>>,
}

impl ReferenceCredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn revoke(&self, credential_id: i64) {
        self.revoked.write().await.insert(credential_id);
    }

    pub async fn restore(&self, credential_id: i64) {
        self.revoked.write().await.remove(&credential_id);
    }
}

#[async_trait]
impl CredentialResolver for ReferenceCredentialResolver {
    async fn resolve(&self, credential_id: i64) -> SchedulerResult<SecretHandle> {
        if credential_id <= 0 {
            return Err(SchedulerError::Credential(format!(
                "无效的凭据ID: {credential_id}"
            )));
        }
        if self.revoked.read().await.contains(&credential_id) {
            return Err(SchedulerError::Credential(format!(
                "凭据 {credential_id} 已被吊销"
            )));
        }
        debug!("解析凭据 {}", credential_id);
        Ok(SecretHandle::new(format!("credential://{credential_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolves_to_opaque_reference() {
        let resolver = ReferenceCredentialResolver::new();
        let handle = resolver.resolve(12).await.unwrap();
        assert_eq!(handle.expose(), "credential://12");
    }

    #[tokio::test]
    async fn test_revoked_credential_fails() {
        let resolver = ReferenceCredentialResolver::new();
        resolver.revoke(3).await;
        assert!(matches!(
            resolver.resolve(3).await,
            Err(SchedulerError::Credential(_))
        ));

        resolver.restore(3).await;
        assert!(resolver.resolve(3).await.is_ok());
        assert!(resolver.resolve(0).await.is_err());
    }
}
