use async_trait::async_trait;
use tokio::sync::RwLock;

use orchestrator_core::models::StateTransition;
use orchestrator_core::traits::AuditTrail;
use orchestrator_core::SchedulerResult;

/// 只追加的内存审计日志
///
/// 序号全局递增，因此单个作业内的记录也按发生顺序递增。
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<StateTransition>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditTrail for InMemoryAuditLog {
    async fn append(&self, mut transition: StateTransition) -> SchedulerResult<StateTransition> {
        let mut entries = self.entries.write().await;
        transition.sequence = entries.last().map(|t| t.sequence + 1).unwrap_or(1);
        entries.push(transition.clone());
        Ok(transition)
    }

    async fn for_job(&self, job_id: i64) -> SchedulerResult<Vec<StateTransition>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|t| t.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn all(&self) -> SchedulerResult<Vec<StateTransition>> {
        Ok(self.entries.read().await.clone())
    }

    async fn restore(&self, mut transitions: Vec<StateTransition>) -> SchedulerResult<()> {
        transitions.sort_by_key(|t| t.sequence);
        let mut entries = self.entries.write().await;
        entries.extend(transitions);
        entries.sort_by_key(|t| t.sequence);
        Ok(())
    }
}
