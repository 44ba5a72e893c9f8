//! 模板、项目与清单的内存仓储

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use orchestrator_core::models::{Inventory, JobTemplate, Project};
use orchestrator_core::traits::{InventoryRepository, ProjectRepository, TemplateRepository};
use orchestrator_core::{SchedulerError, SchedulerResult};

#[derive(Debug, Default)]
pub struct InMemoryTemplateRepository {
    templates: RwLock<HashMap<i64, JobTemplate>>,
}

impl InMemoryTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
    async fn get(&self, id: i64) -> SchedulerResult<Option<JobTemplate>> {
        Ok(self.templates.read().await.get(&id).cloned())
    }

    async fn save(&self, template: JobTemplate) -> SchedulerResult<()> {
        self.templates.write().await.insert(template.id, template);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProjectRepository {
    projects: RwLock<HashMap<i64, Project>>,
}

impl InMemoryProjectRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectRepository for InMemoryProjectRepository {
    async fn get(&self, id: i64) -> SchedulerResult<Option<Project>> {
        Ok(self.projects.read().await.get(&id).cloned())
    }

    async fn save(&self, project: Project) -> SchedulerResult<()> {
        self.projects.write().await.insert(project.id, project);
        Ok(())
    }

    async fn record_sync(&self, id: i64, synced_at: DateTime<Utc>) -> SchedulerResult<()> {
        let mut projects = self.projects.write().await;
        let project = projects
            .get_mut(&id)
            .ok_or_else(|| SchedulerError::Storage(format!("项目不存在: {id}")))?;
        project.last_successful_sync = Some(synced_at);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryInventoryRepository {
    inventories: RwLock<HashMap<i64, Inventory>>,
}

impl InMemoryInventoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryRepository for InMemoryInventoryRepository {
    async fn get(&self, id: i64) -> SchedulerResult<Option<Inventory>> {
        Ok(self.inventories.read().await.get(&id).cloned())
    }

    async fn save(&self, inventory: Inventory) -> SchedulerResult<()> {
        self.inventories.write().await.insert(inventory.id, inventory);
        Ok(())
    }

    async fn record_sync(&self, id: i64, synced_at: DateTime<Utc>) -> SchedulerResult<()> {
        let mut inventories = self.inventories.write().await;
        let inventory = inventories
            .get_mut(&id)
            .ok_or_else(|| SchedulerError::Storage(format!("清单不存在: {id}")))?;
        inventory.last_successful_sync = Some(synced_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_sync_updates_timestamp() {
        let repo = InMemoryInventoryRepository::new();
        repo.save(Inventory::new(3, "prod")).await.unwrap();

        let now = Utc::now();
        repo.record_sync(3, now).await.unwrap();
        let stored = repo.get(3).await.unwrap().unwrap();
        assert_eq!(stored.last_successful_sync, Some(now));

        assert!(repo.record_sync(99, now).await.is_err());
    }
}
