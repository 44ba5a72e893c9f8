//! 前置同步解析
//!
//! 根据作业引用的项目与清单计算需要先执行的同步作业：
//! - 模板作业依赖其项目和清单
//! - 临时命令依赖其清单
//! - 清单同步依赖其 SCM 来源项目
//! - Insights 项目同步依赖其关联清单
//! - 系统作业没有依赖
//!
//! 只有过期的对象才会产生前置同步，结果按依赖顺序排列，
//! 依赖相同时项目同步排在清单同步之前。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use orchestrator_core::models::{JobKind, JobSpec, SyncTarget};
use orchestrator_core::traits::{InventoryRepository, JobRepository, ProjectRepository};
use orchestrator_core::{SchedulerError, SchedulerResult};
use orchestrator_domain::FreshnessPolicy;

/// 一个前置同步
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prerequisite {
    pub target: SyncTarget,
    /// 已存在且未结束的同类同步作业，复用而不新建
    pub existing_job_id: Option<i64>,
    /// 该前置同步自身依赖的其它前置同步
    pub depends_on: Vec<SyncTarget>,
}

pub struct DependencyResolver {
    projects: Arc<dyn ProjectRepository>,
    inventories: Arc<dyn InventoryRepository>,
    jobs: Arc<dyn JobRepository>,
    policy: FreshnessPolicy,
}

impl DependencyResolver {
    pub fn new(
        projects: Arc<dyn ProjectRepository>,
        inventories: Arc<dyn InventoryRepository>,
        jobs: Arc<dyn JobRepository>,
        policy: FreshnessPolicy,
    ) -> Self {
        Self {
            projects,
            inventories,
            jobs,
            policy,
        }
    }

    /// 计算作业的有序前置同步列表
    ///
    /// # 错误
    ///
    /// * `CyclicDependency` - 前置同步最终依赖回自身
    /// * `InvalidSpec` - 引用的项目或清单不存在
    pub async fn resolve(
        &self,
        spec: &JobSpec,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Vec<Prerequisite>> {
        let mut path: Vec<SyncTarget> = spec.sync_target().into_iter().collect();
        let mut found: BTreeMap<SyncTarget, Prerequisite> = BTreeMap::new();

        for target in self.direct_targets(spec.kind, spec.project_id, spec.inventory_id).await? {
            self.visit(target, &mut path, &mut found, now).await?;
        }

        let ordered = order_prerequisites(found);
        debug!(
            "作业 {} 解析出 {} 个前置同步",
            spec.name,
            ordered.len()
        );
        Ok(ordered)
    }

    /// 直接引用的同步目标（不判断新鲜度）
    async fn direct_targets(
        &self,
        kind: JobKind,
        project_id: Option<i64>,
        inventory_id: Option<i64>,
    ) -> SchedulerResult<Vec<SyncTarget>> {
        let targets = match kind {
            JobKind::Playbook => project_id
                .map(SyncTarget::Project)
                .into_iter()
                .chain(inventory_id.map(SyncTarget::Inventory))
                .collect(),
            JobKind::AdHocCommand => inventory_id.map(SyncTarget::Inventory).into_iter().collect(),
            JobKind::InventoryUpdate => match inventory_id {
                Some(id) => self
                    .inventories
                    .get(id)
                    .await?
                    .and_then(|inv| inv.source_project_id)
                    .map(SyncTarget::Project)
                    .into_iter()
                    .collect(),
                None => Vec::new(),
            },
            JobKind::ProjectUpdate => match project_id {
                Some(id) => self
                    .projects
                    .get(id)
                    .await?
                    .and_then(|project| project.inventory_id)
                    .map(SyncTarget::Inventory)
                    .into_iter()
                    .collect(),
                None => Vec::new(),
            },
            JobKind::SystemJob => Vec::new(),
        };
        Ok(targets)
    }

    async fn is_stale(&self, target: SyncTarget, now: DateTime<Utc>) -> SchedulerResult<bool> {
        match target {
            SyncTarget::Project(id) => {
                let project = self.projects.get(id).await?.ok_or_else(|| {
                    SchedulerError::invalid_spec(format!("引用的项目不存在: {id}"))
                })?;
                Ok(self.policy.project_is_stale(&project, now))
            }
            SyncTarget::Inventory(id) => {
                let inventory = self.inventories.get(id).await?.ok_or_else(|| {
                    SchedulerError::invalid_spec(format!("引用的清单不存在: {id}"))
                })?;
                Ok(self.policy.inventory_is_stale(&inventory, now))
            }
        }
    }

    /// 深度优先展开；`path` 为当前展开路径，用于检测循环
    async fn visit(
        &self,
        target: SyncTarget,
        path: &mut Vec<SyncTarget>,
        found: &mut BTreeMap<SyncTarget, Prerequisite>,
        now: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        if path.contains(&target) {
            let chain = path
                .iter()
                .chain(std::iter::once(&target))
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(SchedulerError::cyclic(chain));
        }
        if found.contains_key(&target) || !self.is_stale(target, now).await? {
            return Ok(());
        }

        if let Some(existing) = self.jobs.find_active_sync(target).await? {
            debug!("复用进行中的同步作业 {} ({})", existing.id, target);
            found.insert(
                target,
                Prerequisite {
                    target,
                    existing_job_id: Some(existing.id),
                    depends_on: Vec::new(),
                },
            );
            return Ok(());
        }

        let (project_id, inventory_id) = match target {
            SyncTarget::Project(id) => (Some(id), None),
            SyncTarget::Inventory(id) => (None, Some(id)),
        };
        let children = self
            .direct_targets(target.job_kind(), project_id, inventory_id)
            .await?;

        path.push(target);
        for child in &children {
            Box::pin(self.visit(*child, path, found, now)).await?;
        }
        path.pop();

        let depends_on = children
            .into_iter()
            .filter(|child| found.contains_key(child))
            .collect();
        found.insert(
            target,
            Prerequisite {
                target,
                existing_job_id: None,
                depends_on,
            },
        );
        Ok(())
    }
}

/// 依赖优先的拓扑序，同层按 `SyncTarget` 顺序（项目在前）
fn order_prerequisites(found: BTreeMap<SyncTarget, Prerequisite>) -> Vec<Prerequisite> {
    let mut remaining = found;
    let mut emitted: BTreeSet<SyncTarget> = BTreeSet::new();
    let mut ordered = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let next = remaining
            .values()
            .find(|p| p.depends_on.iter().all(|d| emitted.contains(d)))
            .map(|p| p.target);
        // 展开阶段已排除循环，这里总能找到可输出的节点
        let Some(target) = next.or_else(|| remaining.keys().next().copied()) else {
            break;
        };
        if let Some(prerequisite) = remaining.remove(&target) {
            emitted.insert(target);
            ordered.push(prerequisite);
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prerequisite(target: SyncTarget, depends_on: Vec<SyncTarget>) -> Prerequisite {
        Prerequisite {
            target,
            existing_job_id: None,
            depends_on,
        }
    }

    #[test]
    fn test_projects_precede_inventories() {
        let found = BTreeMap::from([
            (
                SyncTarget::Inventory(1),
                prerequisite(SyncTarget::Inventory(1), vec![]),
            ),
            (
                SyncTarget::Project(9),
                prerequisite(SyncTarget::Project(9), vec![]),
            ),
        ]);
        let ordered: Vec<SyncTarget> = order_prerequisites(found)
            .into_iter()
            .map(|p| p.target)
            .collect();
        assert_eq!(
            ordered,
            vec![SyncTarget::Project(9), SyncTarget::Inventory(1)]
        );
    }

    #[test]
    fn test_dependencies_come_first() {
        let found = BTreeMap::from([
            (
                SyncTarget::Project(2),
                prerequisite(SyncTarget::Project(2), vec![SyncTarget::Inventory(5)]),
            ),
            (
                SyncTarget::Inventory(5),
                prerequisite(SyncTarget::Inventory(5), vec![]),
            ),
        ]);
        let ordered: Vec<SyncTarget> = order_prerequisites(found)
            .into_iter()
            .map(|p| p.target)
            .collect();
        assert_eq!(
            ordered,
            vec![SyncTarget::Inventory(5), SyncTarget::Project(2)]
        );
    }
}
