use std::path::{Path, PathBuf};

use tracing::{debug, info};

use orchestrator_core::models::StateSnapshot;
use orchestrator_core::{SchedulerError, SchedulerResult};

/// JSON 快照文件存储
///
/// 先写临时文件再重命名，读取方不会看到写了一半的快照。
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取快照；文件不存在时返回 None
    pub async fn load(&self) -> SchedulerResult<Option<StateSnapshot>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("快照文件不存在: {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(SchedulerError::Storage(format!(
                    "读取快照 {} 失败: {e}",
                    self.path.display()
                )))
            }
        };

        let snapshot = StateSnapshot::from_json(&raw)?;
        info!(
            "已加载快照: {} 个作业, {} 个工作流, {} 条审计记录",
            snapshot.jobs.len(),
            snapshot.workflow_jobs.len(),
            snapshot.transitions.len()
        );
        Ok(Some(snapshot))
    }

    pub async fn save(&self, snapshot: &StateSnapshot) -> SchedulerResult<()> {
        let raw = snapshot.to_json()?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    SchedulerError::Storage(format!("创建快照目录 {} 失败: {e}", parent.display()))
                })?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, raw).await.map_err(|e| {
            SchedulerError::Storage(format!("写入快照 {} 失败: {e}", tmp_path.display()))
        })?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| {
                SchedulerError::Storage(format!("替换快照 {} 失败: {e}", self.path.display()))
            })?;

        info!(
            "已写入快照 {}: {} 个作业",
            self.path.display(),
            snapshot.jobs.len()
        );
        Ok(())
    }
}
