use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

use orchestrator_core::models::{Instance, Job};
use orchestrator_core::{SchedulerError, SchedulerResult};

/// 实例选择策略
///
/// 返回按优先顺序排列的候选实例ID，调度器依次尝试占用直到成功。
pub trait InstanceSelectionStrategy: Send + Sync {
    fn rank(&self, job: &Job, candidates: &[Instance]) -> Vec<String>;

    fn name(&self) -> &str;
}

fn fitting<'a>(job: &Job, candidates: &'a [Instance]) -> Vec<&'a Instance> {
    candidates
        .iter()
        .filter(|instance| instance.can_fit(job.capacity_units))
        .collect()
}

/// 负载最低优先
pub struct LeastLoadedStrategy;

impl LeastLoadedStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LeastLoadedStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceSelectionStrategy for LeastLoadedStrategy {
    fn rank(&self, job: &Job, candidates: &[Instance]) -> Vec<String> {
        let mut suitable = fitting(job, candidates);
        suitable.sort_by(|a, b| {
            a.load_percentage()
                .partial_cmp(&b.load_percentage())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.remaining().cmp(&a.remaining()))
                .then_with(|| a.id.cmp(&b.id))
        });

        if let Some(first) = suitable.first() {
            debug!(
                "负载均衡策略首选实例: {} (负载: {:.1}%)",
                first.id,
                first.load_percentage()
            );
        }
        suitable.into_iter().map(|i| i.id.clone()).collect()
    }

    fn name(&self) -> &str {
        "least_loaded"
    }
}

/// 轮询
pub struct RoundRobinStrategy {
    counter: AtomicUsize,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceSelectionStrategy for RoundRobinStrategy {
    fn rank(&self, job: &Job, candidates: &[Instance]) -> Vec<String> {
        let suitable = fitting(job, candidates);
        if suitable.is_empty() {
            return Vec::new();
        }
        let start = self.counter.fetch_add(1, Ordering::Relaxed) % suitable.len();
        debug!(
            "轮询策略首选实例: {} (索引: {}/{})",
            suitable[start].id,
            start,
            suitable.len()
        );
        suitable
            .iter()
            .cycle()
            .skip(start)
            .take(suitable.len())
            .map(|i| i.id.clone())
            .collect()
    }

    fn name(&self) -> &str {
        "round_robin"
    }
}

/// 按配置名称创建策略
pub fn strategy_from_name(name: &str) -> SchedulerResult<Arc<dyn InstanceSelectionStrategy>> {
    match name {
        "least_loaded" => Ok(Arc::new(LeastLoadedStrategy::new())),
        "round_robin" => Ok(Arc::new(RoundRobinStrategy::new())),
        other => Err(SchedulerError::config_error(format!(
            "未知的实例选择策略: {other}"
        ))),
    }
}
