//! 工作流 DAG 校验与推进规则
//!
//! - 校验：节点非空、边引用已知节点、无环、至少一个根节点
//! - 推进：节点的所有父节点都已结束且至少一条入边条件成立时生成作业；
//!   父节点都已结束但没有任何入边成立时标记为 `do_not_run`
//! - 结果：所有节点都已结束后，存在未被处理的失败节点则工作流失败，否则成功

use std::collections::{HashMap, HashSet, VecDeque};

use orchestrator_core::models::{
    JobStatus, NodeState, WorkflowEdge, WorkflowJob, WorkflowJobTemplate,
};
use orchestrator_core::{SchedulerError, SchedulerResult};

/// 校验工作流模板结构
pub fn validate_template(template: &WorkflowJobTemplate) -> SchedulerResult<()> {
    if template.nodes.is_empty() {
        return Err(SchedulerError::invalid_spec(format!(
            "工作流模板 {} 没有任何节点",
            template.id
        )));
    }

    let mut node_ids = HashSet::new();
    for node in &template.nodes {
        if !node_ids.insert(node.id) {
            return Err(SchedulerError::invalid_spec(format!(
                "工作流模板 {} 存在重复节点 {}",
                template.id, node.id
            )));
        }
    }

    for edge in &template.edges {
        if !node_ids.contains(&edge.from) || !node_ids.contains(&edge.to) {
            return Err(SchedulerError::invalid_spec(format!(
                "工作流边 {} -> {} 引用了不存在的节点",
                edge.from, edge.to
            )));
        }
        if edge.from == edge.to {
            return Err(SchedulerError::cyclic(format!("{} -> {}", edge.from, edge.to)));
        }
    }

    let node_ids: Vec<i64> = template.nodes.iter().map(|n| n.id).collect();
    let remaining = kahn_remaining(&node_ids, &template.edges);
    if !remaining.is_empty() {
        let chain = remaining
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(SchedulerError::cyclic(format!("工作流节点 [{chain}]")));
    }

    if roots(&node_ids, &template.edges).is_empty() {
        return Err(SchedulerError::invalid_spec(format!(
            "工作流模板 {} 没有根节点",
            template.id
        )));
    }

    Ok(())
}

/// 拓扑排序后仍未处理的节点；为空表示无环
fn kahn_remaining(node_ids: &[i64], edges: &[WorkflowEdge]) -> Vec<i64> {
    let mut in_degree: HashMap<i64, usize> = node_ids.iter().map(|id| (*id, 0)).collect();
    let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
    for edge in edges {
        *in_degree.entry(edge.to).or_insert(0) += 1;
        children.entry(edge.from).or_default().push(edge.to);
    }

    let mut queue: VecDeque<i64> = node_ids
        .iter()
        .copied()
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();

    while let Some(node) = queue.pop_front() {
        in_degree.remove(&node);
        if let Some(next) = children.get(&node) {
            for child in next {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*child);
                    }
                }
            }
        }
    }

    let mut remaining: Vec<i64> = in_degree.into_keys().collect();
    remaining.sort_unstable();
    remaining
}

/// 没有入边的节点，按声明顺序返回
pub fn roots(node_ids: &[i64], edges: &[WorkflowEdge]) -> Vec<i64> {
    let targets: HashSet<i64> = edges.iter().map(|e| e.to).collect();
    node_ids
        .iter()
        .copied()
        .filter(|id| !targets.contains(id))
        .collect()
}

/// 节点推进决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeDecision {
    Spawn { node_id: i64 },
    DoNotRun { node_id: i64 },
}

/// 父节点的结算结果
enum ParentResolution {
    Unresolved,
    /// 已结束，附带终止状态；`do_not_run` 节点没有状态
    Resolved(Option<JobStatus>),
}

fn resolve_parent(state: NodeState, statuses: &HashMap<i64, JobStatus>) -> ParentResolution {
    match state {
        NodeState::Pending => ParentResolution::Unresolved,
        NodeState::DoNotRun => ParentResolution::Resolved(None),
        NodeState::Spawned { job_id } => match statuses.get(&job_id) {
            Some(status) if status.is_terminal() => ParentResolution::Resolved(Some(*status)),
            _ => ParentResolution::Unresolved,
        },
    }
}

/// 计算仍处于 `pending` 的节点的推进决定
///
/// `statuses` 为已生成作业的当前状态 (job_id -> status)。`do_not_run` 会沿图向下传播，
/// 因此一次调用即可得到全部可确定的决定，按节点声明顺序返回。
pub fn evaluate(workflow: &WorkflowJob, statuses: &HashMap<i64, JobStatus>) -> Vec<NodeDecision> {
    let mut states: HashMap<i64, NodeState> = workflow
        .nodes
        .iter()
        .map(|n| (n.node_id, n.state))
        .collect();
    let mut decisions = Vec::new();

    loop {
        let mut changed = false;
        for node in &workflow.nodes {
            if states.get(&node.node_id) != Some(&NodeState::Pending) {
                continue;
            }
            if decisions
                .iter()
                .any(|d| matches!(d, NodeDecision::Spawn { node_id } if *node_id == node.node_id))
            {
                continue;
            }

            let incoming: Vec<&WorkflowEdge> = workflow
                .edges
                .iter()
                .filter(|e| e.to == node.node_id)
                .collect();

            if incoming.is_empty() {
                decisions.push(NodeDecision::Spawn {
                    node_id: node.node_id,
                });
                continue;
            }

            let mut all_resolved = true;
            let mut any_satisfied = false;
            for edge in incoming {
                let parent_state = states
                    .get(&edge.from)
                    .copied()
                    .unwrap_or(NodeState::DoNotRun);
                match resolve_parent(parent_state, statuses) {
                    ParentResolution::Unresolved => all_resolved = false,
                    ParentResolution::Resolved(Some(status)) => {
                        if edge.condition.is_satisfied_by(status) {
                            any_satisfied = true;
                        }
                    }
                    ParentResolution::Resolved(None) => {}
                }
            }

            if !all_resolved {
                continue;
            }
            if any_satisfied {
                decisions.push(NodeDecision::Spawn {
                    node_id: node.node_id,
                });
            } else {
                states.insert(node.node_id, NodeState::DoNotRun);
                decisions.push(NodeDecision::DoNotRun {
                    node_id: node.node_id,
                });
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let order: HashMap<i64, usize> = workflow
        .nodes
        .iter()
        .enumerate()
        .map(|(idx, n)| (n.node_id, idx))
        .collect();
    decisions.sort_by_key(|d| match d {
        NodeDecision::Spawn { node_id } | NodeDecision::DoNotRun { node_id } => {
            order.get(node_id).copied().unwrap_or(usize::MAX)
        }
    });
    decisions
}

/// 失败节点的恢复路径是否真正执行过
///
/// 需要存在一条由该节点状态触发的 on_failure 或 always 出边，且目标节点已生成作业。
pub fn failure_is_handled(workflow: &WorkflowJob, node_id: i64, status: JobStatus) -> bool {
    workflow.edges.iter().any(|e| {
        e.from == node_id
            && e.condition.handles_failure()
            && e.condition.is_satisfied_by(status)
            && matches!(
                workflow.node(e.to).map(|n| n.state),
                Some(NodeState::Spawned { .. })
            )
    })
}

/// 工作流结果；仍有节点未结束时返回 None
pub fn outcome(workflow: &WorkflowJob, statuses: &HashMap<i64, JobStatus>) -> Option<JobStatus> {
    let mut failed = false;
    for node in &workflow.nodes {
        match node.state {
            NodeState::Pending => return None,
            NodeState::DoNotRun => {}
            NodeState::Spawned { job_id } => {
                let status = statuses.get(&job_id).copied()?;
                if !status.is_terminal() {
                    return None;
                }
                if status.is_unsuccessful() && !failure_is_handled(workflow, node.node_id, status) {
                    failed = true;
                }
            }
        }
    }

    Some(if failed {
        JobStatus::Failed
    } else {
        JobStatus::Successful
    })
}
