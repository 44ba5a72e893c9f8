//! 作业状态机
//!
//! 合法转换:
//!
//! ```text
//! new      -> pending | failed(invalid_spec) | canceled
//! pending  -> waiting | running | canceled
//! waiting  -> pending | failed(dependency_failed) | canceled
//! running  -> successful | failed | error | canceled
//! ```
//!
//! 终止状态 (successful/failed/error/canceled) 不可再变化。

use chrono::{DateTime, Utc};

use orchestrator_core::models::{Job, JobStatus, StateTransition, StatusReason};
use orchestrator_core::{SchedulerError, SchedulerResult};

pub struct JobStateMachine;

impl JobStateMachine {
    pub fn is_allowed(from: JobStatus, to: JobStatus) -> bool {
        use JobStatus::*;

        if from.is_terminal() {
            return false;
        }
        if to == Canceled {
            return true;
        }
        matches!(
            (from, to),
            (New, Pending)
                | (New, Failed)
                | (Pending, Waiting)
                | (Pending, Running)
                | (Waiting, Pending)
                | (Waiting, Failed)
                | (Running, Successful)
                | (Running, Failed)
                | (Running, Error)
        )
    }

    /// 执行一次状态转换并返回对应的审计记录
    ///
    /// 失败时作业保持不变。进入 `running` 时写入 `started_at`，
    /// 进入终止状态时写入 `finished_at`。版本号由仓储在保存时递增。
    pub fn apply(
        job: &mut Job,
        to: JobStatus,
        reason: Option<StatusReason>,
        actor: Option<&str>,
        now: DateTime<Utc>,
    ) -> SchedulerResult<StateTransition> {
        let from = job.status;
        if !Self::is_allowed(from, to) {
            return Err(SchedulerError::InvalidTransition {
                job_id: job.id,
                from,
                to,
            });
        }

        job.status = to;
        job.status_reason = reason.clone();
        if to == JobStatus::Running {
            job.started_at = Some(now);
        }
        if to.is_terminal() {
            job.finished_at = Some(now);
        }

        Ok(StateTransition {
            job_id: job.id,
            sequence: 0,
            from,
            to,
            reason,
            actor: actor.map(str::to_string),
            occurred_at: now,
        })
    }
}
