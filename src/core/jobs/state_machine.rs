//! 任务状态机
//!
//! queued → downloading → processing → completed | error，
//! downloading 也可以直接进入 error。终态不再迁移。

use super::model::JobStatus;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    /// 工作线程开始执行
    Started,
    /// 帧源打开成功
    Acquired,
    /// 抽帧聚合正常结束
    Finished,
    /// 任意阶段的致命错误
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition from {from} on {event:?}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub event: JobEvent,
}

impl JobStatus {
    pub fn transition(self, event: JobEvent) -> Result<JobStatus, InvalidTransition> {
        let next = match (self, event) {
            (JobStatus::Queued, JobEvent::Started) => JobStatus::Downloading,
            (JobStatus::Downloading, JobEvent::Acquired) => JobStatus::Processing,
            (JobStatus::Processing, JobEvent::Finished) => JobStatus::Completed,
            // queued → error：工作线程无法启动，或排队期间被取消
            (JobStatus::Queued, JobEvent::Failed)
            | (JobStatus::Downloading, JobEvent::Failed)
            | (JobStatus::Processing, JobEvent::Failed) => JobStatus::Error,
            (from, event) => return Err(InvalidTransition { from, event }),
        };
        Ok(next)
    }

    /// 注册表写入校验：同一非终态内的进度刷新，或一次合法迁移
    pub fn can_move_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if self == next {
            return true;
        }
        [
            JobEvent::Started,
            JobEvent::Acquired,
            JobEvent::Finished,
            JobEvent::Failed,
        ]
        .into_iter()
        .any(|event| self.transition(event) == Ok(next))
    }
}
