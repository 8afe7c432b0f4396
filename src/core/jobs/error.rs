use super::model::{JobId, JobStatus};
use crate::core::text::RecognitionError;
use crate::core::video::{AcquisitionError, FrameReadError};
use thiserror::Error;

/// 抽帧阶段的致命错误（单帧识别失败不在此列）
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("failed to read frame: {0}")]
    FrameRead(#[from] FrameReadError),
    #[error("{0}")]
    Recognizer(RecognitionError),
    #[error("job cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown job {0}")]
    UnknownJob(JobId),
    #[error("job {0} already exists")]
    DuplicateJob(JobId),
    #[error("job {id} is already {status}")]
    TerminalState { id: JobId, status: JobStatus },
    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("registry lock poisoned")]
    LockPoisoned,
}

/// 单个任务的失败，Display 即为展示给用户的描述
#[derive(Debug, Error)]
pub enum JobError {
    #[error("could not acquire video: {0}")]
    Acquisition(#[from] AcquisitionError),
    #[error("processing failed: {0}")]
    Processing(#[from] ProcessingError),
    #[error("job state error: {0}")]
    Registry(#[from] RegistryError),
}

impl JobError {
    pub fn category(&self) -> &'static str {
        match self {
            JobError::Acquisition(_) => "acquisition",
            JobError::Processing(ProcessingError::Cancelled) => "cancelled",
            JobError::Processing(_) => "processing",
            JobError::Registry(_) => "internal",
        }
    }
}
