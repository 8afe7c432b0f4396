//! 异步任务流水线
//!
//! 提交 → 获取媒体 → 抽帧识别聚合 → 收尾。每个任务一个工作线程，
//! 任务状态只通过 [`JobRegistry`] 共享给查询方。

pub mod cancel;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod progress;
pub mod registry;
pub mod sampler;
pub mod state_machine;
pub mod supervisor;

pub use cancel::CancelToken;
pub use error::{JobError, ProcessingError, RegistryError};
pub use model::{JobId, JobRecord, JobStatus};
pub use orchestrator::JobOrchestrator;
pub use progress::Phase;
pub use registry::{JobRegistry, JobUpdate};
pub use sampler::FrameSampler;
pub use state_machine::{InvalidTransition, JobEvent};
pub use supervisor::JobSupervisor;
