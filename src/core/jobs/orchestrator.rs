//! 单个任务的执行：获取 → 抽帧聚合 → 收尾
//!
//! 各阶段返回 `Result<_, JobError>`，失败统一在 [`JobOrchestrator::run`]
//! 中转换为 error 终态；临时媒体由作用域保证在两种终态前释放。

use super::cancel::CancelToken;
use super::error::{JobError, ProcessingError};
use super::model::{JobId, JobStatus};
use super::progress::Phase;
use super::registry::{JobRegistry, JobUpdate};
use super::sampler::FrameSampler;
use crate::core::video::FrameSource;
use log::{error, info, warn};
use std::sync::Arc;

pub struct JobOrchestrator {
    registry: Arc<JobRegistry>,
    source: FrameSource,
    sampler: FrameSampler,
}

impl JobOrchestrator {
    pub fn new(registry: Arc<JobRegistry>, source: FrameSource, sampler: FrameSampler) -> Self {
        Self {
            registry,
            source,
            sampler,
        }
    }

    /// 执行任务直到终态，返回终态
    pub fn run(&self, id: &JobId, reference: &str, cancel: &CancelToken) -> JobStatus {
        info!("🚀 Job {} started for {}", id, reference);

        let update = match self.execute(id, reference, cancel) {
            Ok(results) => {
                info!("✅ Job {} completed with {} texts", id, results.len());
                let message = completion_message(&results);
                JobUpdate::completed(results, message)
            }
            Err(e) => {
                error!("❌ Job {} failed ({}): {}", id, e.category(), e);
                JobUpdate::failed(format!("Error: {}", e))
            }
        };

        let status = update.status;
        if let Err(e) = self.registry.update(id, update) {
            error!("❌ Job {}: could not record final state: {}", id, e);
        }
        status
    }

    fn execute(
        &self,
        id: &JobId,
        reference: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<String>, JobError> {
        // 排队期间已被取消：不下载，直接 queued → error
        if cancel.is_cancelled() {
            return Err(ProcessingError::Cancelled.into());
        }
        self.set_phase(id, JobStatus::Downloading, Phase::Downloading, "Downloading video...")?;

        // opened 离开作用域（含所有 ? 提前返回）即停解码器、删临时文件
        let mut opened = self.source.open(reference)?;
        if cancel.is_cancelled() {
            return Err(ProcessingError::Cancelled.into());
        }

        self.set_phase(
            id,
            JobStatus::Processing,
            Phase::Processing {
                processed: 0,
                expected: 0,
            },
            "Processing frames...",
        )?;

        let frame_rate = opened.video.frame_rate;
        let frame_count = opened.video.frame_count;
        let registry = &self.registry;
        let results = self.sampler.sample(
            &mut opened.video.frames,
            frame_rate,
            frame_count,
            cancel,
            |processed, expected| {
                let value = Phase::Processing {
                    processed,
                    expected,
                }
                .progress();
                let update = JobUpdate::new(
                    JobStatus::Processing,
                    value,
                    format!("Processed {} frames", processed),
                );
                if let Err(e) = registry.update(id, update) {
                    warn!("Job {}: progress update dropped: {}", id, e);
                }
            },
        )?;

        self.set_phase(id, JobStatus::Processing, Phase::Finalizing, "Finalizing results...")?;
        drop(opened);

        Ok(results)
    }

    fn set_phase(
        &self,
        id: &JobId,
        status: JobStatus,
        phase: Phase,
        message: &str,
    ) -> Result<(), JobError> {
        info!("📍 Job {} -> {} ({}%)", id, status, phase.progress());
        self.registry
            .update(id, JobUpdate::new(status, phase.progress(), message))?;
        Ok(())
    }
}

pub fn completion_message(results: &[String]) -> String {
    if results.is_empty() {
        "Analysis complete!\nNo text detected".to_string()
    } else {
        let lines: Vec<String> = results.iter().map(|t| format!("- {}", t)).collect();
        format!("Analysis complete!\nDetected text:\n{}", lines.join("\n"))
    }
}
