//! 视频文字识别服务 - 提交任务 / 轮询状态

use crate::api::models::job::{ApiError, JobStatusView, SubmitResponse};
use crate::core::config::PipelineConfig;
use crate::core::jobs::{
    FrameSampler, JobId, JobOrchestrator, JobRegistry, JobSupervisor, RegistryError,
};
use crate::core::text::{TesseractRecognizer, TextRecognizer};
use crate::core::video::{AutoAcquirer, FfmpegDecoder, FrameDecoder, FrameSource, MediaAcquirer};
use log::info;
use std::sync::Arc;

/// 视频文字识别服务，可被任意传输层（HTTP / CLI / FFI）包装
///
/// ```ignore
/// let service = VideoTextService::create(PipelineConfig::default())?;
/// let job = service.submit_job("https://www.youtube.com/watch?v=...".into());
/// loop {
///     let status = service.get_job_status(job.job_id.clone())?;
///     if status.is_finished() { break; }
/// }
/// ```
pub struct VideoTextService {
    supervisor: JobSupervisor,
}

impl VideoTextService {
    /// 使用 yt-dlp / ffmpeg / tesseract 作为外部依赖创建服务，任一工具缺失时返回 Setup 错误
    pub fn create(config: PipelineConfig) -> Result<Self, ApiError> {
        crate::init_logging();
        info!("🎬 VideoTextService: initializing");

        config
            .check_dependencies()
            .map_err(|e| ApiError::setup(e.to_string()))?;

        let acquirer = AutoAcquirer::new(config.acquire.clone())
            .map_err(|e| ApiError::setup(e.to_string()))?;
        let decoder = FfmpegDecoder::new(config.decode.clone());
        let recognizer = TesseractRecognizer::new(config.ocr.clone());

        Ok(Self::with_components(
            config,
            Arc::new(acquirer),
            Arc::new(decoder),
            Arc::new(recognizer),
        ))
    }

    /// 注入自定义的获取 / 解码 / 识别实现
    pub fn with_components(
        config: PipelineConfig,
        acquirer: Arc<dyn MediaAcquirer>,
        decoder: Arc<dyn FrameDecoder>,
        recognizer: Arc<dyn TextRecognizer>,
    ) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let orchestrator = Arc::new(JobOrchestrator::new(
            registry.clone(),
            FrameSource::new(acquirer, decoder),
            FrameSampler::new(recognizer, config.threshold),
        ));
        let supervisor = JobSupervisor::new(registry, orchestrator, config.max_concurrent_jobs);

        info!("✅ VideoTextService ready");
        Self { supervisor }
    }

    /// 提交任务，立即返回任务 ID
    pub fn submit_job(&self, media_ref: String) -> SubmitResponse {
        let id = self.supervisor.submit(media_ref);
        SubmitResponse {
            job_id: id.to_string(),
        }
    }

    /// 查询任务状态
    pub fn get_job_status(&self, job_id: String) -> Result<JobStatusView, ApiError> {
        match self.supervisor.registry().get(&JobId::from(job_id)) {
            Ok(record) => Ok(record.into()),
            Err(RegistryError::UnknownJob(_)) => Err(ApiError::not_found()),
            Err(e) => Err(ApiError::internal(e.to_string())),
        }
    }

    /// 请求取消任务，任务已结束或不存在时返回 false
    pub fn cancel_job(&self, job_id: String) -> bool {
        self.supervisor.cancel(&JobId::from(job_id))
    }

    /// 阻塞等待所有已提交任务结束
    pub fn wait_all(&self) {
        self.supervisor.join_all()
    }
}

impl Drop for VideoTextService {
    fn drop(&mut self) {
        info!("🗑️ VideoTextService: released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::jobs::JobStatus;
    use crate::core::text::MockTextRecognizer;
    use crate::core::video::{AcquisitionError, DecodedVideo, Frame, LocalMedia};

    struct FixtureAcquirer;

    impl MediaAcquirer for FixtureAcquirer {
        fn acquire(&self, reference: &str) -> Result<LocalMedia, AcquisitionError> {
            if reference.contains("private") {
                return Err(AcquisitionError::ToolFailed {
                    tool: "yt-dlp".to_string(),
                    detail: "Video unavailable".to_string(),
                });
            }
            let dir = tempfile::tempdir()?;
            let path = dir.path().join("v.mp4");
            std::fs::write(&path, b"v")?;
            Ok(LocalMedia::temporary(path, reference, dir))
        }
    }

    struct FixtureDecoder;

    impl FrameDecoder for FixtureDecoder {
        fn decode(&self, _media: &LocalMedia) -> Result<DecodedVideo, AcquisitionError> {
            let frames = (0..90)
                .map(|i| Frame::new(2, 2, vec![255u8; 16], i * 33, i))
                .collect();
            Ok(DecodedVideo::from_frames(frames, 30))
        }
    }

    fn service(outputs: Vec<Option<&str>>) -> VideoTextService {
        VideoTextService::with_components(
            PipelineConfig::default(),
            Arc::new(FixtureAcquirer),
            Arc::new(FixtureDecoder),
            Arc::new(MockTextRecognizer::with_sequence(outputs)),
        )
    }

    #[test]
    fn test_submit_and_poll_to_completion() {
        let service = service(vec![Some("Golden Gate"), Some("golden gate!"), Some("Golden Gate")]);

        let submitted = service.submit_job("https://example.com/watch?v=1".to_string());
        service.wait_all();

        let status = service.get_job_status(submitted.job_id).unwrap();
        assert_eq!(status.status, JobStatus::Completed);
        assert_eq!(status.progress, 100);
        assert_eq!(status.results, vec!["Golden Gate", "golden gate"]);
        assert!(status.message.contains("- Golden Gate"));
    }

    #[test]
    fn test_acquisition_failure_surfaces_as_error() {
        let service = service(vec![]);

        let submitted = service.submit_job("https://example.com/private".to_string());
        service.wait_all();

        let status = service.get_job_status(submitted.job_id).unwrap();
        assert_eq!(status.status, JobStatus::Error);
        assert_eq!(status.progress, 100);
        assert!(status.message.contains("Video unavailable"));
        assert!(status.results.is_empty());
    }

    #[test]
    fn test_create_refuses_missing_tools() {
        let mut config = PipelineConfig::default();
        config.acquire.ytdlp_binary = "no-such-yt-dlp".to_string();
        config.decode.ffprobe_binary = "no-such-ffprobe".to_string();
        config.decode.ffmpeg_binary = "no-such-ffmpeg".to_string();
        config.ocr.tesseract_binary = "no-such-tesseract".to_string();

        let err = match VideoTextService::create(config) {
            Ok(_) => panic!("service started without its tools"),
            Err(e) => e,
        };
        assert_eq!(err.error_type, "Setup");
        assert!(err.message.starts_with("Missing dependency: no-such-"));
    }

    #[test]
    fn test_missing_recognizer_fails_job() {
        let service = VideoTextService::with_components(
            PipelineConfig::default(),
            Arc::new(FixtureAcquirer),
            Arc::new(FixtureDecoder),
            Arc::new(TesseractRecognizer::new(crate::core::config::OcrConfig {
                tesseract_binary: "no-such-tesseract".to_string(),
                ..Default::default()
            })),
        );

        let submitted = service.submit_job("https://example.com/watch?v=3".to_string());
        service.wait_all();

        let status = service.get_job_status(submitted.job_id).unwrap();
        assert_eq!(status.status, JobStatus::Error);
        assert_eq!(status.progress, 100);
        assert!(status.message.contains("no-such-tesseract"));
        assert!(status.results.is_empty());
    }

    #[test]
    fn test_unknown_job_is_not_found() {
        let service = service(vec![]);
        let err = service.get_job_status("missing".to_string()).unwrap_err();
        assert_eq!(err.error_type, "NotFound");
        assert_eq!(err.message, "Invalid job ID");
        assert!(!service.cancel_job("missing".to_string()));
    }

    #[test]
    fn test_submitted_job_visible_immediately() {
        let service = service(vec![]);
        let submitted = service.submit_job("https://example.com/watch?v=2".to_string());

        // 工作线程可能尚未开始，但记录必须已经存在
        let status = service.get_job_status(submitted.job_id.clone()).unwrap();
        assert_eq!(status.job_id, submitted.job_id);
        assert!(status.progress <= 100);

        service.wait_all();
    }
}
