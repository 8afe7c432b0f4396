//! 帧源 - 获取媒体（下载 / 本地）+ 解码成惰性帧序列
//!
//! 临时资源全部挂在 [`LocalMedia`] / [`OpenedMedia`] 上，drop 即释放，
//! 无论任务成功、失败还是取消。

use super::error::{AcquisitionError, FrameReadError};
use super::frame::Frame;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// 惰性、不可重启的帧序列，序号严格递增
pub type FrameStream = Box<dyn Iterator<Item = Result<(u64, Frame), FrameReadError>> + Send>;

/// 获取到本地的媒体文件
#[derive(Debug)]
pub struct LocalMedia {
    path: PathBuf,
    reference: String,
    // 下载产生的临时目录，drop 时删除
    temp_dir: Option<TempDir>,
}

impl LocalMedia {
    /// 位于临时目录中的媒体，随句柄一起删除
    pub fn temporary(path: PathBuf, reference: impl Into<String>, temp_dir: TempDir) -> Self {
        Self {
            path,
            reference: reference.into(),
            temp_dir: Some(temp_dir),
        }
    }

    /// 调用方已有的本地文件，不会被删除
    pub fn existing(path: PathBuf, reference: impl Into<String>) -> Self {
        Self {
            path,
            reference: reference.into(),
            temp_dir: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn is_temporary(&self) -> bool {
        self.temp_dir.is_some()
    }
}

impl Drop for LocalMedia {
    fn drop(&mut self) {
        if let Some(dir) = &self.temp_dir {
            info!("🗑️ LocalMedia: releasing {:?}", dir.path());
        }
    }
}

/// 解码结果：帧序列 + 名义帧率 + 总帧数（均可能为 0）
pub struct DecodedVideo {
    pub frames: FrameStream,
    pub frame_rate: u32,
    pub frame_count: u64,
}

impl DecodedVideo {
    /// 由内存中的帧构造，序号取 `frame_number`
    pub fn from_frames(frames: Vec<Frame>, frame_rate: u32) -> Self {
        let frame_count = frames.len() as u64;
        Self {
            frames: Box::new(frames.into_iter().map(|f| Ok((f.frame_number, f)))),
            frame_rate,
            frame_count,
        }
    }
}

impl std::fmt::Debug for DecodedVideo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedVideo")
            .field("frame_rate", &self.frame_rate)
            .field("frame_count", &self.frame_count)
            .finish_non_exhaustive()
    }
}

pub trait MediaAcquirer: Send + Sync {
    fn acquire(&self, reference: &str) -> Result<LocalMedia, AcquisitionError>;
}

pub trait FrameDecoder: Send + Sync {
    fn decode(&self, media: &LocalMedia) -> Result<DecodedVideo, AcquisitionError>;
}

/// 已打开的媒体。字段顺序即 drop 顺序：先停解码器，再删临时文件
#[derive(Debug)]
pub struct OpenedMedia {
    pub video: DecodedVideo,
    pub media: LocalMedia,
}

#[derive(Clone)]
pub struct FrameSource {
    acquirer: Arc<dyn MediaAcquirer>,
    decoder: Arc<dyn FrameDecoder>,
}

impl FrameSource {
    pub fn new(acquirer: Arc<dyn MediaAcquirer>, decoder: Arc<dyn FrameDecoder>) -> Self {
        Self { acquirer, decoder }
    }

    pub fn open(&self, reference: &str) -> Result<OpenedMedia, AcquisitionError> {
        let media = self.acquirer.acquire(reference)?;
        debug!("📥 Acquired {} -> {:?}", reference, media.path());

        // decode 失败时 media 在此处 drop，临时文件随之删除
        let video = self.decoder.decode(&media)?;
        info!(
            "🎬 Opened {}: {} fps, {} frames",
            reference, video.frame_rate, video.frame_count
        );

        Ok(OpenedMedia { video, media })
    }
}
