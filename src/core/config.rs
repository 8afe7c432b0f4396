//! 流水线配置 - 外部工具路径、二值化阈值、并发上限

use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// 默认亮度阈值，高于该值的像素置白
pub const DEFAULT_THRESHOLD: u8 = 150;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Missing dependency: {tool} ({detail})")]
    MissingDependency { tool: String, detail: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 二值化亮度阈值
    pub threshold: u8,
    /// 同时运行的任务数上限，超出的任务保持 queued 排队
    pub max_concurrent_jobs: usize,
    pub acquire: AcquireConfig,
    pub decode: DecodeConfig,
    pub ocr: OcrConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_concurrent_jobs: num_cpus::get().max(1),
            acquire: AcquireConfig::default(),
            decode: DecodeConfig::default(),
            ocr: OcrConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// 单任务串行，适合嵌入式 / 移动端宿主
    pub fn for_low_power() -> Self {
        Self {
            max_concurrent_jobs: 1,
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// 启动前确认外部工具都能执行，只看能否启动，不看退出码
    pub fn check_dependencies(&self) -> Result<(), ConfigError> {
        let tools = [
            (self.acquire.ytdlp_binary.as_str(), "--version"),
            (self.decode.ffprobe_binary.as_str(), "-version"),
            (self.decode.ffmpeg_binary.as_str(), "-version"),
            (self.ocr.tesseract_binary.as_str(), "--version"),
        ];
        for (tool, version_flag) in tools {
            Command::new(tool)
                .arg(version_flag)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map_err(|e| ConfigError::MissingDependency {
                    tool: tool.to_string(),
                    detail: e.to_string(),
                })?;
            debug!("Found {}", tool);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquireConfig {
    pub ytdlp_binary: String,
    /// yt-dlp `-f` 格式选择，None 表示使用 yt-dlp 默认
    pub format: Option<String>,
    pub user_agent: String,
    /// 临时下载目录的父目录，None 表示系统临时目录
    pub download_dir: Option<PathBuf>,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            ytdlp_binary: "yt-dlp".to_string(),
            format: None,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36".to_string(),
            download_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    pub ffmpeg_binary: String,
    pub ffprobe_binary: String,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_binary: "ffmpeg".to_string(),
            ffprobe_binary: "ffprobe".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub tesseract_binary: String,
    pub language: String,
    /// Tesseract page segmentation mode
    pub psm: u8,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_binary: "tesseract".to_string(),
            language: "eng".to_string(),
            psm: 3,
        }
    }
}
