use thiserror::Error;

/// 媒体获取 / 解码失败，对任务而言是终态错误
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Unresolvable media reference: {0}")]
    Unresolvable(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP download failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{tool} not found, is it installed and on PATH?")]
    ToolMissing { tool: String },
    #[error("{tool} failed: {detail}")]
    ToolFailed { tool: String, detail: String },
    #[error("Media probe failed: {0}")]
    Probe(String),
    #[error("No video stream in {0}")]
    NoVideoStream(String),
}

impl AcquisitionError {
    /// 把 `Command::spawn/output` 的错误映射成可读的工具错误
    pub(crate) fn from_spawn(tool: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            AcquisitionError::ToolMissing {
                tool: tool.to_string(),
            }
        } else {
            AcquisitionError::Io(err)
        }
    }
}

/// 读取下一帧失败，对任务而言是致命错误
#[derive(Debug, Error)]
pub enum FrameReadError {
    #[error("Frame stream IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Truncated frame: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("Decoder exited abnormally: {0}")]
    Decoder(String),
}
