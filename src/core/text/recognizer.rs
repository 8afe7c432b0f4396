use crate::core::config::OcrConfig;
use image::{GrayImage, ImageFormat};
use log::debug;
use std::collections::VecDeque;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use thiserror::Error;

/// 识别失败。`Unavailable` 表示识别器本身不可用，其余只影响当前帧
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image encode error: {0}")]
    Image(#[from] image::ImageError),
    #[error("{tool} failed: {detail}")]
    ToolFailed { tool: String, detail: String },
    #[error("Recognizer unavailable: {0}")]
    Unavailable(String),
}

impl RecognitionError {
    /// 识别器不可用时后续每一帧都会失败，继续抽帧没有意义
    pub fn is_fatal(&self) -> bool {
        matches!(self, RecognitionError::Unavailable(_))
    }
}

pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &GrayImage) -> Result<String, RecognitionError>;
}

/// 调用本机 tesseract 可执行文件
pub struct TesseractRecognizer {
    config: OcrConfig,
}

impl TesseractRecognizer {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, image: &GrayImage) -> Result<String, RecognitionError> {
        let tool = self.config.tesseract_binary.as_str();

        // 每次识别独立的临时 PNG，函数返回即删除
        let input = tempfile::Builder::new()
            .prefix("frame-")
            .suffix(".png")
            .tempfile()?;
        image.save_with_format(input.path(), ImageFormat::Png)?;

        let output = Command::new(tool)
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.language)
            .arg("--psm")
            .arg(self.config.psm.to_string())
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RecognitionError::Unavailable(format!("{} not found on PATH", tool))
                } else {
                    RecognitionError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(RecognitionError::ToolFailed {
                tool: tool.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("tesseract: {} chars", text.len());
        Ok(text)
    }
}

type RecognizePattern = Box<dyn Fn(&GrayImage) -> Option<String> + Send + Sync>;

/// 模拟识别器：按调用顺序返回预设结果，或按图像内容计算结果
pub struct MockTextRecognizer {
    // None 代表该次识别失败
    script: Mutex<VecDeque<Option<String>>>,
    pattern: Option<RecognizePattern>,
    calls: AtomicUsize,
}

impl MockTextRecognizer {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            pattern: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_sequence<I, S>(outputs: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(outputs.into_iter().map(|o| o.map(Into::into)).collect()),
            pattern: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(&GrayImage) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            script: Mutex::new(VecDeque::new()),
            pattern: Some(Box::new(pattern)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockTextRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextRecognizer for MockTextRecognizer {
    fn recognize(&self, image: &GrayImage) -> Result<String, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let result = match &self.pattern {
            Some(pattern) => pattern(image),
            None => self
                .script
                .lock()
                .map_err(|e| RecognitionError::Unavailable(format!("script lock poisoned: {}", e)))?
                .pop_front()
                .unwrap_or_else(|| Some(String::new())),
        };

        result.ok_or_else(|| RecognitionError::ToolFailed {
            tool: "mock".to_string(),
            detail: "scripted failure".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_sequence_in_order() {
        let recognizer = MockTextRecognizer::with_sequence(vec![Some("one"), None, Some("three")]);
        let image = GrayImage::new(1, 1);

        assert_eq!(recognizer.recognize(&image).unwrap(), "one");
        assert!(recognizer.recognize(&image).is_err());
        assert_eq!(recognizer.recognize(&image).unwrap(), "three");
        // 预设用完后返回空文本
        assert_eq!(recognizer.recognize(&image).unwrap(), "");
        assert_eq!(recognizer.calls(), 4);
    }

    #[test]
    fn test_mock_pattern_sees_image() {
        let recognizer =
            MockTextRecognizer::with_pattern(|img| Some(format!("width {}", img.width())));
        let image = GrayImage::new(7, 1);
        assert_eq!(recognizer.recognize(&image).unwrap(), "width 7");
    }

    #[test]
    fn test_missing_tesseract_is_unavailable() {
        let recognizer = TesseractRecognizer::new(OcrConfig {
            tesseract_binary: "definitely-not-tesseract".to_string(),
            ..Default::default()
        });
        let result = recognizer.recognize(&GrayImage::new(4, 4));
        assert!(matches!(result, Err(RecognitionError::Unavailable(_))));
        assert!(result.unwrap_err().is_fatal());
    }

    #[test]
    fn test_scripted_failure_is_not_fatal() {
        let recognizer = MockTextRecognizer::with_sequence(vec![None::<&str>]);
        let err = recognizer.recognize(&GrayImage::new(1, 1)).unwrap_err();
        assert!(!err.is_fatal());
    }
}
