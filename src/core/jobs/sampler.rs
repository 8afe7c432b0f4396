//! 抽帧 + 识别 + 聚合
//!
//! 每 `frame_rate` 帧取一帧（约每秒一帧），灰度化、二值化后交给识别器，
//! 清洗后的非空文本放进有序集合，结果按字典序返回，与帧到达顺序无关。

use super::cancel::CancelToken;
use super::error::ProcessingError;
use crate::core::text::{normalize, TextRecognizer};
use crate::core::video::{Frame, FrameReadError};
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct FrameSampler {
    recognizer: Arc<dyn TextRecognizer>,
    threshold: u8,
}

impl FrameSampler {
    pub fn new(recognizer: Arc<dyn TextRecognizer>, threshold: u8) -> Self {
        Self {
            recognizer,
            threshold,
        }
    }

    /// 帧率为 0 时按 1 处理，避免对 0 取模
    pub fn effective_rate(frame_rate: u32) -> u64 {
        frame_rate.max(1) as u64
    }

    /// 预计采样数，向上取整：序号 0..frame_count 中能被帧率整除的个数
    pub fn expected_samples(frame_count: u64, frame_rate: u32) -> u64 {
        frame_count.div_ceil(Self::effective_rate(frame_rate))
    }

    /// `on_progress(已处理采样数, 预计采样数)` 在每个采样帧之后调用
    pub fn sample<I, F>(
        &self,
        frames: I,
        frame_rate: u32,
        frame_count: u64,
        cancel: &CancelToken,
        mut on_progress: F,
    ) -> Result<Vec<String>, ProcessingError>
    where
        I: IntoIterator<Item = Result<(u64, Frame), FrameReadError>>,
        F: FnMut(u64, u64),
    {
        if frame_rate == 0 {
            warn!("⚠️ Source reported 0 fps, sampling every frame");
        }
        let rate = Self::effective_rate(frame_rate);
        let expected = Self::expected_samples(frame_count, frame_rate);
        info!(
            "🔍 Sampling 1 of every {} frames, ~{} samples expected",
            rate, expected
        );

        let mut frames = frames.into_iter();
        let mut texts = BTreeSet::new();
        let mut processed = 0u64;

        loop {
            if cancel.is_cancelled() {
                return Err(ProcessingError::Cancelled);
            }
            let (ordinal, frame) = match frames.next() {
                Some(item) => item?,
                None => break,
            };
            if ordinal % rate != 0 {
                continue;
            }

            if cancel.is_cancelled() {
                return Err(ProcessingError::Cancelled);
            }
            let text = self.recognize_frame(ordinal, &frame)?;
            if !text.is_empty() {
                debug!("Frame {}: {:?}", ordinal, text);
                texts.insert(text);
            }

            processed += 1;
            on_progress(processed, expected);
        }

        info!(
            "✅ Sampled {} frames, {} distinct texts",
            processed,
            texts.len()
        );
        Ok(texts.into_iter().collect())
    }

    /// 单帧失败只记录日志，按无文字处理；识别器不可用则终止任务
    fn recognize_frame(&self, ordinal: u64, frame: &Frame) -> Result<String, ProcessingError> {
        let Some(image) = frame.preprocess(self.threshold) else {
            warn!(
                "⚠️ Frame {} is malformed ({}x{}, {} bytes), skipping",
                ordinal,
                frame.width,
                frame.height,
                frame.data.len()
            );
            return Ok(String::new());
        };

        match self.recognizer.recognize(&image) {
            Ok(raw) => Ok(normalize(&raw)),
            Err(e) if e.is_fatal() => Err(ProcessingError::Recognizer(e)),
            Err(e) => {
                warn!("⚠️ Recognition failed on frame {}: {}", ordinal, e);
                Ok(String::new())
            }
        }
    }
}
