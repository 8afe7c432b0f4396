use image::{GrayImage, RgbaImage};
use rayon::prelude::*;
use std::time::Duration;

/// 低于该像素数时不值得分发给 rayon
const PARALLEL_MIN_PIXELS: usize = 64 * 1024;

/// 帧数据结构
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>, // RGBA 格式
    pub timestamp: Duration,
    pub frame_number: u64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        data: Vec<u8>,
        timestamp_ms: u64,
        frame_number: u64,
    ) -> Self {
        Self {
            width,
            height,
            data,
            timestamp: Duration::from_millis(timestamp_ms),
            frame_number,
        }
    }

    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    /// RGBA 字节长度是否与宽高一致
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.pixel_count() * 4
    }

    /// 灰度化，数据不完整时返回 None
    pub fn to_grayscale(&self) -> Option<GrayImage> {
        if !self.is_well_formed() {
            return None;
        }
        let rgba = RgbaImage::from_raw(self.width, self.height, self.data.clone())?;
        Some(image::imageops::grayscale(&rgba))
    }

    /// 识别前的固定预处理：灰度化 + 二值化
    pub fn preprocess(&self, threshold: u8) -> Option<GrayImage> {
        let mut gray = self.to_grayscale()?;
        binarize(&mut gray, threshold);
        Some(gray)
    }
}

/// 二值化：亮度严格大于阈值置 255，否则置 0
pub fn binarize(image: &mut GrayImage, threshold: u8) {
    let apply = |px: &mut u8| *px = if *px > threshold { 255 } else { 0 };
    let width = image.width().max(1) as usize;
    let buf: &mut [u8] = image;

    if buf.len() >= PARALLEL_MIN_PIXELS {
        buf.par_chunks_mut(width)
            .for_each(|row| row.iter_mut().for_each(apply));
    } else {
        buf.iter_mut().for_each(apply);
    }
}
