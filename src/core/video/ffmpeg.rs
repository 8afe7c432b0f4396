//! 基于 ffprobe / ffmpeg 子进程的解码器
//!
//! ffprobe 读取分辨率、帧率、帧数；ffmpeg 以 rawvideo/rgba 输出到 stdout，
//! 按帧大小逐帧读取，整个视频不会一次性进入内存。

use super::error::{AcquisitionError, FrameReadError};
use super::frame::Frame;
use super::source::{DecodedVideo, FrameDecoder, LocalMedia};
use crate::core::config::DecodeConfig;
use log::{debug, info, warn};
use serde::Deserialize;
use std::io::{ErrorKind, Read};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

/// 错误信息只保留 stderr 末尾这么多字节
const STDERR_TAIL_BYTES: usize = 4096;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// ffprobe 得到的视频流信息
///
/// `width`/`height` 是编码尺寸。解码时关闭自动旋转，输出帧与之一致，
/// `rotation` 只用于日志。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub frame_count: u64,
    /// 显示矩阵中的旋转角度（度），没有时为 0
    pub rotation: i32,
}

/// 解析 "30000/1001" 形式的帧率并截断为整数，无效值返回 0
pub fn parse_frame_rate(raw: &str) -> u32 {
    let raw = raw.trim();
    let value = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().unwrap_or(0.0);
            let den: f64 = den.trim().parse().unwrap_or(0.0);
            if den == 0.0 {
                0.0
            } else {
                num / den
            }
        }
        None => raw.parse().unwrap_or(0.0),
    };

    if value.is_finite() && value > 0.0 {
        value as u32
    } else {
        0
    }
}

pub fn parse_probe_json(json: &str) -> Result<VideoInfo, AcquisitionError> {
    let probe: ProbeOutput =
        serde_json::from_str(json).map_err(|e| AcquisitionError::Probe(e.to_string()))?;

    let stream = probe
        .streams
        .into_iter()
        .find(|s| s.width.is_some() && s.height.is_some())
        .ok_or_else(|| AcquisitionError::Probe("no video stream reported".to_string()))?;

    let width = stream.width.unwrap_or_default();
    let height = stream.height.unwrap_or_default();
    if width == 0 || height == 0 {
        return Err(AcquisitionError::Probe(format!(
            "invalid dimensions {}x{}",
            width, height
        )));
    }

    let mut frame_rate = stream
        .r_frame_rate
        .as_deref()
        .map(parse_frame_rate)
        .unwrap_or(0);
    if frame_rate == 0 {
        frame_rate = stream
            .avg_frame_rate
            .as_deref()
            .map(parse_frame_rate)
            .unwrap_or(0);
    }

    let frame_count = match stream.nb_frames.as_deref().and_then(|n| n.trim().parse().ok()) {
        Some(count) => count,
        None => {
            // 容器没有写帧数时按时长估算
            let duration = stream
                .duration
                .as_deref()
                .or(probe.format.as_ref().and_then(|f| f.duration.as_deref()))
                .and_then(|d| d.trim().parse::<f64>().ok())
                .unwrap_or(0.0);
            (duration * frame_rate as f64).round().max(0.0) as u64
        }
    };

    let rotation = stream
        .side_data_list
        .iter()
        .find_map(|d| d.rotation)
        .map(|r| r.round() as i32)
        .unwrap_or(0);

    Ok(VideoInfo {
        width,
        height,
        frame_rate,
        frame_count,
        rotation,
    })
}

/// 从任意字节流按固定帧大小读取 RGBA 帧
pub struct RawFrameReader<R: Read> {
    reader: R,
    width: u32,
    height: u32,
    frame_rate: u32,
    next_ordinal: u64,
    done: bool,
}

impl<R: Read> RawFrameReader<R> {
    pub fn new(reader: R, width: u32, height: u32, frame_rate: u32) -> Self {
        Self {
            reader,
            width,
            height,
            frame_rate,
            next_ordinal: 0,
            done: false,
        }
    }

    fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// 读满 buf，返回实际读到的字节数（EOF 时可能不足）
    fn fill(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl<R: Read> Iterator for RawFrameReader<R> {
    type Item = Result<(u64, Frame), FrameReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let expected = self.frame_size();
        let mut data = vec![0u8; expected];
        let got = match self.fill(&mut data) {
            Ok(n) => n,
            Err(e) => {
                self.done = true;
                return Some(Err(FrameReadError::Io(e)));
            }
        };

        if got == 0 {
            self.done = true;
            return None;
        }
        if got < expected {
            self.done = true;
            return Some(Err(FrameReadError::Truncated { expected, got }));
        }

        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        let timestamp_ms = ordinal * 1000 / self.frame_rate.max(1) as u64;
        Some(Ok((
            ordinal,
            Frame::new(self.width, self.height, data, timestamp_ms, ordinal),
        )))
    }
}

/// 持续读空 stderr，只保留末尾 `STDERR_TAIL_BYTES` 字节
///
/// 管道写满后 ffmpeg 会阻塞在 stderr 上，stdout 随之停止输出。
fn drain_stderr(mut pipe: ChildStderr) -> std::io::Result<JoinHandle<String>> {
    thread::Builder::new()
        .name("ffmpeg-stderr".to_string())
        .spawn(move || {
            let mut tail: Vec<u8> = Vec::with_capacity(STDERR_TAIL_BYTES);
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        tail.extend_from_slice(&chunk[..n]);
                        if tail.len() > STDERR_TAIL_BYTES {
                            tail.drain(..tail.len() - STDERR_TAIL_BYTES);
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
            String::from_utf8_lossy(&tail).into_owned()
        })
}

/// ffmpeg 子进程帧流，drop 时结束子进程
struct FfmpegFrames {
    reader: RawFrameReader<ChildStdout>,
    child: Child,
    stderr: Option<JoinHandle<String>>,
    finished: bool,
}

impl FfmpegFrames {
    fn stderr_tail(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }

    fn check_exit(&mut self) -> Option<FrameReadError> {
        let status = self.child.wait();
        let stderr = self.stderr_tail();
        match status {
            Ok(status) if status.success() => None,
            Ok(status) => {
                let detail = stderr.trim();
                Some(FrameReadError::Decoder(if detail.is_empty() {
                    format!("exit status {}", status)
                } else {
                    detail.to_string()
                }))
            }
            Err(e) => Some(FrameReadError::Io(e)),
        }
    }
}

impl Iterator for FfmpegFrames {
    type Item = Result<(u64, Frame), FrameReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.reader.next() {
            Some(Ok(item)) => Some(Ok(item)),
            Some(Err(e)) => {
                self.finished = true;
                Some(Err(e))
            }
            None => {
                self.finished = true;
                self.check_exit().map(Err)
            }
        }
    }
}

impl Drop for FfmpegFrames {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            debug!("🛑 Stopping ffmpeg (pid {})", self.child.id());
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
        let _ = self.stderr_tail();
    }
}

pub struct FfmpegDecoder {
    config: DecodeConfig,
}

impl FfmpegDecoder {
    pub fn new(config: DecodeConfig) -> Self {
        Self { config }
    }

    pub fn probe(&self, media: &LocalMedia) -> Result<VideoInfo, AcquisitionError> {
        let tool = self.config.ffprobe_binary.as_str();
        let output = Command::new(tool)
            .args(["-v", "error", "-select_streams", "v:0"])
            .args([
                "-show_entries",
                "stream=width,height,r_frame_rate,avg_frame_rate,nb_frames,duration\
                 :stream_side_data=rotation:format=duration",
            ])
            .args(["-of", "json"])
            .arg(media.path())
            .output()
            .map_err(|e| AcquisitionError::from_spawn(tool, e))?;

        if !output.status.success() {
            return Err(AcquisitionError::ToolFailed {
                tool: tool.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_probe_json(&String::from_utf8_lossy(&output.stdout)).map_err(|e| match e {
            AcquisitionError::Probe(msg) if msg.contains("no video stream") => {
                AcquisitionError::NoVideoStream(media.reference().to_string())
            }
            other => other,
        })
    }
}

impl FrameDecoder for FfmpegDecoder {
    fn decode(&self, media: &LocalMedia) -> Result<DecodedVideo, AcquisitionError> {
        let info = self.probe(media)?;
        info!(
            "📊 Video: {}x{}, {} fps, {} frames",
            info.width, info.height, info.frame_rate, info.frame_count
        );
        if info.frame_rate == 0 {
            warn!("⚠️ ffprobe reported no frame rate for {}", media.reference());
        }
        if info.rotation != 0 {
            info!(
                "↪️ {} carries {}° rotation metadata, decoding unrotated",
                media.reference(),
                info.rotation
            );
        }

        let tool = self.config.ffmpeg_binary.as_str();
        let mut child = Command::new(tool)
            // 自动旋转会交换宽高，与 ffprobe 的编码尺寸不符，行跨度随之错位
            .args(["-v", "error", "-nostdin", "-noautorotate", "-i"])
            .arg(media.path())
            .args(["-f", "rawvideo", "-pix_fmt", "rgba", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AcquisitionError::from_spawn(tool, e))?;

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AcquisitionError::ToolFailed {
                    tool: tool.to_string(),
                    detail: "stdout/stderr not captured".to_string(),
                });
            }
        };
        let stderr = match drain_stderr(stderr) {
            Ok(handle) => handle,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AcquisitionError::Io(e));
            }
        };

        let frames = FfmpegFrames {
            reader: RawFrameReader::new(stdout, info.width, info.height, info.frame_rate),
            child,
            stderr: Some(stderr),
            finished: false,
        };

        Ok(DecodedVideo {
            frames: Box::new(frames),
            frame_rate: info.frame_rate,
            frame_count: info.frame_count,
        })
    }
}
