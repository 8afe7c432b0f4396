pub mod acquire;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod source;

pub use acquire::{AutoAcquirer, HttpAcquirer, LocalFileAcquirer, MediaKind, YtDlpAcquirer};
pub use error::{AcquisitionError, FrameReadError};
pub use ffmpeg::{FfmpegDecoder, RawFrameReader, VideoInfo};
pub use frame::Frame;
pub use source::{
    DecodedVideo, FrameDecoder, FrameSource, FrameStream, LocalMedia, MediaAcquirer, OpenedMedia,
};
