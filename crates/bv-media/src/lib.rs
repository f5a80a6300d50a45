//! Frame sampling for video analysis.
//!
//! This crate provides:
//! - A `VideoSource` abstraction with FFmpeg-backed and in-memory sources
//! - FFprobe metadata (duration, title)
//! - A lazy, fixed-rate `FrameStream`
//! - JPEG encoding of frames for transport

pub mod error;
pub mod frame;
pub mod probe;
pub mod sampler;
pub mod source;

pub use error::{MediaError, MediaResult};
pub use frame::{solid_image, Frame, DEFAULT_JPEG_QUALITY};
pub use probe::{probe_video, VideoInfo};
pub use sampler::{expected_frames, FrameSampler, FrameStream};
pub use source::{
    FfmpegSource, FrameDecoder, FrameGenerator, MemorySource, OpenedSource, VideoSource,
    DEFAULT_FRAME_HEIGHT, DEFAULT_FRAME_WIDTH,
};
