//! Fixed-rate frame sampling.

use bv_models::{AnalysisConfig, VideoMetadata};
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;
use crate::source::{FrameDecoder, VideoSource};

/// Number of frames a full pass over `duration` seconds at `frame_rate` yields.
pub fn expected_frames(duration: f64, frame_rate: f64) -> u64 {
    AnalysisConfig::with_frame_rate(frame_rate).expected_frames(duration)
}

/// Decodes a source at a fixed number of frames per second.
#[derive(Debug, Clone, Copy)]
pub struct FrameSampler {
    frame_rate: f64,
}

impl FrameSampler {
    pub fn new(frame_rate: f64) -> MediaResult<Self> {
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(MediaError::InvalidRate(frame_rate));
        }
        Ok(Self { frame_rate })
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    /// Open `source` and return a lazy stream positioned at `t = 0`.
    ///
    /// Each call decodes from the start again.
    pub async fn sample(&self, source: &dyn VideoSource) -> MediaResult<FrameStream> {
        let opened = source.open(self.frame_rate).await.map_err(|e| match e {
            MediaError::SourceUnavailable(_) => e,
            other => MediaError::source_unavailable(other.to_string()),
        })?;

        let expected = expected_frames(opened.metadata.duration_seconds, self.frame_rate);
        info!(
            source = %source.describe(),
            duration = opened.metadata.duration_seconds,
            frame_rate = self.frame_rate,
            expected_frames = expected,
            "Opened video source"
        );

        Ok(FrameStream {
            metadata: opened.metadata,
            frame_rate: self.frame_rate,
            expected,
            next_index: 0,
            decoder: opened.decoder,
            done: expected == 0,
        })
    }
}

/// Finite, ordered sequence of sampled frames.
///
/// Frame `i` carries `timestamp = i / frame_rate`, always before the video's
/// duration. The stream ends after `expected_frames` frames or when the
/// decoder runs out, whichever is first.
pub struct FrameStream {
    metadata: VideoMetadata,
    frame_rate: f64,
    expected: u64,
    next_index: u64,
    decoder: Box<dyn FrameDecoder>,
    done: bool,
}

impl FrameStream {
    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    pub fn expected_frames(&self) -> u64 {
        self.expected
    }

    /// Frames handed out so far.
    pub fn frames_emitted(&self) -> u64 {
        self.next_index
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    /// Decode the next frame. After `None` or an error the stream stays ended.
    pub async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.done {
            return Ok(None);
        }

        let image = match self.decoder.next_image().await {
            Ok(Some(image)) => image,
            Ok(None) => {
                self.done = true;
                if self.next_index < self.expected {
                    debug!(
                        emitted = self.next_index,
                        expected = self.expected,
                        "Decoder ended before expected frame count"
                    );
                }
                return Ok(None);
            }
            Err(e) => {
                self.done = true;
                return Err(e);
            }
        };

        let index = self.next_index;
        let timestamp = index as f64 / self.frame_rate;
        if timestamp >= self.metadata.duration_seconds {
            self.done = true;
            return Ok(None);
        }

        self.next_index += 1;
        if self.next_index >= self.expected {
            self.done = true;
        }

        Ok(Some(Frame::new(index, timestamp, image)))
    }
}
