//! Video sources the frame sampler can decode from.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use bv_models::{VideoMetadata, VideoRef};
use image::RgbImage;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::frame::{image_from_rgb24, solid_image};
use crate::probe::probe_video;

/// Default decode resolution; large enough for product matching.
pub const DEFAULT_FRAME_WIDTH: u32 = 640;
pub const DEFAULT_FRAME_HEIGHT: u32 = 360;

/// Stderr bytes kept for error reports.
const STDERR_TAIL_BYTES: usize = 4096;

/// A decoder positioned at the start of a sampled sequence.
#[async_trait]
pub trait FrameDecoder: Send {
    /// Next image at the sampling rate, `None` at end of video.
    async fn next_image(&mut self) -> MediaResult<Option<RgbImage>>;
}

/// An opened source: metadata plus a fresh decoder.
pub struct OpenedSource {
    pub metadata: VideoMetadata,
    pub decoder: Box<dyn FrameDecoder>,
}

/// Anything that can be opened and decoded at a fixed sampling rate.
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Human-readable location for logs.
    fn describe(&self) -> String;

    /// Probe and start decoding from the beginning.
    async fn open(&self, frame_rate: f64) -> MediaResult<OpenedSource>;
}

/// Source decoded by an `ffmpeg` child process.
#[derive(Debug, Clone)]
pub struct FfmpegSource {
    video: VideoRef,
    width: u32,
    height: u32,
}

impl FfmpegSource {
    pub fn new(video: VideoRef) -> Self {
        Self {
            video,
            width: DEFAULT_FRAME_WIDTH,
            height: DEFAULT_FRAME_HEIGHT,
        }
    }

    /// Set the decode resolution.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width.max(1);
        self.height = height.max(1);
        self
    }

    fn build_command(&self, frame_rate: f64) -> Command {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(self.video.as_str())
            .args([
                "-vf",
                &format!("fps={},scale={}:{}", frame_rate, self.width, self.height),
                "-pix_fmt",
                "rgb24",
                "-f",
                "rawvideo",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl VideoSource for FfmpegSource {
    fn describe(&self) -> String {
        self.video.to_string()
    }

    async fn open(&self, frame_rate: f64) -> MediaResult<OpenedSource> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let info = probe_video(self.video.as_str()).await?;
        let title = info.title.unwrap_or_else(|| self.video.fallback_title());

        let mut metadata = VideoMetadata::new(title, info.duration);
        metadata.width = Some(info.width);
        metadata.height = Some(info.height);

        debug!(
            video = %self.video,
            duration = info.duration,
            frame_rate,
            "Starting FFmpeg rawvideo decode"
        );

        let cmd = self.build_command(frame_rate);
        let decoder = FfmpegDecoder::spawn(cmd, self.width, self.height)?;

        Ok(OpenedSource {
            metadata,
            decoder: Box::new(decoder),
        })
    }
}

/// Reads one rgb24 frame at a time from the FFmpeg pipe.
///
/// The child is killed when the decoder is dropped.
struct FfmpegDecoder {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr_tail: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    frames_read: u64,
    finished: bool,
}

impl FfmpegDecoder {
    fn spawn(mut cmd: Command, width: u32, height: u32) -> MediaResult<Self> {
        let mut child = cmd.spawn().map_err(|e| {
            MediaError::ffmpeg_failed(format!("Failed to spawn FFmpeg: {}", e), None, None)
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            MediaError::ffmpeg_failed("Failed to capture FFmpeg stdout", None, None)
        })?;

        // FFmpeg blocks once the stderr pipe fills, so drain it alongside stdout
        let stderr_tail = child.stderr.take().map(|pipe| tokio::spawn(drain_stderr(pipe)));

        Ok(Self {
            child,
            stdout: BufReader::new(stdout),
            stderr_tail,
            width,
            height,
            frames_read: 0,
            finished: false,
        })
    }

    async fn finish(&mut self) -> MediaResult<()> {
        self.finished = true;
        let status = self.child.wait().await?;
        if status.success() {
            return Ok(());
        }

        let stderr = match self.stderr_tail.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        if self.frames_read == 0 {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg produced no frames",
                Some(stderr),
                status.code(),
            ));
        }

        warn!(
            exit_code = ?status.code(),
            frames = self.frames_read,
            stderr = %stderr,
            "FFmpeg exited with error after partial decode"
        );
        Ok(())
    }
}

/// Read stderr to the end, keeping only its last bytes.
async fn drain_stderr(mut pipe: ChildStderr) -> String {
    let mut tail: VecDeque<u8> = VecDeque::with_capacity(STDERR_TAIL_BYTES);
    let mut chunk = [0u8; 8192];

    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend(&chunk[..n]);
                let excess = tail.len().saturating_sub(STDERR_TAIL_BYTES);
                tail.drain(..excess);
            }
        }
    }

    let bytes: Vec<u8> = tail.into();
    String::from_utf8_lossy(&bytes).trim().to_string()
}

#[async_trait]
impl FrameDecoder for FfmpegDecoder {
    async fn next_image(&mut self) -> MediaResult<Option<RgbImage>> {
        if self.finished {
            return Ok(None);
        }

        let bytes_per_frame = (self.width * self.height * 3) as usize;
        let mut buf = vec![0u8; bytes_per_frame];
        match self.stdout.read_exact(&mut buf).await {
            Ok(_) => {
                self.frames_read += 1;
                image_from_rgb24(self.width, self.height, buf).map(Some)
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.finish().await?;
                Ok(None)
            }
            Err(e) => {
                self.finished = true;
                Err(e.into())
            }
        }
    }
}

/// Produces the image for a given frame index and timestamp.
pub type FrameGenerator = Arc<dyn Fn(u64, f64) -> RgbImage + Send + Sync>;

/// In-memory source with a fixed duration and generated frames.
#[derive(Clone)]
pub struct MemorySource {
    metadata: VideoMetadata,
    generator: FrameGenerator,
    unavailable: Option<String>,
}

impl MemorySource {
    /// Source of uniformly gray frames.
    pub fn new(title: impl Into<String>, duration_seconds: f64) -> Self {
        Self {
            metadata: VideoMetadata::new(title, duration_seconds),
            generator: Arc::new(|_, _| solid_image(32, 18, [128, 128, 128])),
            unavailable: None,
        }
    }

    /// Use `generator` to build each frame.
    pub fn with_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(u64, f64) -> RgbImage + Send + Sync + 'static,
    {
        self.generator = Arc::new(generator);
        self
    }

    /// A source whose `open` always fails.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let mut source = Self::new("unavailable", 0.0);
        source.unavailable = Some(reason.into());
        source
    }
}

impl std::fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySource")
            .field("metadata", &self.metadata)
            .field("unavailable", &self.unavailable)
            .finish()
    }
}

#[async_trait]
impl VideoSource for MemorySource {
    fn describe(&self) -> String {
        format!("memory://{}", self.metadata.title)
    }

    async fn open(&self, frame_rate: f64) -> MediaResult<OpenedSource> {
        if let Some(reason) = &self.unavailable {
            return Err(MediaError::source_unavailable(reason.clone()));
        }

        Ok(OpenedSource {
            metadata: self.metadata.clone(),
            decoder: Box::new(MemoryDecoder {
                generator: self.generator.clone(),
                duration: self.metadata.duration_seconds,
                frame_rate,
                index: 0,
            }),
        })
    }
}

struct MemoryDecoder {
    generator: FrameGenerator,
    duration: f64,
    frame_rate: f64,
    index: u64,
}

#[async_trait]
impl FrameDecoder for MemoryDecoder {
    async fn next_image(&mut self) -> MediaResult<Option<RgbImage>> {
        let timestamp = self.index as f64 / self.frame_rate;
        if timestamp >= self.duration {
            return Ok(None);
        }
        let image = (self.generator)(self.index, timestamp);
        self.index += 1;
        Ok(Some(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_source_yields_until_duration() {
        let source = MemorySource::new("clip", 2.0);
        let mut opened = source.open(2.0).await.unwrap();

        let mut count = 0;
        while opened.decoder.next_image().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 4);
        assert_eq!(opened.metadata.title, "clip");
    }

    #[tokio::test]
    async fn test_unavailable_memory_source() {
        let source = MemorySource::unavailable("gone");
        assert!(matches!(
            source.open(1.0).await,
            Err(MediaError::SourceUnavailable(reason)) if reason == "gone"
        ));
    }

    #[cfg(unix)]
    fn shell_decoder(script: &str, width: u32, height: u32) -> FfmpegDecoder {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        FfmpegDecoder::spawn(cmd, width, height).unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_decoder_reads_frames_past_noisy_stderr() {
        // Far more stderr than a pipe buffer holds, then one 4x4 frame
        let mut decoder = shell_decoder(
            "head -c 200000 /dev/zero | tr '\\0' w >&2; head -c 48 /dev/zero",
            4,
            4,
        );

        let first = tokio::time::timeout(std::time::Duration::from_secs(5), decoder.next_image())
            .await
            .expect("decoder stalled on stderr")
            .unwrap();
        assert!(first.is_some());
        assert!(decoder.next_image().await.unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_decoder_failure_keeps_stderr_tail() {
        let mut decoder = shell_decoder(
            "head -c 100000 /dev/zero | tr '\\0' x >&2; echo 'moov atom not found' >&2; exit 1",
            4,
            4,
        );

        match decoder.next_image().await {
            Err(MediaError::FfmpegFailed {
                stderr: Some(stderr),
                exit_code,
                ..
            }) => {
                assert_eq!(exit_code, Some(1));
                assert!(stderr.ends_with("moov atom not found"));
                assert!(stderr.len() <= STDERR_TAIL_BYTES);
            }
            other => panic!("expected FFmpeg failure, got {:?}", other.map(|i| i.is_some())),
        }
    }

    #[test]
    fn test_ffmpeg_command_args() {
        let source = FfmpegSource::new(VideoRef::from("/data/in.mp4")).with_size(320, 180);
        let cmd = source.build_command(2.0);
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        assert!(args.contains(&"fps=2,scale=320:180".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-pix_fmt" && w[1] == "rgb24"));
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "rawvideo"));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }
}
