//! Sampled video frames.

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, Rgb, RgbImage};

use crate::error::{MediaError, MediaResult};

/// Default JPEG quality for frames sent to the vision service.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// One decoded frame at a sampled timestamp.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Zero-based position in the sampled sequence
    pub index: u64,
    /// `index / frame_rate`
    pub timestamp_seconds: f64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, timestamp_seconds: f64, image: RgbImage) -> Self {
        Self {
            index,
            timestamp_seconds,
            image,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Encode the frame as JPEG.
    pub fn to_jpeg(&self, quality: u8) -> MediaResult<Vec<u8>> {
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
            .encode(
                self.image.as_raw(),
                self.image.width(),
                self.image.height(),
                ColorType::Rgb8,
            )
            .map_err(|e| MediaError::Encode(e.to_string()))?;
        Ok(buf)
    }
}

/// Build an image of a single color.
pub fn solid_image(width: u32, height: u32, rgb: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb(rgb))
}

/// Wrap a packed rgb24 buffer as an image.
pub fn image_from_rgb24(width: u32, height: u32, data: Vec<u8>) -> MediaResult<RgbImage> {
    RgbImage::from_raw(width, height, data).ok_or_else(|| {
        MediaError::internal(format!("rgb24 buffer does not match {}x{}", width, height))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_encoding_produces_jpeg_magic() {
        let frame = Frame::new(0, 0.0, solid_image(16, 8, [200, 10, 10]));
        let jpeg = frame.to_jpeg(DEFAULT_JPEG_QUALITY).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(frame.width(), 16);
        assert_eq!(frame.height(), 8);
    }

    #[test]
    fn test_rgb24_buffer_size_checked() {
        assert!(image_from_rgb24(2, 2, vec![0; 12]).is_ok());
        assert!(image_from_rgb24(2, 2, vec![0; 11]).is_err());
    }
}
