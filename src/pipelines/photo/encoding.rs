// SPDX-License-Identifier: GPL-3.0-only

//! JPEG encoding for stream parts and snapshots
//!
//! Encoding is a pure function of the frame and the quality setting, so the
//! same encoder is shared by the capture thread (stream parts) and snapshot
//! requests.

use crate::backends::camera::types::{Frame, PixelFormat};
use crate::constants::{DEFAULT_JPEG_QUALITY, naming};
use crate::errors::{CaptureError, CaptureResult};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Stateless JPEG encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEncoder {
    quality: u8,
}

impl FrameEncoder {
    /// Create an encoder with the given JPEG quality (1-100)
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Compress a frame to JPEG
    ///
    /// # Returns
    /// * `Ok(Bytes)` - JPEG payload
    /// * `Err(CaptureError::Encode)` - The frame could not be compressed
    pub fn encode(&self, frame: &Frame) -> CaptureResult<Bytes> {
        let color = match frame.format {
            PixelFormat::RGB24 => image::ExtendedColorType::Rgb8,
            PixelFormat::Gray8 => image::ExtendedColorType::L8,
        };

        // Rough upper bound for a typical webcam JPEG
        let mut buffer = Vec::with_capacity(frame.data.len() / 8);
        {
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, self.quality);

            encoder
                .encode(&frame.data, frame.width, frame.height, color)
                .map_err(|e| CaptureError::Encode(format!("JPEG encoding failed: {}", e)))?;
        }

        Ok(Bytes::from(buffer))
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

/// Encode a frame and write it as `picture_<unix-seconds>.jpg` in `output_dir`
///
/// The frame is encoded before the file is created, and a failed write
/// removes the partial file.
pub fn save_snapshot(
    frame: &Frame,
    output_dir: &Path,
    encoder: &FrameEncoder,
) -> CaptureResult<PathBuf> {
    let jpeg = encoder.encode(frame)?;

    std::fs::create_dir_all(output_dir)?;
    let path = naming::picture_path(output_dir, naming::unix_seconds());

    if let Err(e) = std::fs::write(&path, &jpeg) {
        warn!(path = %path.display(), error = %e, "Failed to save snapshot");
        if path.exists()
            && let Err(remove_err) = std::fs::remove_file(&path)
        {
            debug!(error = %remove_err, "Could not remove partial snapshot");
        }
        return Err(CaptureError::Io(format!(
            "Failed to save {}: {}",
            path.display(),
            e
        )));
    }

    info!(path = %path.display(), size = jpeg.len(), "Snapshot saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Frame {
        let data: Vec<u8> = (0..width * height * 3).map(|i| (i % 251) as u8).collect();
        Frame::new(width, height, PixelFormat::RGB24, data, 1).unwrap()
    }

    #[test]
    fn test_encode_produces_jpeg() {
        let jpeg = FrameEncoder::default().encode(&gradient(16, 8)).unwrap();
        // SOI marker
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn test_encode_gray() {
        let frame = Frame::new(4, 4, PixelFormat::Gray8, vec![128u8; 16], 1).unwrap();
        assert!(FrameEncoder::new(50).encode(&frame).is_ok());
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(FrameEncoder::new(0).quality(), 1);
        assert_eq!(FrameEncoder::new(200).quality(), 100);
    }
}
