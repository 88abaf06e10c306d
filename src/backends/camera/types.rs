// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Pixel layout of a captured [`Frame`]
///
/// Devices deliver YUYV, MJPG, RGB3 or GREY; the backend converts all of them
/// into one of these packed layouts before a frame leaves the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PixelFormat {
    /// RGB24 - 3 bytes per pixel
    RGB24,
    /// Gray8 - 8-bit grayscale (single channel)
    Gray8,
}

impl PixelFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::RGB24 => 3,
            Self::Gray8 => 1,
        }
    }

    /// GStreamer video/x-raw format matching this layout
    pub fn to_gst_video_format(&self) -> gstreamer_video::VideoFormat {
        match self {
            Self::RGB24 => gstreamer_video::VideoFormat::Rgb,
            Self::Gray8 => gstreamer_video::VideoFormat::Gray8,
        }
    }
}

/// Native frame dimensions of an open device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A single captured frame
///
/// Immutable once captured. Pixel data is reference counted so the recorder,
/// the stream encoder and a snapshot can share it without copying.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Tightly packed rows, `width * bytes_per_pixel` bytes each
    pub data: Arc<[u8]>,
    /// Monotonic per-device sequence number
    pub sequence: u64,
    pub captured_at: Instant,
}

impl Frame {
    /// Build a frame, validating that the buffer matches the dimensions
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: impl Into<Arc<[u8]>>,
        sequence: u64,
    ) -> Result<Self, String> {
        let data = data.into();
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(format!(
                "Frame buffer is {} bytes, expected {} for {}x{} {:?}",
                data.len(),
                expected,
                width,
                height,
                format
            ));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
            sequence,
            captured_at: Instant::now(),
        })
    }

    pub fn size(&self) -> FrameSize {
        FrameSize {
            width: self.width,
            height: self.height,
        }
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }
}

/// Device information from V4L2 capability
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceInfo {
    /// Capture index (`/dev/video<index>`)
    pub index: u32,
    /// Name of the device (V4L2 card)
    pub card: String,
    /// Driver name (V4L2 driver)
    pub driver: String,
    /// Device path (e.g., /dev/video0)
    pub path: String,
}

/// Reportable state of the active device slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum DeviceState {
    /// No device has been opened, or the last switch failed to open one
    Absent,
    /// A device is open and feeding the capture loop
    Active,
    /// The capture loop lost the device; an explicit switch is needed
    Failed(String),
}
