// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Boundary token used between parts of the MJPEG stream
pub const STREAM_BOUNDARY: &str = "frame";

/// Content type of the stream response
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Content type of every part in the stream
pub const PART_CONTENT_TYPE: &str = "image/jpeg";

/// Fixed target frame rate for recordings
pub const RECORDING_FPS: u32 = 20;

/// Default JPEG quality for stream parts and snapshots (0-100)
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Default per-subscriber queue depth (encoded parts)
pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 4;

/// Number of mmap buffers requested from V4L2
pub const V4L2_BUFFER_COUNT: u32 = 4;

/// How long to wait for the muxer to finalize a recording after EOS
pub const RECORDING_FINALIZE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bind address of the HTTP server
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8050";

/// File name prefixes and extensions for persisted artifacts
pub mod naming {
    use std::path::{Path, PathBuf};

    pub const PICTURE_PREFIX: &str = "picture";
    pub const PICTURE_EXTENSION: &str = "jpg";
    pub const RECORDING_PREFIX: &str = "recording";
    pub const RECORDING_EXTENSION: &str = "mp4";

    /// Current wall clock time in whole unix seconds
    pub fn unix_seconds() -> i64 {
        chrono::Utc::now().timestamp()
    }

    /// `picture_<unix-seconds>.jpg` inside `dir`
    pub fn picture_path(dir: &Path, unix_seconds: i64) -> PathBuf {
        dir.join(format!(
            "{}_{}.{}",
            PICTURE_PREFIX, unix_seconds, PICTURE_EXTENSION
        ))
    }

    /// `recording_<unix-seconds>.mp4` inside `dir`
    pub fn recording_path(dir: &Path, unix_seconds: i64) -> PathBuf {
        dir.join(format!(
            "{}_{}.{}",
            RECORDING_PREFIX, unix_seconds, RECORDING_EXTENSION
        ))
    }
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
