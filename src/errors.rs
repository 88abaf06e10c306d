// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the capture, recording and streaming engine
//!
//! The taxonomy mirrors how failures are contained:
//! - [`CaptureError::DeviceUnavailable`] is surfaced to the caller of a command,
//!   or parks the capture loop when it happens in the background
//! - [`CaptureError::Encode`] and [`CaptureError::SubscriberUnreachable`] only
//!   ever affect a single frame or a single consumer
//! - [`CaptureError::Write`] closes the active recording session

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using CaptureError
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Errors produced by the capture engine
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    /// Device could not be opened, was released, or a read failed
    #[error("Camera {index} unavailable: {reason}")]
    DeviceUnavailable { index: u32, reason: String },

    /// No device is active at all
    #[error("No active camera")]
    NoActiveDevice,

    /// A frame could not be compressed for streaming
    #[error("Encoding failed: {0}")]
    Encode(String),

    /// The recorder could not write or finalize its output
    #[error("Recording write failed for {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    /// A stream consumer went away or cannot keep up
    #[error("Subscriber {0} unreachable")]
    SubscriberUnreachable(u64),

    /// The video sink could not be created
    #[error("Failed to start recording: {0}")]
    RecordingStart(String),

    /// Filesystem error outside of an active recording (e.g. snapshot save)
    #[error("I/O error: {0}")]
    Io(String),
}

impl CaptureError {
    /// Convenience constructor for device failures
    pub fn device(index: u32, reason: impl Into<String>) -> Self {
        CaptureError::DeviceUnavailable {
            index,
            reason: reason.into(),
        }
    }

    /// Whether this error means the device cannot serve frames
    pub fn is_device_unavailable(&self) -> bool {
        matches!(
            self,
            CaptureError::DeviceUnavailable { .. } | CaptureError::NoActiveDevice
        )
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::Io(err.to_string())
    }
}
