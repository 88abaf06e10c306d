// SPDX-License-Identifier: GPL-3.0-only

//! Recording sessions
//!
//! A [`RecordingSession`] owns one open video sink from start until it is
//! finished. Frame dimensions and pixel format are pinned when the session
//! starts; a frame that does not match is a write failure.

use crate::backends::camera::types::{Frame, FrameSize, PixelFormat};
use crate::constants::naming;
use crate::errors::{CaptureError, CaptureResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Parameters fixed for the lifetime of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingSpec {
    pub size: FrameSize,
    pub format: PixelFormat,
    pub fps: u32,
}

impl RecordingSpec {
    /// Duration of one frame at the target rate
    pub fn frame_duration(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.fps.max(1) as u64)
    }

    /// Presentation timestamp of the n-th frame
    pub fn timestamp(&self, frame_index: u64) -> Duration {
        Duration::from_nanos(frame_index * 1_000_000_000 / self.fps.max(1) as u64)
    }
}

/// An open video writer
pub trait VideoSink: Send {
    /// Append one frame at the given presentation timestamp
    fn write_frame(&mut self, frame: &Frame, pts: Duration) -> Result<(), String>;

    /// Flush and close the output so the file is playable
    fn finish(self: Box<Self>) -> Result<(), String>;
}

/// Creates video sinks for new sessions
pub trait SinkFactory: Send + Sync {
    fn create(&self, path: &Path, spec: &RecordingSpec) -> Result<Box<dyn VideoSink>, String>;
}

/// An active recording
pub struct RecordingSession {
    path: PathBuf,
    spec: RecordingSpec,
    sink: Option<Box<dyn VideoSink>>,
    frames_written: u64,
}

impl RecordingSession {
    /// Open a new `recording_<unix-seconds>.mp4` in `output_dir`
    pub fn start(
        output_dir: &Path,
        spec: RecordingSpec,
        factory: &dyn SinkFactory,
    ) -> CaptureResult<Self> {
        std::fs::create_dir_all(output_dir)
            .map_err(|e| CaptureError::RecordingStart(e.to_string()))?;
        let path = naming::recording_path(output_dir, naming::unix_seconds());

        info!(
            path = %path.display(),
            size = %spec.size,
            format = ?spec.format,
            fps = spec.fps,
            "Starting recording"
        );

        let sink = factory
            .create(&path, &spec)
            .map_err(CaptureError::RecordingStart)?;

        Ok(Self {
            path,
            spec,
            sink: Some(sink),
            frames_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Append a frame
    ///
    /// After an error the session must be finished; the caller decides when.
    pub fn write_frame(&mut self, frame: &Frame) -> CaptureResult<()> {
        if frame.size() != self.spec.size || frame.format != self.spec.format {
            return Err(self.write_error(format!(
                "frame is {} {:?}, session expects {} {:?}",
                frame.size(),
                frame.format,
                self.spec.size,
                self.spec.format
            )));
        }

        let pts = self.spec.timestamp(self.frames_written);
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| CaptureError::Write {
                path: self.path.clone(),
                reason: "sink already closed".into(),
            })?;

        sink.write_frame(frame, pts)
            .map_err(|e| CaptureError::Write {
                path: self.path.clone(),
                reason: e,
            })?;

        self.frames_written += 1;
        if self.frames_written % 200 == 0 {
            debug!(frames = self.frames_written, "Recording progress");
        }
        Ok(())
    }

    /// Flush and close the output file
    pub fn finish(mut self) -> CaptureResult<PathBuf> {
        let sink = self.sink.take();
        let path = self.path.clone();
        let Some(sink) = sink else {
            return Ok(path);
        };

        sink.finish().map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to finalize recording");
            CaptureError::Write {
                path: path.clone(),
                reason: e,
            }
        })?;

        info!(path = %path.display(), frames = self.frames_written, "Recording saved");
        Ok(path)
    }

    fn write_error(&self, reason: String) -> CaptureError {
        CaptureError::Write {
            path: self.path.clone(),
            reason,
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            warn!(path = %self.path.display(), "Recording session dropped while open, finalizing");
            if let Err(e) = sink.finish() {
                error!(path = %self.path.display(), error = %e, "Failed to finalize recording");
            }
        }
    }
}

impl std::fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSession")
            .field("path", &self.path)
            .field("spec", &self.spec)
            .field("frames_written", &self.frames_written)
            .field("open", &self.sink.is_some())
            .finish()
    }
}
