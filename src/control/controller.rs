// SPDX-License-Identifier: GPL-3.0-only

//! Shared device and recording state
//!
//! [`CaptureController`] owns the single active device and the optional
//! recording session behind one lock. Commands (switch, toggle recording,
//! snapshot) and the capture worker's per-frame step all go through it, so
//! the worker never sees a half-switched device or a half-open session.
//!
//! The worker holds the lock only for one read plus the recorder append and
//! then hands it over fairly, which lets a queued command run between two
//! frames.

use crate::backends::camera::{
    CaptureDevice, DeviceOpener, DeviceState, Frame, FrameSize, PixelFormat,
};
use crate::constants::RECORDING_FPS;
use crate::errors::{CaptureError, CaptureResult};
use crate::pipelines::photo::{FrameEncoder, save_snapshot};
use crate::pipelines::video::{RecordingSession, RecordingSpec, SinkFactory};
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Result of a switch-device command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The requested device was already active
    Unchanged { index: u32 },
    /// The device was opened; an active recording was saved first
    Switched {
        index: u32,
        size: FrameSize,
        stopped_recording: Option<PathBuf>,
    },
}

impl fmt::Display for SwitchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchOutcome::Unchanged { index } => write!(f, "Camera {} already active", index),
            SwitchOutcome::Switched {
                index,
                stopped_recording: Some(_),
                ..
            } => write!(f, "Recording stopped and saved. Switched to camera {}", index),
            SwitchOutcome::Switched { index, .. } => write!(f, "Switched to camera {}", index),
        }
    }
}

/// Result of a toggle-recording command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingOutcome {
    Started { path: PathBuf },
    Stopped { path: PathBuf },
}

impl RecordingOutcome {
    pub fn path(&self) -> &Path {
        match self {
            RecordingOutcome::Started { path } | RecordingOutcome::Stopped { path } => path,
        }
    }
}

impl fmt::Display for RecordingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingOutcome::Started { .. } => write!(f, "Recording started..."),
            RecordingOutcome::Stopped { .. } => write!(f, "Recording stopped and saved."),
        }
    }
}

/// Result of a snapshot command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotOutcome {
    pub path: PathBuf,
}

impl fmt::Display for SnapshotOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| self.path.to_string_lossy());
        write!(f, "Picture saved as {}", name)
    }
}

/// Human-readable status for any command result
pub fn status_text<T: fmt::Display>(result: &CaptureResult<T>) -> String {
    match result {
        Ok(outcome) => outcome.to_string(),
        Err(e) => e.to_string(),
    }
}

/// Reportable view of the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureStatus {
    /// Index of the device in the slot (active or failed)
    pub camera: Option<u32>,
    pub device: DeviceState,
    pub frame_size: Option<FrameSize>,
    /// Output path of the open recording
    pub recording: Option<PathBuf>,
    pub recorded_frames: u64,
    /// Most recent failure seen by the capture worker
    pub last_fault: Option<String>,
}

struct CaptureState {
    device: Option<Box<dyn CaptureDevice>>,
    device_state: DeviceState,
    camera: Option<u32>,
    recording: Option<RecordingSession>,
    /// Write failure that closed the last session, reported by the next toggle
    failed_recording: Option<CaptureError>,
    /// Size and format of the last frame read from the active device
    frame_shape: Option<(FrameSize, PixelFormat)>,
    last_fault: Option<String>,
    shut_down: bool,
}

impl CaptureState {
    /// Close the open session, if any
    fn close_recording(&mut self) -> Option<CaptureResult<PathBuf>> {
        self.recording.take().map(RecordingSession::finish)
    }

    fn release_device(&mut self) {
        if let Some(device) = self.device.take() {
            debug!(index = device.index(), "Releasing camera");
            device.release();
        }
        self.frame_shape = None;
    }

    /// Shape a new session is pinned to
    fn recording_shape(&self, device: &dyn CaptureDevice) -> (FrameSize, PixelFormat) {
        self.frame_shape
            .unwrap_or_else(|| (device.frame_size(), device.pixel_format()))
    }

    /// Drop the device after a read failure and close any recording
    fn fail_device(&mut self, error: &CaptureError) {
        let reason = match error {
            CaptureError::DeviceUnavailable { reason, .. } => reason.clone(),
            other => other.to_string(),
        };
        error!(camera = ?self.camera, %reason, "Camera read failed, parking capture");

        self.release_device();
        self.device_state = DeviceState::Failed(reason);
        self.last_fault = Some(error.to_string());

        if let Some(Err(e)) = self.close_recording() {
            error!(error = %e, "Failed to finalize recording after camera loss");
        }
    }

    fn unavailable(&self) -> CaptureError {
        match (&self.device_state, self.camera) {
            (DeviceState::Failed(reason), Some(index)) => CaptureError::device(index, reason.clone()),
            _ => CaptureError::NoActiveDevice,
        }
    }
}

/// Owner of the active device and recording session
pub struct CaptureController {
    state: Mutex<CaptureState>,
    device_ready: Condvar,
    opener: Arc<dyn DeviceOpener>,
    sinks: Arc<dyn SinkFactory>,
    encoder: FrameEncoder,
    output_dir: PathBuf,
}

impl CaptureController {
    /// Create a controller with no active device
    pub fn new(
        opener: Arc<dyn DeviceOpener>,
        sinks: Arc<dyn SinkFactory>,
        encoder: FrameEncoder,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            state: Mutex::new(CaptureState {
                device: None,
                device_state: DeviceState::Absent,
                camera: None,
                recording: None,
                failed_recording: None,
                frame_shape: None,
                last_fault: None,
                shut_down: false,
            }),
            device_ready: Condvar::new(),
            opener,
            sinks,
            encoder,
            output_dir,
        }
    }

    pub fn encoder(&self) -> &FrameEncoder {
        &self.encoder
    }

    /// Make `index` the active device
    ///
    /// The current device is released before the new one is opened. If the
    /// open fails no device is active afterwards. An open recording is saved
    /// first since its dimensions belong to the old device.
    pub fn switch_device(&self, index: u32) -> CaptureResult<SwitchOutcome> {
        let mut state = self.state.lock();

        if state.shut_down {
            return Err(CaptureError::device(index, "capture is shutting down"));
        }

        if let Some(device) = state.device.as_ref()
            && device.index() == index
        {
            debug!(index, "Camera already active");
            return Ok(SwitchOutcome::Unchanged { index });
        }

        let stopped_recording = match state.close_recording() {
            Some(Ok(path)) => Some(path),
            Some(Err(e)) => {
                warn!(error = %e, "Recording could not be finalized before switching");
                state.last_fault = Some(e.to_string());
                None
            }
            None => None,
        };
        state.failed_recording = None;

        state.release_device();
        state.device_state = DeviceState::Absent;
        state.camera = None;

        info!(index, "Opening camera");
        match self.opener.open(index) {
            Ok(device) => {
                let size = device.frame_size();
                state.device = Some(device);
                state.device_state = DeviceState::Active;
                state.camera = Some(index);
                state.last_fault = None;
                drop(state);
                self.device_ready.notify_all();

                info!(index, %size, "Switched camera");
                Ok(SwitchOutcome::Switched {
                    index,
                    size,
                    stopped_recording,
                })
            }
            Err(e) => {
                warn!(index, error = %e, "Failed to open camera");
                Err(e)
            }
        }
    }

    /// Start a recording if none is open, otherwise stop and save it
    ///
    /// Both directions run under the state lock, so concurrent toggles are
    /// serialized into start then stop. If the capture worker already closed
    /// the session after a write failure, this reports that failure instead
    /// of starting a new recording.
    pub fn toggle_recording(&self) -> CaptureResult<RecordingOutcome> {
        let mut state = self.state.lock();

        if let Some(result) = state.close_recording() {
            let path = result?;
            return Ok(RecordingOutcome::Stopped { path });
        }

        if let Some(error) = state.failed_recording.take() {
            return Err(error);
        }

        if state.shut_down {
            return Err(CaptureError::RecordingStart("capture is shutting down".into()));
        }

        let Some(device) = state.device.as_ref() else {
            return Err(state.unavailable());
        };

        let (size, format) = state.recording_shape(device.as_ref());
        let spec = RecordingSpec {
            size,
            format,
            fps: RECORDING_FPS,
        };
        let session = RecordingSession::start(&self.output_dir, spec, self.sinks.as_ref())?;
        let path = session.path().to_path_buf();
        state.recording = Some(session);

        Ok(RecordingOutcome::Started { path })
    }

    /// Read one extra frame from the active device and save it as a JPEG
    ///
    /// The read happens under the lock; encoding and the file write do not.
    /// A failed read parks the device like a failure in the capture loop.
    pub fn capture_snapshot(&self) -> CaptureResult<SnapshotOutcome> {
        let frame = {
            let mut state = self.state.lock();
            let Some(device) = state.device.as_mut() else {
                return Err(state.unavailable());
            };

            match device.read_frame() {
                Ok(frame) => {
                    state.frame_shape = Some((frame.size(), frame.format));
                    frame
                }
                Err(e) => {
                    state.fail_device(&e);
                    return Err(e);
                }
            }
        };

        let path = save_snapshot(&frame, &self.output_dir, &self.encoder)?;
        Ok(SnapshotOutcome { path })
    }

    /// One step of the capture worker
    ///
    /// Reads a frame and appends it to the open recording. Returns the frame
    /// for streaming, or `None` when there is no usable device; in that case
    /// it waits up to `idle_wait` for a switch to wake it.
    pub fn capture_tick(&self, idle_wait: Duration) -> Option<Frame> {
        let mut state = self.state.lock();

        let Some(device) = state.device.as_mut() else {
            if !state.shut_down {
                let _ = self.device_ready.wait_for(&mut state, idle_wait);
            }
            return None;
        };

        let frame = match device.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                state.fail_device(&e);
                return None;
            }
        };
        state.frame_shape = Some((frame.size(), frame.format));

        if let Some(session) = state.recording.as_mut()
            && let Err(e) = session.write_frame(&frame)
        {
            error!(error = %e, "Recording write failed, closing session");
            state.last_fault = Some(e.to_string());
            if let Some(Err(close_err)) = state.close_recording() {
                error!(error = %close_err, "Failed to finalize recording");
            }
            state.failed_recording = Some(e);
        }

        MutexGuard::unlock_fair(state);
        Some(frame)
    }

    /// Wake a worker waiting for a device
    pub fn wake(&self) {
        self.device_ready.notify_all();
    }

    /// Whether [`shutdown`](Self::shutdown) has run
    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }

    pub fn is_recording(&self) -> bool {
        self.state.lock().recording.is_some()
    }

    pub fn status(&self) -> CaptureStatus {
        let state = self.state.lock();
        CaptureStatus {
            camera: state.camera,
            device: state.device_state.clone(),
            frame_size: state
                .device
                .as_ref()
                .map(|d| state.recording_shape(d.as_ref()).0),
            recording: state.recording.as_ref().map(|r| r.path().to_path_buf()),
            recorded_frames: state
                .recording
                .as_ref()
                .map(|r| r.frames_written())
                .unwrap_or(0),
            last_fault: state.last_fault.clone(),
        }
    }

    /// Finalize the recording and release the device
    ///
    /// Later commands fail and the worker stops waiting for a device.
    /// Calling this more than once is harmless.
    pub fn shutdown(&self) -> Option<CaptureResult<PathBuf>> {
        let mut state = self.state.lock();
        if !state.shut_down {
            info!("Shutting down capture");
        }
        state.shut_down = true;

        let saved = state.close_recording();
        state.failed_recording = None;
        state.release_device();
        state.device_state = DeviceState::Absent;
        state.camera = None;
        drop(state);

        self.device_ready.notify_all();
        saved
    }
}
