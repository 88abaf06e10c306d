// SPDX-License-Identifier: GPL-3.0-only

//! Capture engine lifecycle
//!
//! Wires the controller, the stream hub and the stopwatch together and runs
//! the single capture worker:
//!
//! ```text
//! capture thread: controller.capture_tick() ──▶ encode ──▶ hub.publish()
//!                       │
//!                       └──▶ recording session (under the state lock)
//! ```

use super::controller::{CaptureController, CaptureStatus};
use super::stopwatch::{Stopwatch, StopwatchStatus};
use crate::backends::camera::frame_loop::{CaptureLoopController, LoopAction};
use crate::backends::camera::{DeviceOpener, Frame};
use crate::config::ServerConfig;
use crate::errors::{CaptureError, CaptureResult};
use crate::pipelines::photo::FrameEncoder;
use crate::pipelines::video::SinkFactory;
use crate::stream::{StreamHub, multipart_part};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How long the worker sleeps between checks while no device is active
const IDLE_WAIT: Duration = Duration::from_millis(250);

/// Everything a status request reports
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    #[serde(flatten)]
    pub capture: CaptureStatus,
    pub subscribers: usize,
    pub dropped_parts: u64,
    pub stopwatch: StopwatchStatus,
}

/// Running capture engine
pub struct CaptureEngine {
    controller: Arc<CaptureController>,
    hub: Arc<StreamHub>,
    stopwatch: Arc<Stopwatch>,
    worker: Mutex<Option<CaptureLoopController>>,
}

impl CaptureEngine {
    /// Build the engine, open the initial camera and start the worker
    ///
    /// A failure to open the initial camera is logged and leaves the engine
    /// without an active device.
    pub fn start(
        config: ServerConfig,
        opener: Arc<dyn DeviceOpener>,
        sinks: Arc<dyn SinkFactory>,
    ) -> CaptureResult<Self> {
        let config = config.normalized();
        info!(
            output_dir = %config.output_dir.display(),
            initial_camera = ?config.initial_camera,
            jpeg_quality = config.jpeg_quality,
            "Starting capture engine"
        );

        let controller = Arc::new(CaptureController::new(
            opener,
            sinks,
            FrameEncoder::new(config.jpeg_quality),
            config.output_dir.clone(),
        ));
        let hub = StreamHub::new(config.subscriber_queue);

        if let Some(index) = config.initial_camera
            && let Err(e) = controller.switch_device(index)
        {
            warn!(index, error = %e, "Initial camera unavailable, starting without a device");
        }

        let worker = {
            let controller = Arc::clone(&controller);
            let hub = Arc::clone(&hub);
            CaptureLoopController::start("capture", move || {
                if controller.is_shut_down() {
                    return LoopAction::Stop;
                }
                if let Some(frame) = controller.capture_tick(IDLE_WAIT) {
                    publish_frame(&hub, controller.encoder(), &frame);
                }
                LoopAction::Continue
            })
            .map_err(|e| CaptureError::Io(format!("Failed to spawn capture thread: {}", e)))?
        };
        let worker = {
            let controller = Arc::clone(&controller);
            worker.with_waker(move || controller.wake())
        };

        Ok(Self {
            controller,
            hub,
            stopwatch: Arc::new(Stopwatch::new()),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn controller(&self) -> &Arc<CaptureController> {
        &self.controller
    }

    pub fn hub(&self) -> &Arc<StreamHub> {
        &self.hub
    }

    pub fn stopwatch(&self) -> &Arc<Stopwatch> {
        &self.stopwatch
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map(|w| w.is_running())
            .unwrap_or(false)
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            capture: self.controller.status(),
            subscribers: self.hub.subscriber_count(),
            dropped_parts: self.hub.dropped_parts(),
            stopwatch: self.stopwatch.status(),
        }
    }

    /// Stop the worker, save any recording, release the device and end
    /// all streams
    pub fn shutdown(&self) {
        let Some(mut worker) = self.worker.lock().take() else {
            return;
        };

        info!("Stopping capture engine");
        worker.request_stop();

        match self.controller.shutdown() {
            Some(Ok(path)) => info!(path = %path.display(), "Recording saved on shutdown"),
            Some(Err(e)) => error!(error = %e, "Failed to save recording on shutdown"),
            None => {}
        }

        if !worker.join() {
            error!("Capture worker ended abnormally");
        }
        self.hub.close();
        info!("Capture engine stopped");
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Encode a frame once and queue it for every subscriber
///
/// Skipped entirely when nobody is watching. An encode failure only costs
/// this frame its stream part.
fn publish_frame(hub: &StreamHub, encoder: &FrameEncoder, frame: &Frame) {
    if !hub.has_subscribers() {
        return;
    }

    match encoder.encode(frame) {
        Ok(jpeg) => {
            hub.publish(multipart_part(&jpeg));
        }
        Err(e) => {
            debug!(sequence = frame.sequence, error = %e, "Skipping frame for stream");
        }
    }
}
