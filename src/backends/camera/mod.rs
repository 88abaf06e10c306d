// SPDX-License-Identifier: GPL-3.0-only

//! Camera backend abstraction
//!
//! ```text
//! ┌─────────────────────┐
//! │  CaptureController  │  ← owns the single active device
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │   DeviceOpener      │  ← opens a device by index
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │   CaptureDevice     │  ← blocking frame reads
//! └──────────┬──────────┘
//!            │
//!            ▼
//!        ┌──────┐
//!        │ V4L2 │  ← Concrete implementation
//!        └──────┘
//! ```

pub mod format_converters;
pub mod frame_loop;
pub mod types;
pub mod v4l2;

pub use types::*;

use crate::errors::CaptureResult;

/// An open capture device
///
/// Exactly one is active at a time and only the capture controller touches
/// it. Dropping the device releases it.
pub trait CaptureDevice: Send {
    /// Index the device was opened with
    fn index(&self) -> u32;

    /// Native frame dimensions negotiated at open time
    fn frame_size(&self) -> FrameSize;

    /// Layout of the frames this device produces
    fn pixel_format(&self) -> PixelFormat;

    /// Block until the next frame is available
    ///
    /// An error means the device is no longer usable.
    fn read_frame(&mut self) -> CaptureResult<Frame>;

    /// Release the device explicitly
    fn release(self: Box<Self>) {
        drop(self);
    }
}

/// Opens capture devices by index
pub trait DeviceOpener: Send + Sync {
    /// Open the device with the given index
    ///
    /// # Returns
    /// * `Ok(Box<dyn CaptureDevice>)` - Device opened and streaming
    /// * `Err(CaptureError::DeviceUnavailable)` - Open failed
    fn open(&self, index: u32) -> CaptureResult<Box<dyn CaptureDevice>>;
}
