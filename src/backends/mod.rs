// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for camera capture
//!
//! - [`camera`]: Capture device trait, V4L2 implementation and the capture
//!   loop thread

pub mod camera;
