// SPDX-License-Identifier: GPL-3.0-only

//! camstream - live camera streaming with recording and snapshots
//!
//! A single capture worker reads frames from the active camera, appends them
//! to an open recording and fans JPEG parts out to every connected stream
//! viewer. Commands to switch cameras, toggle recording and take snapshots
//! can arrive at any time from the HTTP routes or the command line.
//!
//! # Architecture
//!
//! - [`backends`]: Camera device abstraction and the V4L2 implementation
//! - [`pipelines`]: JPEG encoding and MP4 recording
//! - [`control`]: Shared device/recording state, engine lifecycle, stopwatch
//! - [`stream`]: Subscriber fan-out and the HTTP server
//! - [`config`]: Runtime configuration

pub mod backends;
pub mod config;
pub mod constants;
pub mod control;
pub mod errors;
pub mod pipelines;
pub mod stream;

// Re-export commonly used types
pub use config::ServerConfig;
pub use control::{CaptureController, CaptureEngine};
pub use errors::{CaptureError, CaptureResult};
