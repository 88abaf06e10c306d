// SPDX-License-Identifier: GPL-3.0-only

//! Live MJPEG streaming
//!
//! - [`hub`]: per-consumer bounded queues fed by the capture worker
//! - [`server`]: axum routes for the stream and the control commands

pub mod hub;
pub mod server;

pub use hub::{StreamHub, Subscription};
pub use server::{multipart_part, router, serve, shutdown_signal};
