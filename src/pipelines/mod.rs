// SPDX-License-Identifier: GPL-3.0-only

//! Encoding and persistence pipelines
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Camera Frame │ ──▶ │  Photo Pipeline   │ ──▶ │  JPEG part   │
//! │   (RGB24)    │     │  - JPEG encoding  │     │  or file     │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//!
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Camera Frame │ ──▶ │  Video Pipeline   │ ──▶ │   MP4 File   │
//! │   (RGB24)    │     │  - appsrc         │     │              │
//! │              │     │  - Encoder        │     │              │
//! │              │     │  - mp4mux         │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! - [`photo`]: JPEG encoding for stream parts and snapshots
//! - [`video`]: Recording sessions written through GStreamer

pub mod photo;
pub mod video;
