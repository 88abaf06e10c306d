// SPDX-License-Identifier: GPL-3.0-only

//! Video recording pipeline
//!
//! A [`RecordingSession`] writes frames through a [`VideoSink`]. The
//! production sink is [`GstVideoSink`], which picks the first available
//! encoder and muxes into MP4.

pub mod encoder_selection;
pub mod gst_sink;
pub mod muxer;
pub mod recorder;

pub use gst_sink::{GstSinkFactory, GstVideoSink};
pub use recorder::{RecordingSession, RecordingSpec, SinkFactory, VideoSink};
