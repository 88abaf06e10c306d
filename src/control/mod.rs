// SPDX-License-Identifier: GPL-3.0-only

//! Command API shared by the HTTP routes and the command line
//!
//! - [`controller`]: device and recording state behind a single lock
//! - [`engine`]: capture worker lifecycle and stream fan-out
//! - [`stopwatch`]: elapsed-time counter with its own lock

pub mod controller;
pub mod engine;
pub mod stopwatch;

pub use controller::{
    CaptureController, CaptureStatus, RecordingOutcome, SnapshotOutcome, SwitchOutcome,
    status_text,
};
pub use engine::{CaptureEngine, EngineStatus};
pub use stopwatch::{Stopwatch, StopwatchStatus, format_elapsed};
