// SPDX-License-Identifier: GPL-3.0-only

//! Elapsed-time counter driven by an external tick
//!
//! The counter advances one second per tick while running. Start, stop and
//! reset return whether the tick source should be enabled; the caller owns
//! the tick source and must honor it.

use parking_lot::Mutex;
use serde::Serialize;

/// Whether the stopwatch accepts ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopwatchMode {
    #[default]
    Stopped,
    Running,
}

/// Snapshot of the stopwatch for status reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopwatchStatus {
    pub mode: StopwatchMode,
    pub elapsed_seconds: u64,
    pub display: String,
}

#[derive(Debug, Default)]
struct StopwatchState {
    mode: StopwatchMode,
    elapsed_seconds: u64,
}

/// Stopwatch with its own lock, independent of capture state
#[derive(Debug, Default)]
pub struct Stopwatch {
    state: Mutex<StopwatchState>,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume counting without resetting. Returns `true` (tick enabled).
    pub fn start(&self) -> bool {
        self.state.lock().mode = StopwatchMode::Running;
        true
    }

    /// Pause counting, keeping the counter. Returns `false` (tick disabled).
    pub fn stop(&self) -> bool {
        self.state.lock().mode = StopwatchMode::Stopped;
        false
    }

    /// Stop and zero the counter. Returns `false` (tick disabled).
    pub fn reset(&self) -> bool {
        let mut state = self.state.lock();
        state.mode = StopwatchMode::Stopped;
        state.elapsed_seconds = 0;
        false
    }

    /// Advance by one second if running and return the `MM:SS` display
    ///
    /// A tick that races with stop is ignored.
    pub fn tick(&self) -> String {
        let mut state = self.state.lock();
        if state.mode == StopwatchMode::Running {
            state.elapsed_seconds += 1;
        }
        format_elapsed(state.elapsed_seconds)
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.state.lock().elapsed_seconds
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().mode == StopwatchMode::Running
    }

    pub fn display(&self) -> String {
        format_elapsed(self.elapsed_seconds())
    }

    pub fn status(&self) -> StopwatchStatus {
        let state = self.state.lock();
        StopwatchStatus {
            mode: state.mode,
            elapsed_seconds: state.elapsed_seconds,
            display: format_elapsed(state.elapsed_seconds),
        }
    }
}

/// Format seconds as `MM:SS`; minutes keep growing past 99
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
