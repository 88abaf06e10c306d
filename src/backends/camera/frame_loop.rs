// SPDX-License-Identifier: GPL-3.0-only
//! Dedicated thread for the capture worker
//!
//! The worker body is a closure called once per step. It stops when the
//! closure returns [`LoopAction::Stop`] or when a stop is requested. A step
//! may block (a device read, an idle wait), so a stop request also runs an
//! optional waker that the owner uses to interrupt such a wait.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// What the worker should do after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    Stop,
}

type Waker = Box<dyn Fn() + Send + Sync>;

/// Handle to a running capture worker
///
/// ```ignore
/// let worker = CaptureLoopController::start("capture", move || {
///     if let Some(frame) = controller.capture_tick(IDLE_WAIT) {
///         hub.publish(encode(&frame));
///     }
///     LoopAction::Continue
/// })?
/// .with_waker(move || waker.wake());
///
/// worker.stop();
/// ```
pub struct CaptureLoopController {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    steps: Arc<AtomicU64>,
    waker: Option<Waker>,
    name: String,
}

impl CaptureLoopController {
    /// Spawn a named worker thread running `step` until stopped
    pub fn start<F>(name: &str, mut step: F) -> io::Result<Self>
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let steps = Arc::new(AtomicU64::new(0));

        let thread_handle = {
            let stop_signal = Arc::clone(&stop_signal);
            let steps = Arc::clone(&steps);
            let name = name.to_string();

            thread::Builder::new().name(name.clone()).spawn(move || {
                debug!(%name, "Worker thread started");

                while !stop_signal.load(Ordering::Acquire) {
                    let action = step();
                    steps.fetch_add(1, Ordering::Relaxed);
                    if action == LoopAction::Stop {
                        debug!(%name, "Worker finished on its own");
                        break;
                    }
                }

                debug!(%name, steps = steps.load(Ordering::Relaxed), "Worker thread exiting");
            })?
        };

        info!(name, "Capture worker started");
        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            steps,
            waker: None,
            name: name.to_string(),
        })
    }

    /// Run `waker` whenever a stop is requested
    pub fn with_waker(mut self, waker: impl Fn() + Send + Sync + 'static) -> Self {
        self.waker = Some(Box::new(waker));
        self
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Steps completed so far
    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::Relaxed)
    }

    /// Ask the worker to stop after the current step (non-blocking)
    pub fn request_stop(&self) {
        self.stop_signal.store(true, Ordering::Release);
        if let Some(waker) = &self.waker {
            waker();
        }
    }

    /// Request a stop and wait for the thread
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread without requesting a stop
    ///
    /// Returns `false` if the worker panicked.
    pub fn join(&mut self) -> bool {
        let Some(handle) = self.thread_handle.take() else {
            return true;
        };

        match handle.join() {
            Ok(()) => {
                info!(name = %self.name, steps = self.steps(), "Capture worker stopped");
                true
            }
            Err(panic) => {
                error!(name = %self.name, ?panic, "Capture worker panicked");
                false
            }
        }
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::{Condvar, Mutex};
    use std::time::Duration;

    #[test]
    fn test_worker_stops_itself() {
        let mut worker = CaptureLoopController::start("test-self-stop", {
            let mut remaining = 10;
            move || {
                remaining -= 1;
                if remaining == 0 {
                    LoopAction::Stop
                } else {
                    LoopAction::Continue
                }
            }
        })
        .unwrap();

        assert!(worker.join());
        assert_eq!(worker.steps(), 10);
        assert!(!worker.is_running());
    }

    #[test]
    fn test_stop_request() {
        let mut worker = CaptureLoopController::start("test-stop", || {
            thread::sleep(Duration::from_millis(1));
            LoopAction::Continue
        })
        .unwrap();

        thread::sleep(Duration::from_millis(20));
        assert!(worker.is_running());

        worker.stop();
        assert!(!worker.is_running());
        assert!(worker.steps() > 0);
    }

    #[test]
    fn test_waker_interrupts_blocking_step() {
        let gate = Arc::new((Mutex::new(false), Condvar::new()));

        let mut worker = CaptureLoopController::start("test-waker", {
            let gate = Arc::clone(&gate);
            move || {
                let (lock, cvar) = &*gate;
                let mut woken = lock.lock();
                if !*woken {
                    // Far longer than the test is allowed to take
                    cvar.wait_for(&mut woken, Duration::from_secs(60));
                }
                LoopAction::Continue
            }
        })
        .unwrap()
        .with_waker({
            let gate = Arc::clone(&gate);
            move || {
                let (lock, cvar) = &*gate;
                *lock.lock() = true;
                cvar.notify_all();
            }
        });

        thread::sleep(Duration::from_millis(20));
        let start = std::time::Instant::now();
        worker.stop();
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_panicking_worker_is_reported() {
        let mut worker =
            CaptureLoopController::start("test-panic", || panic!("boom")).unwrap();
        assert!(!worker.join());
    }
}
