// SPDX-License-Identifier: GPL-3.0-only

//! Fake cameras and video sinks shared by the integration tests

#![allow(dead_code)]

use camstream::backends::camera::{
    CaptureDevice, DeviceOpener, Frame, FrameSize, PixelFormat,
};
use camstream::errors::{CaptureError, CaptureResult};
use camstream::pipelines::video::{RecordingSpec, SinkFactory, VideoSink};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const FRAME_SIZE: FrameSize = FrameSize {
    width: 32,
    height: 24,
};

/// Shared bookkeeping for every camera a [`FakeOpener`] hands out
#[derive(Default)]
pub struct CameraLog {
    pub open_handles: AtomicUsize,
    pub max_open: AtomicUsize,
    pub events: Mutex<Vec<String>>,
    /// Make every read on the current device fail
    pub unplugged: AtomicBool,
    /// Size cameras report before any frame is read, if not [`FRAME_SIZE`]
    pub advertised_size: Mutex<Option<FrameSize>>,
}

impl CameraLog {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }
}

pub struct FakeOpener {
    pub log: Arc<CameraLog>,
    available: HashSet<u32>,
    frame_delay: Duration,
}

impl FakeOpener {
    /// Cameras with the given indices exist
    pub fn new(available: &[u32]) -> Arc<Self> {
        Self::with_delay(available, Duration::from_millis(2))
    }

    pub fn with_delay(available: &[u32], frame_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(CameraLog::default()),
            available: available.iter().copied().collect(),
            frame_delay,
        })
    }
}

impl DeviceOpener for FakeOpener {
    fn open(&self, index: u32) -> CaptureResult<Box<dyn CaptureDevice>> {
        if !self.available.contains(&index) {
            return Err(CaptureError::device(index, "No such device"));
        }

        let open = self.log.open_handles.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.max_open.fetch_max(open, Ordering::SeqCst);
        self.log.unplugged.store(false, Ordering::SeqCst);
        self.log.events.lock().unwrap().push(format!("open {}", index));

        Ok(Box::new(FakeCamera {
            index,
            sequence: 0,
            delay: self.frame_delay,
            log: Arc::clone(&self.log),
        }))
    }
}

pub struct FakeCamera {
    index: u32,
    sequence: u64,
    delay: Duration,
    log: Arc<CameraLog>,
}

impl CaptureDevice for FakeCamera {
    fn index(&self) -> u32 {
        self.index
    }

    fn frame_size(&self) -> FrameSize {
        self.log.advertised_size.lock().unwrap().unwrap_or(FRAME_SIZE)
    }

    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::RGB24
    }

    fn read_frame(&mut self) -> CaptureResult<Frame> {
        std::thread::sleep(self.delay);
        if self.log.unplugged.load(Ordering::SeqCst) {
            return Err(CaptureError::device(self.index, "device unplugged"));
        }

        self.sequence += 1;
        let shade = (self.index as u8).wrapping_mul(60).wrapping_add(self.sequence as u8);
        let data = vec![shade; (FRAME_SIZE.width * FRAME_SIZE.height * 3) as usize];
        Frame::new(
            FRAME_SIZE.width,
            FRAME_SIZE.height,
            PixelFormat::RGB24,
            data,
            self.sequence,
        )
        .map_err(|e| CaptureError::device(self.index, e))
    }
}

impl Drop for FakeCamera {
    fn drop(&mut self) {
        self.log.open_handles.fetch_sub(1, Ordering::SeqCst);
        self.log
            .events
            .lock()
            .unwrap()
            .push(format!("release {}", self.index));
    }
}

/// A recording the memory sink has closed
#[derive(Debug, Clone)]
pub struct FinishedRecording {
    pub path: PathBuf,
    pub spec: RecordingSpec,
    pub sequences: Vec<u64>,
}

#[derive(Default)]
pub struct SinkLog {
    pub open_writers: AtomicUsize,
    pub max_writers: AtomicUsize,
    pub created: Mutex<Vec<PathBuf>>,
    pub finished: Mutex<Vec<FinishedRecording>>,
    pub fail_writes: AtomicBool,
    /// Frames written to the currently open sink
    pub live_sequences: Mutex<Vec<u64>>,
}

impl SinkLog {
    pub fn finished(&self) -> Vec<FinishedRecording> {
        self.finished.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<PathBuf> {
        self.created.lock().unwrap().clone()
    }

    pub fn live_frames(&self) -> usize {
        self.live_sequences.lock().unwrap().len()
    }
}

pub struct MemorySinkFactory {
    pub log: Arc<SinkLog>,
}

impl MemorySinkFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(SinkLog::default()),
        })
    }
}

impl SinkFactory for MemorySinkFactory {
    fn create(&self, path: &Path, spec: &RecordingSpec) -> Result<Box<dyn VideoSink>, String> {
        let open = self.log.open_writers.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.max_writers.fetch_max(open, Ordering::SeqCst);
        self.log.created.lock().unwrap().push(path.to_path_buf());
        self.log.live_sequences.lock().unwrap().clear();

        Ok(Box::new(MemorySink {
            path: path.to_path_buf(),
            spec: *spec,
            log: Arc::clone(&self.log),
        }))
    }
}

pub struct MemorySink {
    path: PathBuf,
    spec: RecordingSpec,
    log: Arc<SinkLog>,
}

impl VideoSink for MemorySink {
    fn write_frame(&mut self, frame: &Frame, _pts: Duration) -> Result<(), String> {
        if self.log.fail_writes.load(Ordering::SeqCst) {
            return Err("disk full".into());
        }
        self.log.live_sequences.lock().unwrap().push(frame.sequence);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), String> {
        self.log.open_writers.fetch_sub(1, Ordering::SeqCst);
        let sequences = std::mem::take(&mut *self.log.live_sequences.lock().unwrap());
        self.log.finished.lock().unwrap().push(FinishedRecording {
            path: self.path.clone(),
            spec: self.spec,
            sequences,
        });
        Ok(())
    }
}

/// Fresh directory under the system temp dir
pub fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("camstream-{}-{}", name, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default();
    files.sort();
    files
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
