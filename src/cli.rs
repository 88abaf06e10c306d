// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! - Running the stream server
//! - Listing available cameras
//! - Taking a photo
//! - Recording a video

use anyhow::{Context, bail};
use camstream::backends::camera::v4l2::{V4l2Opener, enumerate_devices};
use camstream::backends::camera::{CaptureDevice, DeviceOpener, DeviceState, Frame};
use camstream::config::ServerConfig;
use camstream::control::{CaptureController, CaptureEngine, RecordingOutcome};
use camstream::pipelines::photo::{FrameEncoder, save_snapshot};
use camstream::pipelines::video::GstSinkFactory;
use camstream::stream;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// Frames discarded before a CLI photo so exposure can settle
const WARMUP: Duration = Duration::from_millis(500);

/// Run the stream server until Ctrl+C or SIGTERM
pub fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(config.bind_address)
            .await
            .with_context(|| format!("Failed to bind {}", config.bind_address))?;

        let engine = tokio::task::spawn_blocking(move || {
            CaptureEngine::start(config, Arc::new(V4l2Opener), Arc::new(GstSinkFactory))
        })
        .await??;
        let engine = Arc::new(engine);

        println!(
            "Streaming on http://{}/video_feed (press Ctrl+C to stop)",
            listener.local_addr()?
        );

        let shutdown = stream::shutdown_signal().context("Failed to install signal handlers")?;
        stream::serve(listener, Arc::clone(&engine), shutdown)
            .await
            .context("Server error")?;

        tokio::task::spawn_blocking(move || engine.shutdown()).await?;
        info!("Server stopped");
        Ok::<(), anyhow::Error>(())
    })
}

/// List all available cameras
pub fn list_cameras() -> anyhow::Result<()> {
    let devices = enumerate_devices();

    if devices.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for device in &devices {
        println!("  [{}] {}", device.index, device.card);
        println!("      Driver: {}  Path: {}", device.driver, device.path);
    }
    println!();

    Ok(())
}

/// Take a photo using the specified camera
pub fn take_photo(camera_index: u32, output: Option<PathBuf>) -> anyhow::Result<()> {
    let output_dir = output.unwrap_or_else(|| PathBuf::from("."));

    let mut device = V4l2Opener.open(camera_index)?;
    println!("Using camera {} ({})", camera_index, device.frame_size());

    // Let auto exposure settle before keeping a frame
    println!("Capturing...");
    let start = Instant::now();
    let mut frame: Frame = device.read_frame()?;
    while start.elapsed() < WARMUP {
        frame = device.read_frame()?;
    }
    device.release();

    let path = save_snapshot(&frame, &output_dir, &FrameEncoder::default())?;
    println!("Photo saved: {}", path.display());
    Ok(())
}

/// Record a video using the specified camera
pub fn record_video(
    camera_index: u32,
    duration: u64,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let output_dir = output.unwrap_or_else(|| PathBuf::from("."));
    let controller = CaptureController::new(
        Arc::new(V4l2Opener),
        Arc::new(GstSinkFactory),
        FrameEncoder::default(),
        output_dir,
    );

    let switched = controller.switch_device(camera_index)?;
    println!("{}", switched);

    let path = match controller.toggle_recording()? {
        RecordingOutcome::Started { path } => path,
        RecordingOutcome::Stopped { .. } => bail!("Recording was already active"),
    };
    println!("Output: {}", path.display());
    println!("Duration: {} seconds", duration);

    // Ctrl+C and SIGTERM both stop the recording cleanly
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = Arc::clone(&stop_flag);
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    println!();
    println!("Recording... (press Ctrl+C to stop early)");

    let start = Instant::now();
    let target_duration = Duration::from_secs(duration);
    let mut last_second = u64::MAX;

    while start.elapsed() < target_duration {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            break;
        }

        controller.capture_tick(Duration::from_millis(100));
        if !controller.is_recording() {
            println!();
            let status = controller.status();
            controller.shutdown();
            let reason = match status.device {
                DeviceState::Failed(reason) => format!("camera lost: {}", reason),
                _ => status.last_fault.unwrap_or_else(|| "unknown error".into()),
            };
            bail!("Recording stopped early ({})", reason);
        }

        let elapsed = start.elapsed().as_secs();
        if elapsed != last_second {
            last_second = elapsed;
            print!("\rRecording: {:02}:{:02}", elapsed / 60, elapsed % 60);
            std::io::Write::flush(&mut std::io::stdout())?;
        }
    }
    println!();

    let outcome = controller.toggle_recording()?;
    println!("{} {}", outcome, outcome.path().display());
    controller.shutdown();

    Ok(())
}
