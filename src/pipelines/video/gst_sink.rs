// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer video sink for recordings
//!
//! ```text
//! appsrc → videoconvert → encoder → [parser] → mp4mux → filesink
//! ```
//!
//! Frames are pushed with explicit timestamps at the session's fixed rate.
//! Finishing sends EOS and waits for it to reach the sink so the muxer writes
//! its index. A session that never received a frame gets a single black frame
//! first, since the encoder only negotiates caps with the muxer once data
//! flows.

use super::encoder_selection::select_encoder;
use super::muxer::{create_muxer, link_muxer_to_sink};
use super::recorder::{RecordingSpec, SinkFactory, VideoSink};
use crate::backends::camera::types::Frame;
use crate::constants::RECORDING_FINALIZE_TIMEOUT;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSrc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Frames buffered inside appsrc before pushes block
const APPSRC_QUEUED_FRAMES: u64 = 8;

/// Creates [`GstVideoSink`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct GstSinkFactory;

impl SinkFactory for GstSinkFactory {
    fn create(&self, path: &Path, spec: &RecordingSpec) -> Result<Box<dyn VideoSink>, String> {
        Ok(Box::new(GstVideoSink::new(path, spec)?))
    }
}

/// MP4 writer backed by a GStreamer pipeline
pub struct GstVideoSink {
    pipeline: gst::Pipeline,
    appsrc: AppSrc,
    info: gstreamer_video::VideoInfo,
    frame_duration: gst::ClockTime,
    frames_pushed: u64,
    path: PathBuf,
}

impl GstVideoSink {
    /// Build the pipeline and set it to Playing
    pub fn new(path: &Path, spec: &RecordingSpec) -> Result<Self, String> {
        gst::init().map_err(|e| format!("Failed to initialize GStreamer: {}", e))?;

        let width = spec.size.width;
        let height = spec.size.height;

        let info = gstreamer_video::VideoInfo::builder(
            spec.format.to_gst_video_format(),
            width,
            height,
        )
        .fps(gst::Fraction::new(spec.fps as i32, 1))
        .build()
        .map_err(|e| format!("Invalid video info: {}", e))?;

        let caps = info
            .to_caps()
            .map_err(|e| format!("Failed to build caps: {}", e))?;

        let pipeline = gst::Pipeline::new();

        let appsrc = gst::ElementFactory::make("appsrc")
            .name("recorder_src")
            .build()
            .map_err(|e| format!("Failed to create appsrc: {}", e))?
            .downcast::<AppSrc>()
            .map_err(|_| "Failed to downcast to AppSrc".to_string())?;

        appsrc.set_caps(Some(&caps));
        appsrc.set_format(gst::Format::Time);
        appsrc.set_is_live(false);
        appsrc.set_do_timestamp(false);
        appsrc.set_block(true);
        appsrc.set_max_bytes(info.size() as u64 * APPSRC_QUEUED_FRAMES);

        let videoconvert = gst::ElementFactory::make("videoconvert")
            .build()
            .map_err(|e| format!("Failed to create videoconvert: {}", e))?;

        let selected = select_encoder(width, height)?;
        let muxer_config = create_muxer(path)?;

        let mut chain: Vec<&gst::Element> = vec![
            appsrc.upcast_ref(),
            &videoconvert,
            &selected.encoder,
        ];
        if let Some(ref parser) = selected.parser {
            chain.push(parser);
        }
        chain.push(&muxer_config.muxer);

        pipeline
            .add_many(chain.iter().copied())
            .map_err(|e| format!("Failed to add elements to pipeline: {}", e))?;
        pipeline
            .add(&muxer_config.filesink)
            .map_err(|e| format!("Failed to add filesink: {}", e))?;

        gst::Element::link_many(chain.iter().copied())
            .map_err(|e| format!("Failed to link recording chain: {}", e))?;
        link_muxer_to_sink(&muxer_config.muxer, &muxer_config.filesink)?;

        let sink = Self {
            pipeline,
            appsrc,
            info,
            frame_duration: gst::ClockTime::from_nseconds(spec.frame_duration().as_nanos() as u64),
            frames_pushed: 0,
            path: muxer_config.output_path,
        };
        sink.start()?;

        info!(
            path = %sink.path.display(),
            codec = ?selected.codec,
            width,
            height,
            fps = spec.fps,
            "Recording pipeline started"
        );
        Ok(sink)
    }

    fn start(&self) -> Result<(), String> {
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| format!("Failed to start recording pipeline: {}", e))?;

        // Check for immediate errors
        let bus = self.pipeline.bus().ok_or("No bus available")?;
        if let Some(msg) = bus.timed_pop_filtered(
            gst::ClockTime::from_mseconds(100),
            &[gst::MessageType::Error],
        ) && let gst::MessageView::Error(err) = msg.view()
        {
            error!(
                error = %err.error(),
                debug = ?err.debug(),
                source = ?err.src().map(|s| s.name()),
                "GStreamer error during start"
            );
            let _ = self.pipeline.set_state(gst::State::Null);
            return Err(format!("Recording start error: {}", err.error()));
        }

        Ok(())
    }

    /// Copy rows into GStreamer's stride when it differs from the packed layout
    fn make_buffer(&self, frame: &Frame) -> gst::Buffer {
        let gst_stride = self.info.stride()[0] as usize;
        let row = frame.stride();
        if gst_stride == row {
            return gst::Buffer::from_slice(std::sync::Arc::clone(&frame.data));
        }

        let mut padded = vec![0u8; gst_stride * frame.height as usize];
        for (dst, src) in padded
            .chunks_exact_mut(gst_stride)
            .zip(frame.data.chunks_exact(row))
        {
            dst[..row].copy_from_slice(src);
        }
        gst::Buffer::from_mut_slice(padded)
    }

    fn push(&mut self, mut buffer: gst::Buffer, pts: Duration) -> Result<(), String> {
        {
            let buffer = buffer
                .get_mut()
                .ok_or("Failed to get mutable buffer reference")?;
            buffer.set_pts(gst::ClockTime::from_nseconds(pts.as_nanos() as u64));
            buffer.set_duration(self.frame_duration);
        }

        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| format!("Failed to push frame: {:?}", e))?;
        self.frames_pushed += 1;
        Ok(())
    }
}

impl VideoSink for GstVideoSink {
    fn write_frame(&mut self, frame: &Frame, pts: Duration) -> Result<(), String> {
        let buffer = self.make_buffer(frame);
        self.push(buffer, pts)
    }

    fn finish(mut self: Box<Self>) -> Result<(), String> {
        if self.frames_pushed == 0 {
            debug!(path = %self.path.display(), "No frames recorded, writing one black frame");
            let black = gst::Buffer::from_mut_slice(vec![0u8; self.info.size()]);
            self.push(black, Duration::ZERO)?;
        }

        debug!(path = %self.path.display(), "Sending EOS to recording pipeline");

        if let Err(e) = self.appsrc.end_of_stream() {
            warn!(?e, "Failed to send EOS");
        }

        let bus = self.pipeline.bus().ok_or("No bus available")?;
        let result = match bus.timed_pop_filtered(
            gst::ClockTime::from_mseconds(RECORDING_FINALIZE_TIMEOUT.as_millis() as u64),
            &[gst::MessageType::Eos, gst::MessageType::Error],
        ) {
            Some(msg) => match msg.view() {
                gst::MessageView::Error(err) => {
                    Err(format!("Pipeline error while finalizing: {}", err.error()))
                }
                _ => Ok(()),
            },
            None => Err(format!(
                "Timed out after {:?} waiting for the muxer to finish",
                RECORDING_FINALIZE_TIMEOUT
            )),
        };

        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|e| format!("Failed to stop pipeline: {}", e))?;

        result
    }
}

impl Drop for GstVideoSink {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}
