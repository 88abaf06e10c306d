// SPDX-License-Identifier: GPL-3.0-only

//! Encoder selection for the recording pipeline
//!
//! MPEG-4 Part 2 (the classic "mp4v" fourcc) is preferred to match what
//! players expect from a plain `.mp4` webcam recording; H.264 encoders are
//! software fallbacks when libav is not installed.

use gstreamer as gst;
use gstreamer::prelude::*;
use tracing::{debug, info};

/// Video codecs the recorder can produce, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// MPEG-4 Part 2 via libav
    Mpeg4,
    /// H.264 via x264
    H264X264,
    /// H.264 via OpenH264
    H264OpenH264,
}

impl VideoCodec {
    pub const PRIORITY: [VideoCodec; 3] = [
        VideoCodec::Mpeg4,
        VideoCodec::H264X264,
        VideoCodec::H264OpenH264,
    ];

    /// GStreamer encoder element name
    pub fn encoder_name(&self) -> &'static str {
        match self {
            VideoCodec::Mpeg4 => "avenc_mpeg4",
            VideoCodec::H264X264 => "x264enc",
            VideoCodec::H264OpenH264 => "openh264enc",
        }
    }

    /// Parser element placed between encoder and muxer
    pub fn parser_name(&self) -> &'static str {
        match self {
            VideoCodec::Mpeg4 => "mpeg4videoparse",
            VideoCodec::H264X264 | VideoCodec::H264OpenH264 => "h264parse",
        }
    }

    /// Bitrate property value for a given resolution, in the unit the
    /// element expects (bits/s for libav, kbit/s for x264, bits/s for OpenH264)
    pub fn bitrate_property(&self, width: u32, height: u32) -> String {
        let kbps = bitrate_kbps(width, height);
        match self {
            VideoCodec::Mpeg4 | VideoCodec::H264OpenH264 => (kbps * 1000).to_string(),
            VideoCodec::H264X264 => kbps.to_string(),
        }
    }
}

/// Target bitrate in kbps, scaled with the pixel count
pub fn bitrate_kbps(width: u32, height: u32) -> u32 {
    match width as u64 * height as u64 {
        0..=307_200 => 2_000,        // up to 640x480
        307_201..=921_600 => 5_000,  // up to 1280x720
        921_601..=2_073_600 => 8_000, // up to 1920x1080
        _ => 16_000,
    }
}

/// A created encoder element with its parser
pub struct SelectedEncoder {
    pub codec: VideoCodec,
    pub encoder: gst::Element,
    pub parser: Option<gst::Element>,
}

/// Create the first available encoder
pub fn select_encoder(width: u32, height: u32) -> Result<SelectedEncoder, String> {
    for codec in VideoCodec::PRIORITY {
        let Ok(encoder) = gst::ElementFactory::make(codec.encoder_name()).build() else {
            debug!(encoder = codec.encoder_name(), "Encoder not available");
            continue;
        };

        encoder.set_property_from_str("bitrate", &codec.bitrate_property(width, height));

        // A missing parser is tolerated; the muxer can usually negotiate directly
        let parser = gst::ElementFactory::make(codec.parser_name()).build().ok();

        info!(
            encoder = codec.encoder_name(),
            parser = parser.is_some(),
            width,
            height,
            "Selected video encoder"
        );
        return Ok(SelectedEncoder {
            codec,
            encoder,
            parser,
        });
    }

    Err(format!(
        "No video encoder available (tried {})",
        VideoCodec::PRIORITY
            .iter()
            .map(|c| c.encoder_name())
            .collect::<Vec<_>>()
            .join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitrate_scales_with_resolution() {
        assert!(bitrate_kbps(640, 480) < bitrate_kbps(1280, 720));
        assert!(bitrate_kbps(1280, 720) < bitrate_kbps(1920, 1080));
        assert!(bitrate_kbps(1920, 1080) < bitrate_kbps(3840, 2160));
    }

    #[test]
    fn test_bitrate_property_units() {
        assert_eq!(VideoCodec::Mpeg4.bitrate_property(640, 480), "2000000");
        assert_eq!(VideoCodec::H264X264.bitrate_property(640, 480), "2000");
    }
}
