// SPDX-License-Identifier: GPL-3.0-only

//! MP4 muxing
//!
//! The muxer is configured for non-streamable output so the index is written
//! at EOS and the file is seekable.

use gstreamer as gst;
use gstreamer::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Muxer configuration
pub struct MuxerConfig {
    /// Muxer element
    pub muxer: gst::Element,
    /// File sink element
    pub filesink: gst::Element,
    /// Output file path
    pub output_path: PathBuf,
}

/// Create an mp4mux and a filesink writing to `output_path`
pub fn create_muxer(output_path: &Path) -> Result<MuxerConfig, String> {
    let location = output_path
        .to_str()
        .ok_or_else(|| format!("Output path is not valid UTF-8: {}", output_path.display()))?;

    let muxer = gst::ElementFactory::make("mp4mux")
        .build()
        .map_err(|e| format!("Failed to create mp4mux: {}", e))?;

    if muxer.has_property("streamable") {
        muxer.set_property("streamable", false);
    }

    let filesink = gst::ElementFactory::make("filesink")
        .property("location", location)
        .build()
        .map_err(|e| format!("Failed to create filesink: {}", e))?;

    debug!(path = %output_path.display(), "Muxer and filesink created");

    Ok(MuxerConfig {
        muxer,
        filesink,
        output_path: output_path.to_path_buf(),
    })
}

/// Link muxer to filesink
pub fn link_muxer_to_sink(muxer: &gst::Element, filesink: &gst::Element) -> Result<(), String> {
    muxer
        .link(filesink)
        .map_err(|_| "Failed to link muxer to filesink".to_string())?;

    debug!("Muxer linked to filesink");
    Ok(())
}
