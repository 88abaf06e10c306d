// SPDX-License-Identifier: GPL-3.0-only

//! Runtime configuration
//!
//! Assembled from command line arguments at startup. Nothing is persisted
//! between runs.

use crate::constants::{DEFAULT_BIND_ADDRESS, DEFAULT_JPEG_QUALITY, DEFAULT_SUBSCRIBER_QUEUE};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP server listens on
    pub bind_address: SocketAddr,
    /// Camera index opened at startup (None starts without a device)
    pub initial_camera: Option<u32>,
    /// Directory snapshots and recordings are written to
    pub output_dir: PathBuf,
    /// JPEG quality for stream parts and snapshots
    pub jpeg_quality: u8,
    /// Encoded parts buffered per stream consumer before dropping
    pub subscriber_queue: usize,
}

impl ServerConfig {
    /// Clamp values that would otherwise make the engine misbehave
    pub fn normalized(mut self) -> Self {
        self.jpeg_quality = self.jpeg_quality.clamp(1, 100);
        self.subscriber_queue = self.subscriber_queue.max(1);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8050))),
            initial_camera: Some(0),
            output_dir: PathBuf::from("."),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            subscriber_queue: DEFAULT_SUBSCRIBER_QUEUE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_clamps() {
        let config = ServerConfig {
            jpeg_quality: 0,
            subscriber_queue: 0,
            ..ServerConfig::default()
        }
        .normalized();

        assert_eq!(config.jpeg_quality, 1);
        assert_eq!(config.subscriber_queue, 1);
    }
}
