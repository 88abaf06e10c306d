// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 capture devices
//!
//! Opens `/dev/video<index>` through the `v4l` crate, negotiates a pixel
//! format we know how to convert and streams frames from memory-mapped
//! buffers.

use super::format_converters::{mjpeg_to_rgb24, strip_padding, yuyv_to_rgb24};
use super::types::{DeviceInfo, Frame, FrameSize, PixelFormat};
use super::{CaptureDevice, DeviceOpener};
use crate::constants::V4L2_BUFFER_COUNT;
use crate::errors::{CaptureError, CaptureResult};
use std::time::Duration;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

/// A frame that takes longer than this means the device stalled
const READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Consecutive undecodable buffers tolerated before the device is given up
const MAX_CORRUPT_FRAMES: u32 = 3;

/// Source layouts we can convert, in order of preference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    Yuyv,
    Mjpg,
    Rgb3,
    Grey,
}

impl SourceFormat {
    const PREFERENCE: [SourceFormat; 4] = [
        SourceFormat::Yuyv,
        SourceFormat::Mjpg,
        SourceFormat::Rgb3,
        SourceFormat::Grey,
    ];

    fn fourcc(&self) -> v4l::FourCC {
        match self {
            SourceFormat::Yuyv => v4l::FourCC::new(b"YUYV"),
            SourceFormat::Mjpg => v4l::FourCC::new(b"MJPG"),
            SourceFormat::Rgb3 => v4l::FourCC::new(b"RGB3"),
            SourceFormat::Grey => v4l::FourCC::new(b"GREY"),
        }
    }
}

/// Opens V4L2 devices by index
#[derive(Debug, Default, Clone, Copy)]
pub struct V4l2Opener;

impl DeviceOpener for V4l2Opener {
    fn open(&self, index: u32) -> CaptureResult<Box<dyn CaptureDevice>> {
        Ok(Box::new(V4l2Device::open(index)?))
    }
}

/// An open V4L2 capture device
pub struct V4l2Device {
    // Declared before `_device` so the stream is torn down first
    stream: MmapStream<'static>,
    _device: Device,
    index: u32,
    source: SourceFormat,
    size: FrameSize,
    bytes_per_line: usize,
    sequence: u64,
}

impl V4l2Device {
    /// Open `/dev/video<index>` and start streaming
    pub fn open(index: u32) -> CaptureResult<Self> {
        let device = Device::new(index as usize)
            .map_err(|e| CaptureError::device(index, format!("open failed: {}", e)))?;

        let (source, format) = negotiate_format(&device, index)?;

        let mut stream = MmapStream::with_buffers(&device, Type::VideoCapture, V4L2_BUFFER_COUNT)
            .map_err(|e| {
                CaptureError::device(index, format!("failed to create buffer stream: {}", e))
            })?;
        stream.set_timeout(READ_TIMEOUT);

        info!(
            index,
            width = format.width,
            height = format.height,
            fourcc = %format.fourcc,
            "V4L2 capture stream started"
        );

        Ok(Self {
            stream,
            _device: device,
            index,
            source,
            size: FrameSize {
                width: format.width,
                height: format.height,
            },
            bytes_per_line: format.stride as usize,
            sequence: 0,
        })
    }

    fn convert(&self, buf: &[u8]) -> Result<(Vec<u8>, FrameSize, PixelFormat), String> {
        let FrameSize { width, height } = self.size;
        match self.source {
            SourceFormat::Yuyv => {
                let packed = strip_padding(
                    buf,
                    width * 2,
                    height,
                    PixelFormat::Gray8,
                    self.bytes_per_line,
                )?;
                Ok((
                    yuyv_to_rgb24(&packed, width, height)?,
                    self.size,
                    PixelFormat::RGB24,
                ))
            }
            SourceFormat::Mjpg => {
                let (rgb, w, h) = mjpeg_to_rgb24(buf)?;
                Ok((
                    rgb,
                    FrameSize {
                        width: w,
                        height: h,
                    },
                    PixelFormat::RGB24,
                ))
            }
            SourceFormat::Rgb3 => Ok((
                strip_padding(buf, width, height, PixelFormat::RGB24, self.bytes_per_line)?,
                self.size,
                PixelFormat::RGB24,
            )),
            SourceFormat::Grey => Ok((
                strip_padding(buf, width, height, PixelFormat::Gray8, self.bytes_per_line)?,
                self.size,
                PixelFormat::Gray8,
            )),
        }
    }
}

impl CaptureDevice for V4l2Device {
    fn index(&self) -> u32 {
        self.index
    }

    fn frame_size(&self) -> FrameSize {
        self.size
    }

    fn pixel_format(&self) -> PixelFormat {
        match self.source {
            SourceFormat::Grey => PixelFormat::Gray8,
            _ => PixelFormat::RGB24,
        }
    }

    fn read_frame(&mut self) -> CaptureResult<Frame> {
        let index = self.index;
        let mut attempt = 0;

        let (data, size, format) = loop {
            let (buf, meta) = self
                .stream
                .next()
                .map_err(|e| CaptureError::device(index, format!("read failed: {}", e)))?;

            if buf.is_empty() {
                return Err(CaptureError::device(index, "device returned an empty buffer"));
            }
            let device_sequence = meta.sequence;

            // Copy out of the mmap buffer before it is handed back to the driver
            let owned = buf.to_vec();
            match self.convert(&owned) {
                Ok(converted) => break converted,
                // Webcams occasionally emit a truncated MJPG frame
                Err(e) if attempt < MAX_CORRUPT_FRAMES => {
                    warn!(index, device_sequence, error = %e, "Skipping corrupt frame");
                    attempt += 1;
                }
                Err(e) => return Err(CaptureError::device(index, e)),
            }
        };

        // MJPG payloads may decode to a size other than the negotiated one
        if size != self.size {
            debug!(index, negotiated = %self.size, decoded = %size, "Frame size differs from format");
            self.size = size;
        }

        self.sequence += 1;
        if self.sequence % 300 == 0 {
            debug!(index, sequence = self.sequence, "Frames captured");
        }

        Frame::new(size.width, size.height, format, data, self.sequence)
            .map_err(|e| CaptureError::device(index, e))
    }
}

impl Drop for V4l2Device {
    fn drop(&mut self) {
        info!(index = self.index, "Releasing V4L2 device");
    }
}

/// Pick the first preferred fourcc the device accepts at its current size
fn negotiate_format(device: &Device, index: u32) -> CaptureResult<(SourceFormat, v4l::Format)> {
    let current = device
        .format()
        .map_err(|e| CaptureError::device(index, format!("failed to get format: {}", e)))?;

    for source in SourceFormat::PREFERENCE {
        let mut wanted = current;
        wanted.fourcc = source.fourcc();

        match device.set_format(&wanted) {
            Ok(actual) if actual.fourcc == wanted.fourcc => {
                debug!(index, fourcc = %actual.fourcc, "Negotiated V4L2 format");
                return Ok((source, actual));
            }
            Ok(actual) => {
                debug!(index, wanted = %wanted.fourcc, got = %actual.fourcc, "Format not accepted");
            }
            Err(e) => {
                debug!(index, fourcc = %wanted.fourcc, error = %e, "Could not set format");
            }
        }
    }

    warn!(index, current = %current.fourcc, "No supported pixel format");
    Err(CaptureError::device(
        index,
        format!("unsupported pixel format {}", current.fourcc),
    ))
}

/// List V4L2 nodes that can capture video
pub fn enumerate_devices() -> Vec<DeviceInfo> {
    let mut devices: Vec<DeviceInfo> = v4l::context::enum_devices()
        .into_iter()
        .filter_map(|node| {
            let path = node.path().to_string_lossy().to_string();
            let device = Device::with_path(node.path()).ok()?;
            let caps = device.query_caps().ok()?;
            if !caps
                .capabilities
                .contains(v4l::capability::Flags::VIDEO_CAPTURE)
            {
                return None;
            }
            Some(DeviceInfo {
                index: node.index() as u32,
                card: caps.card,
                driver: caps.driver,
                path,
            })
        })
        .collect();

    devices.sort_by_key(|d| d.index);
    devices
}
