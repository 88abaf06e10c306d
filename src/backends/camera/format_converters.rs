// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion for V4L2 capture buffers
//!
//! Every device buffer is converted into a packed RGB24 or Gray8 raster so
//! the rest of the pipeline only deals with two layouts.

use super::types::PixelFormat;

/// Convert YUYV (YUV 4:2:2) to RGB24
///
/// YUYV format: Y0 U0 Y1 V0 - each 4-byte group encodes 2 pixels.
/// Uses BT.601 coefficients for YUV to RGB conversion.
pub fn yuyv_to_rgb24(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>, String> {
    let pixel_count = width as usize * height as usize;
    let expected = pixel_count * 2;
    if data.len() < expected {
        return Err(format!(
            "YUYV buffer too short: {} bytes, expected {}",
            data.len(),
            expected
        ));
    }

    let mut rgb = Vec::with_capacity(pixel_count * 3);

    for chunk in data[..expected].chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;

        for y in [y0, y1] {
            rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }

    // Odd widths leave half a macropixel unused
    rgb.truncate(pixel_count * 3);
    Ok(rgb)
}

/// Decode an MJPG buffer to RGB24
///
/// Returns the decoded dimensions, which may differ from the negotiated
/// format on misbehaving devices.
pub fn mjpeg_to_rgb24(data: &[u8]) -> Result<(Vec<u8>, u32, u32), String> {
    let image = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .map_err(|e| format!("MJPG decode failed: {}", e))?
        .to_rgb8();
    let (width, height) = image.dimensions();
    Ok((image.into_raw(), width, height))
}

/// Copy a packed buffer, dropping per-row padding
pub fn strip_padding(
    data: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
    bytes_per_line: usize,
) -> Result<Vec<u8>, String> {
    let row = width as usize * format.bytes_per_pixel();
    let stride = bytes_per_line.max(row);
    let needed = stride * (height as usize).saturating_sub(1) + row;
    if height == 0 || data.len() < needed {
        return Err(format!(
            "Buffer too short: {} bytes for {} rows of {}",
            data.len(),
            height,
            row
        ));
    }

    if stride == row {
        return Ok(data[..row * height as usize].to_vec());
    }

    let mut out = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        out.extend_from_slice(&data[y * stride..y * stride + row]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_gray_maps_to_gray() {
        // Neutral chroma: Y passes straight through to all channels
        let data = [100u8, 128, 200, 128];
        let rgb = yuyv_to_rgb24(&data, 2, 1).unwrap();
        assert_eq!(rgb, vec![100, 100, 100, 200, 200, 200]);
    }

    #[test]
    fn test_yuyv_short_buffer() {
        assert!(yuyv_to_rgb24(&[0u8; 6], 2, 2).is_err());
    }

    #[test]
    fn test_strip_padding() {
        // 2x2 gray with 4-byte stride
        let data = [1u8, 2, 0, 0, 3, 4, 0, 0];
        let out = strip_padding(&data, 2, 2, PixelFormat::Gray8, 4).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_mjpeg_roundtrip_dimensions() {
        let img = image::RgbImage::from_pixel(8, 4, image::Rgb([10, 20, 30]));
        let mut jpeg = Vec::new();
        image::codecs::jpeg::JpegEncoder::new(&mut jpeg)
            .encode_image(&img)
            .unwrap();

        let (rgb, width, height) = mjpeg_to_rgb24(&jpeg).unwrap();
        assert_eq!((width, height), (8, 4));
        assert_eq!(rgb.len(), 8 * 4 * 3);
    }
}
