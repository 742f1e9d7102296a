//! Pixel buffer handling between GPU read-back and the transmitted image.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

/// JPEG quality for transmitted frames (0.7 on a 0..1 scale).
pub const JPEG_QUALITY: u8 = 70;

pub const RGBA_BYTES_PER_PIXEL: usize = 4;

/// Reverses row order in place. GPU read-back is bottom-up; transmitted images are top-down.
pub fn flip_vertical(pixels: &mut [u8], width: u32, height: u32, bytes_per_pixel: usize) -> Result<()> {
    let row = width as usize * bytes_per_pixel;
    let expected = row * height as usize;
    if pixels.len() != expected {
        return Err(anyhow!(
            "pixel buffer is {} bytes, expected {} for {}x{}",
            pixels.len(),
            expected,
            width,
            height
        ));
    }
    let rows = height as usize;
    for top in 0..rows / 2 {
        let bottom = rows - 1 - top;
        let (upper, lower) = pixels.split_at_mut(bottom * row);
        upper[top * row..(top + 1) * row].swap_with_slice(&mut lower[..row]);
    }
    Ok(())
}

/// Drops the alpha channel of an RGBA8 buffer.
pub fn rgba_to_rgb(rgba: &[u8]) -> Vec<u8> {
    rgba.chunks_exact(RGBA_BYTES_PER_PIXEL)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect()
}

/// Encodes a top-down RGBA8 buffer as JPEG. An empty image yields zero bytes.
pub fn encode_jpeg(rgba: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>> {
    if width == 0 || height == 0 || rgba.is_empty() {
        return Ok(Vec::new());
    }
    let rgb = rgba_to_rgb(rgba);
    let mut out = Vec::with_capacity(rgb.len() / 8);
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode(&rgb, width, height, ExtendedColorType::Rgb8)
        .context("encode jpeg")?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(width: u32, height: u32) -> Vec<u8> {
        (0..width * height * 4).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn flip_twice_is_identity() {
        for (w, h) in [(4, 3), (5, 4), (1, 1), (7, 2)] {
            let original = synthetic(w, h);
            let mut pixels = original.clone();
            flip_vertical(&mut pixels, w, h, RGBA_BYTES_PER_PIXEL).unwrap();
            if h > 1 {
                assert_ne!(pixels, original);
            }
            flip_vertical(&mut pixels, w, h, RGBA_BYTES_PER_PIXEL).unwrap();
            assert_eq!(pixels, original);
        }
    }

    #[test]
    fn flip_moves_bottom_row_to_top() {
        let mut pixels = vec![1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3];
        flip_vertical(&mut pixels, 1, 3, 4).unwrap();
        assert_eq!(pixels, vec![3, 3, 3, 3, 2, 2, 2, 2, 1, 1, 1, 1]);
    }

    #[test]
    fn flip_rejects_mismatched_length() {
        let mut pixels = vec![0u8; 10];
        assert!(flip_vertical(&mut pixels, 2, 2, 4).is_err());
    }

    #[test]
    fn encode_produces_decodable_jpeg() {
        let pixels = synthetic(16, 8);
        let jpeg = encode_jpeg(&pixels, 16, 8, JPEG_QUALITY).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn encode_empty_image_is_zero_bytes() {
        assert!(encode_jpeg(&[], 0, 0, JPEG_QUALITY).unwrap().is_empty());
    }
}
