use anyhow::{anyhow, Result};

use crate::frame::GrayFrame;

/// Pixel layouts a source may hand over before grayscale reduction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Gray8,
    Rgb24,
    /// Y plane followed by interleaved half-resolution UV.
    Nv12,
}

/// Reduce a decoded frame to 8-bit luma.
pub fn to_gray(pixels: &[u8], width: u32, height: u32, format: PixelFormat) -> Result<GrayFrame> {
    let plane = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    match format {
        PixelFormat::Gray8 => {
            expect_len(pixels, plane, "gray")?;
            GrayFrame::new(pixels.to_vec(), width, height)
        }
        PixelFormat::Rgb24 => {
            let expected = plane
                .checked_mul(3)
                .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))?;
            expect_len(pixels, expected, "RGB")?;
            let luma = pixels
                .chunks_exact(3)
                .map(|px| rgb_luma(px[0], px[1], px[2]))
                .collect();
            GrayFrame::new(luma, width, height)
        }
        PixelFormat::Nv12 => {
            let expected = plane
                .checked_add(plane / 2)
                .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
            expect_len(pixels, expected, "NV12")?;
            GrayFrame::new(pixels[..plane].to_vec(), width, height)
        }
    }
}

fn expect_len(pixels: &[u8], expected: usize, label: &str) -> Result<()> {
    if pixels.len() != expected {
        return Err(anyhow!(
            "{} frame length mismatch: expected {}, got {}",
            label,
            expected,
            pixels.len()
        ));
    }
    Ok(())
}

/// BT.601 luma.
fn rgb_luma(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299_f32 * r as f32 + 0.587_f32 * g as f32 + 0.114_f32 * b as f32;
    y.round().clamp(0.0, 255.0) as u8
}
