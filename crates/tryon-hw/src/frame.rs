//! Raw V4L2 buffer decoding into RGB stills, plus dark-frame detection.

use image::{Rgb, RgbImage};

/// Pixels below this average channel value count as dark.
const DARK_PIXEL_LEVEL: u16 = 32;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("YUYV frames need an even width, got {0}")]
    OddWidth(u32),
}

/// Pixel layouts the capture path understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed, two pixels per `[Y0, U, Y1, V]`.
    Yuyv,
    /// 8-bit grayscale.
    Grey,
    /// 16-bit little-endian grayscale.
    Y16,
}

impl PixelFormat {
    pub fn from_fourcc(code: &[u8; 4]) -> Option<Self> {
        match code {
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"GREY" => Some(PixelFormat::Grey),
            b"Y16 " | b"Y16\0" => Some(PixelFormat::Y16),
            _ => None,
        }
    }

    /// Decode one raw buffer of this format.
    pub fn decode(self, buf: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
        match self {
            PixelFormat::Yuyv => yuyv_to_rgb(buf, width, height),
            PixelFormat::Grey => grey_to_rgb(buf, width, height),
            PixelFormat::Y16 => {
                let gray = y16_to_grey(buf, width, height)?;
                grey_to_rgb(&gray, width, height)
            }
        }
    }
}

/// Convert packed YUYV to RGB using BT.601 studio-range coefficients.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    if width % 2 != 0 {
        return Err(FrameError::OddWidth(width));
    }
    let expected = width as usize * height as usize * 2;
    check_len(yuyv, expected)?;

    let mut rgb = Vec::with_capacity(expected / 2 * 3);
    for quad in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        rgb.extend_from_slice(&bt601(y0, u, v));
        rgb.extend_from_slice(&bt601(y1, u, v));
    }
    Ok(from_raw(width, height, rgb))
}

/// Expand 8-bit grayscale to RGB by replicating the channel.
pub fn grey_to_rgb(gray: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = width as usize * height as usize;
    check_len(gray, expected)?;
    let rgb = gray[..expected].iter().flat_map(|&g| [g, g, g]).collect();
    Ok(from_raw(width, height, rgb))
}

/// Downscale 16-bit little-endian grayscale to 8 bits (high byte).
pub fn y16_to_grey(buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = width as usize * height as usize;
    check_len(buf, pixels * 2)?;
    Ok(buf[..pixels * 2].chunks_exact(2).map(|px| px[1]).collect())
}

/// True if more than `threshold_pct` of pixels are near-black.
///
/// Cameras emit a few black frames while auto-exposure settles.
pub fn is_dark_frame(image: &RgbImage, threshold_pct: f32) -> bool {
    let total = image.width() as usize * image.height() as usize;
    if total == 0 {
        return true;
    }
    let dark = image
        .pixels()
        .filter(|Rgb([r, g, b])| (*r as u16 + *g as u16 + *b as u16) / 3 < DARK_PIXEL_LEVEL)
        .count();
    (dark as f32 / total as f32) > threshold_pct
}

fn bt601(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(298 * c + 409 * e),
        clamp(298 * c - 100 * d - 208 * e),
        clamp(298 * c + 516 * d),
    ]
}

fn check_len(buf: &[u8], expected: usize) -> Result<(), FrameError> {
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn from_raw(width: u32, height: u32, rgb: Vec<u8>) -> RgbImage {
    // Lengths are checked by every caller.
    RgbImage::from_raw(width, height, rgb).unwrap_or_else(|| RgbImage::new(width, height))
}
