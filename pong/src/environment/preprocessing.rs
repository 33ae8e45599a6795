use anyhow::Result;
use image::Luma;
use itertools::iproduct;
use ndarray::Array2;

use ql::prelude::QlError;

use crate::game::drawer::GrayFrame;

const NORMALIZATION_OFFSET: f32 = 115.0;
const NORMALIZATION_SCALE: f32 = 230.0;

/// Pixel value, which normalizes to exactly 0.0
pub const NEUTRAL_INTENSITY: u8 = 115;

/// Reduces both frame dimensions by `factor`; each output pixel is the maximum of its `factor`x`factor` block.
/// The factor must divide both dimensions (e.g. 1, 2, 4, 5, 8, 10, 16, 20, 32, 40, 80 or 160 for a 160x160 frame).
pub fn downsample_max(
    frame: &GrayFrame,
    factor: u32,
) -> Result<GrayFrame> {
    check_downsample_factor(frame.width(), frame.height(), factor)?;
    if factor == 1 {
        return Ok(frame.clone());
    }
    Ok(GrayFrame::from_fn(frame.width() / factor, frame.height() / factor, |x, y| {
        let max = iproduct!(0..factor, 0..factor)
            .map(|(dx, dy)| frame.get_pixel(x * factor + dx, y * factor + dy).0[0])
            .max()
            .unwrap_or(0);
        Luma([max])
    }))
}

pub fn check_downsample_factor(
    width: u32,
    height: u32,
    factor: u32,
) -> Result<()> {
    if factor == 0 || width % factor != 0 || height % factor != 0 {
        return Err(QlError(format!("downsample factor {} does not divide the frame size {}x{}", factor, width, height)).into());
    }
    Ok(())
}

/// `(p - 115) / 230`, shape `[y, x]`
pub fn normalize(frame: &GrayFrame) -> Array2<f32> {
    Array2::from_shape_fn((frame.height() as usize, frame.width() as usize), |(y, x)| {
        normalize_value(frame.get_pixel(x as u32, y as u32).0[0])
    })
}

pub fn normalize_value(p: u8) -> f32 { (p as f32 - NORMALIZATION_OFFSET) / NORMALIZATION_SCALE }
