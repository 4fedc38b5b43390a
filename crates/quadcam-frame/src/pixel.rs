//! Pixel format conversions.
//!
//! Formats:
//! - unpacked RGB565: flat bytes, 2 per pixel, little-endian
//! - packed RGB565: grid, one `u16` per pixel
//! - packed RGB888: grid, one `u32` per pixel (`0x00RRGGBB`)
//! - unpacked RGB888: flat bytes, 3 per pixel
//!
//! Component expansion is a plain left shift. No rounding or dithering, so
//! output is bit-exact with the board's desktop tooling.

use crate::error::{FrameError, Result};
use crate::geometry::FrameGeometry;

/// A row-major grid of packed pixels addressed by `(row, col)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedGrid<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Copy + Default> PackedGrid<T> {
    /// A grid filled with `T::default()`.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![T::default(); width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, row: usize, col: usize) -> T {
        self.data[row * self.width + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: T) {
        self.data[row * self.width + col] = value;
    }

    pub fn row(&self, row: usize) -> &[T] {
        &self.data[row * self.width..(row + 1) * self.width]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [T] {
        &mut self.data[row * self.width..(row + 1) * self.width]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
}

/// Byte order of unpacked 24-bit pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelOrder {
    /// Highest component (red) first.
    #[default]
    Rgb,
    /// Lowest component (blue) first, as bitmap files store it.
    Bgr,
}

/// Expand one RGB565 pixel to `0x00RRGGBB`.
pub fn rgb565_to_rgb888(pixel: u16) -> u32 {
    let pixel = u32::from(pixel);
    let r = ((pixel >> 11) & 0x1F) << 3;
    let g = ((pixel >> 5) & 0x3F) << 2;
    let b = (pixel & 0x1F) << 3;
    (r << 16) | (g << 8) | b
}

/// Reinterpret unpacked RGB565 bytes as a packed grid.
pub fn unpack16_to_pack16(unpacked: &[u8], geometry: FrameGeometry) -> Result<PackedGrid<u16>> {
    if unpacked.len() != geometry.rgb565_len() {
        return Err(FrameError::SizeMismatch {
            what: "rgb565 buffer",
            expected: geometry.rgb565_len(),
            actual: unpacked.len(),
        });
    }

    let data = unpacked
        .chunks_exact(2)
        .map(|px| u16::from_le_bytes([px[0], px[1]]))
        .collect();
    Ok(PackedGrid {
        width: geometry.width(),
        height: geometry.height(),
        data,
    })
}

/// Expand a packed RGB565 grid to RGB888, flipping it vertically.
///
/// The sensors scan bottom-up, so input row `y` lands on output row
/// `height - 1 - y`.
pub fn pack16_to_pack24(grid: &PackedGrid<u16>) -> PackedGrid<u32> {
    let mut out = PackedGrid::new(grid.width, grid.height);
    for y in 0..grid.height {
        let flipped = grid.height - 1 - y;
        for (dst, &src) in out.row_mut(flipped).iter_mut().zip(grid.row(y)) {
            *dst = rgb565_to_rgb888(src);
        }
    }
    out
}

/// Flatten a packed RGB888 grid into 3 bytes per pixel.
pub fn pack24_to_unpack24(grid: &PackedGrid<u32>, order: ChannelOrder) -> Vec<u8> {
    let mut out = Vec::with_capacity(grid.data.len() * 3);
    for &px in &grid.data {
        let [_, r, g, b] = px.to_be_bytes();
        match order {
            ChannelOrder::Rgb => out.extend_from_slice(&[r, g, b]),
            ChannelOrder::Bgr => out.extend_from_slice(&[b, g, r]),
        }
    }
    out
}

/// Convert unpacked RGB565 straight to unpacked RGB888 (with the flip).
pub fn unpack16_to_unpack24(
    unpacked: &[u8],
    geometry: FrameGeometry,
    order: ChannelOrder,
) -> Result<Vec<u8>> {
    let packed = unpack16_to_pack16(unpacked, geometry)?;
    Ok(pack24_to_unpack24(&pack16_to_pack24(&packed), order))
}
