//! Frame markers and sensor geometry.
//!
//! A QuadCam payload carries two camera tiles, each `width / 2` pixels wide
//! and `height` rows tall, stacked one after the other. Pixels are RGB565,
//! two bytes each, little-endian.

use crate::error::{FrameError, Result};

/// Marker that opens a frame.
pub const FRAME_START_KEY: [u8; 8] = [0x89, 0xAB, 0xCD, 0xEF, 0x01, 0x23, 0x45, 0x67];

/// Marker that closes a frame.
pub const FRAME_END_KEY: [u8; 8] = [0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF];

/// Native output width of the stitched image.
pub const SENSOR_WIDTH: usize = 1280;

/// Native output height of the stitched image.
pub const SENSOR_HEIGHT: usize = 1024;

/// Dimensions of a stitched output image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameGeometry {
    width: usize,
    height: usize,
}

impl FrameGeometry {
    /// The capture board's native 1280x1024 layout.
    pub const QUADCAM: FrameGeometry = FrameGeometry {
        width: SENSOR_WIDTH,
        height: SENSOR_HEIGHT,
    };

    /// Create a geometry. Width must be even so it splits into two tiles.
    pub fn new(width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 || width % 2 != 0 {
            return Err(FrameError::InvalidGeometry { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixels in the stitched image.
    pub fn pixels(&self) -> usize {
        self.width * self.height
    }

    /// Width of one camera tile.
    pub fn tile_width(&self) -> usize {
        self.width / 2
    }

    /// Expected raw payload size between the frame markers.
    pub fn raw_len(&self) -> usize {
        self.tile_width() * 2 * self.height * 2
    }

    /// Size of the unpacked RGB565 buffer.
    pub fn rgb565_len(&self) -> usize {
        self.pixels() * 2
    }

    /// Size of the unpacked RGB888 buffer.
    pub fn rgb888_len(&self) -> usize {
        self.pixels() * 3
    }
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self::QUADCAM
    }
}
