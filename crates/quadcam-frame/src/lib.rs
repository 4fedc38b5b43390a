//! Marker-delimited frame recovery and pixel reassembly.
//!
//! The capture board streams images over a plain byte pipe with no length
//! prefix. Each image is bracketed by two 8-byte magic markers:
//! - start: `89 AB CD EF 01 23 45 67`
//! - end:   `01 23 45 67 89 AB CD EF`
//!
//! [`FrameAssembler`] recovers payloads byte by byte, [`collate`] stitches the
//! two camera tiles of a payload into one RGB565 image and [`pixel`] expands
//! it to 24-bit color.

pub mod assembler;
#[cfg(feature = "async")]
pub mod codec;
pub mod collate;
pub mod error;
pub mod geometry;
pub mod matcher;
pub mod pixel;

pub use assembler::{
    AssemblerConfig, AssemblerEvent, AssemblerState, AssemblerStats, DiscardReason,
    FrameAssembler, RawFrame,
};
#[cfg(feature = "async")]
pub use codec::MarkerCodec;
pub use collate::{collate, collate_into};
pub use error::{FrameError, Result};
pub use geometry::{FrameGeometry, FRAME_END_KEY, FRAME_START_KEY, SENSOR_HEIGHT, SENSOR_WIDTH};
pub use matcher::{KeyMatcher, MagicKey};
pub use pixel::{
    pack16_to_pack24, pack24_to_unpack24, rgb565_to_rgb888, unpack16_to_pack16,
    unpack16_to_unpack24, ChannelOrder, PackedGrid,
};
