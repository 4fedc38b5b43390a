//! Stitch the two camera tiles of a raw payload into one image.
//!
//! The payload stores tile 1 (rows `0..height`) followed by tile 2 (rows
//! `height..2*height`), each row `width / 2` pixels. Output row `y` is tile 1
//! row `y` followed by tile 2 row `y`. This mirrors how the board wires its
//! sensors and is not configurable.

use crate::error::{FrameError, Result};
use crate::geometry::FrameGeometry;

/// Collate a raw payload into a new unpacked RGB565 buffer.
pub fn collate(raw: &[u8], geometry: FrameGeometry) -> Result<Vec<u8>> {
    let mut out = vec![0u8; geometry.rgb565_len()];
    collate_into(raw, geometry, &mut out)?;
    Ok(out)
}

/// Collate a raw payload into a caller-provided RGB565 buffer.
pub fn collate_into(raw: &[u8], geometry: FrameGeometry, out: &mut [u8]) -> Result<()> {
    if raw.len() != geometry.raw_len() {
        return Err(FrameError::SizeMismatch {
            what: "raw payload",
            expected: geometry.raw_len(),
            actual: raw.len(),
        });
    }
    if out.len() != geometry.rgb565_len() {
        return Err(FrameError::SizeMismatch {
            what: "rgb565 buffer",
            expected: geometry.rgb565_len(),
            actual: out.len(),
        });
    }

    let tile_row = geometry.tile_width() * 2;
    let (first, second) = raw.split_at(tile_row * geometry.height());

    for ((dst, a), b) in out
        .chunks_exact_mut(tile_row * 2)
        .zip(first.chunks_exact(tile_row))
        .zip(second.chunks_exact(tile_row))
    {
        let (left, right) = dst.split_at_mut(tile_row);
        left.copy_from_slice(a);
        right.copy_from_slice(b);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_pair_tile_one_then_tile_two() {
        // 4x2 image: tiles are 2 pixels wide, 2 rows tall.
        let geometry = FrameGeometry::new(4, 2).unwrap();
        let raw: Vec<u8> = (0..16).collect();

        let out = collate(&raw, geometry).unwrap();

        // tile 1 rows: [0..4], [4..8]; tile 2 rows: [8..12], [12..16]
        assert_eq!(
            out,
            vec![0, 1, 2, 3, 8, 9, 10, 11, 4, 5, 6, 7, 12, 13, 14, 15]
        );
    }

    #[test]
    fn native_geometry_row_pairing() {
        let geometry = FrameGeometry::QUADCAM;
        let mut raw = vec![0u8; geometry.raw_len()];
        let tile_row = geometry.tile_width() * 2;
        // Tag first byte of every raw row with its row index modulo 256.
        for (row, chunk) in raw.chunks_exact_mut(tile_row).enumerate() {
            chunk[0] = (row % 256) as u8;
        }

        let out = collate(&raw, geometry).unwrap();
        let out_row = geometry.width() * 2;
        for y in [0usize, 1, 511, 1023] {
            let row = &out[y * out_row..(y + 1) * out_row];
            assert_eq!(row[0], (y % 256) as u8);
            assert_eq!(row[tile_row], ((y + geometry.height()) % 256) as u8);
        }
    }

    #[test]
    fn short_payload_is_rejected() {
        let geometry = FrameGeometry::new(4, 2).unwrap();
        let err = collate(&[0u8; 15], geometry).unwrap_err();
        assert!(matches!(
            err,
            FrameError::SizeMismatch {
                expected: 16,
                actual: 15,
                ..
            }
        ));
    }

    #[test]
    fn collation_is_repeatable() {
        let geometry = FrameGeometry::new(8, 4).unwrap();
        let raw: Vec<u8> = (0..geometry.raw_len()).map(|i| (i * 7) as u8).collect();
        assert_eq!(
            collate(&raw, geometry).unwrap(),
            collate(&raw, geometry).unwrap()
        );
    }
}
