use bytes::Bytes;

use crate::error::{FrameError, Result};
use crate::geometry::{FRAME_END_KEY, FRAME_START_KEY};

/// An immutable marker byte sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicKey {
    bytes: Bytes,
}

impl MagicKey {
    /// Create a key from arbitrary bytes. Empty keys are rejected.
    pub fn new(bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(FrameError::EmptyKey);
        }
        Ok(Self { bytes })
    }

    /// The frame-start marker.
    pub fn frame_start() -> Self {
        Self {
            bytes: Bytes::from_static(&FRAME_START_KEY),
        }
    }

    /// The frame-end marker.
    pub fn frame_end() -> Self {
        Self {
            bytes: Bytes::from_static(&FRAME_END_KEY),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Restartable detector for one magic key in a byte stream.
///
/// The cursor survives across calls, so a key split over two reads is still
/// found. A mismatch drops all progress; the mismatching byte may itself
/// begin a new attempt.
#[derive(Debug, Clone)]
pub struct KeyMatcher {
    key: MagicKey,
    cursor: usize,
}

impl KeyMatcher {
    pub fn new(key: MagicKey) -> Self {
        Self { key, cursor: 0 }
    }

    /// Feed one byte. Returns true exactly on the byte that completes the key.
    pub fn feed(&mut self, byte: u8) -> bool {
        let key = self.key.as_bytes();
        if byte == key[self.cursor] {
            self.cursor += 1;
        } else {
            self.cursor = usize::from(byte == key[0]);
        }

        if self.cursor == key.len() {
            self.cursor = 0;
            return true;
        }
        false
    }

    /// Feed a slice, returning how many times the key completed.
    pub fn feed_slice(&mut self, bytes: &[u8]) -> usize {
        bytes.iter().filter(|&&b| self.feed(b)).count()
    }

    /// Drop any partial progress.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Number of key bytes matched so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn key(&self) -> &MagicKey {
        &self.key
    }
}
