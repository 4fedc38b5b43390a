/// Errors that can occur while recovering or converting frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A magic key must contain at least one byte.
    #[error("magic key must not be empty")]
    EmptyKey,

    /// The frame geometry cannot be split into two camera tiles.
    #[error("invalid frame geometry {width}x{height} (width must be even, both non-zero)")]
    InvalidGeometry { width: usize, height: usize },

    /// A buffer does not match the size its geometry requires.
    #[error("{what} size mismatch ({actual} bytes, expected {expected})")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// An I/O error occurred while reading a stream.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
