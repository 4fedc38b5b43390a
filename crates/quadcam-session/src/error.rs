use std::path::PathBuf;
use std::time::Duration;

use quadcam_transport::TransportError;

/// A device mode transition that did not complete.
#[derive(Debug, thiserror::Error)]
pub enum ModeError {
    /// The bit-mode reset back to async FIFO failed.
    #[error("failed to reset device to async FIFO mode: {0}")]
    Reset(#[source] TransportError),

    /// The reset succeeded but the switch to sync FIFO failed.
    #[error("failed to initialize sync FIFO mode: {0}")]
    SyncSwitch(#[source] TransportError),
}

/// Errors reported by frame sinks.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Writing a frame artifact failed.
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An external program could not be started.
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: PathBuf,
        source: std::io::Error,
    },

    /// The frame-ready notification could not be sent.
    #[error("notification failed: {0}")]
    Notify(#[source] std::io::Error),
}

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Mode transition error.
    #[error("mode error: {0}")]
    Mode(#[from] ModeError),

    /// No matching device appeared before the discovery deadline.
    #[error("no {description} device found within {waited:?}")]
    DiscoveryTimeout {
        description: String,
        waited: Duration,
    },

    /// The driver kept accepting zero bytes.
    #[error("write stalled after {written} of {total} bytes")]
    WriteStalled { written: usize, total: usize },

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// A worker thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },

    /// A worker thread panicked.
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

pub type Result<T> = std::result::Result<T, SessionError>;
