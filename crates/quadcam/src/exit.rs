use std::fmt;
use std::io;

use quadcam_frame::FrameError;
use quadcam_session::{SessionError, SinkError};
use quadcam_transport::TransportError;

// Exit code constants aligned with rsfulmen/DDR-0002 semantics.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::NotFound => USAGE,
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::SizeMismatch { .. } => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        FrameError::InvalidGeometry { .. } | FrameError::EmptyKey => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
    }
}

pub fn sink_error(context: &str, err: SinkError) -> CliError {
    match err {
        SinkError::Write { source, path } => {
            io_error(&format!("{context}: {}", path.display()), source)
        }
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    match err {
        SessionError::Transport(err) => transport_error(context, err),
        SessionError::Mode(_) | SessionError::WriteStalled { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        SessionError::DiscoveryTimeout { .. } => {
            CliError::new(TIMEOUT, format!("{context}: {err}"))
        }
        SessionError::Cancelled => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use quadcam_transport::DriverStatus;

    use super::*;

    #[test]
    fn size_mismatch_is_data_invalid() {
        let err = frame_error(
            "decode failed",
            FrameError::SizeMismatch {
                what: "raw payload",
                expected: 4,
                actual: 3,
            },
        );
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.starts_with("decode failed: "));
    }

    #[test]
    fn discovery_timeout_maps_to_timeout() {
        let err = session_error(
            "session failed",
            SessionError::DiscoveryTimeout {
                description: "QuadCam".into(),
                waited: Duration::from_secs(1),
            },
        );
        assert_eq!(err.code, TIMEOUT);
    }

    #[test]
    fn driver_failures_are_transport_errors() {
        let err = session_error(
            "session failed",
            SessionError::Transport(TransportError::driver("Read", DriverStatus::IoError)),
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
    }

    #[test]
    fn missing_input_is_usage() {
        let err = io_error("open", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.code, USAGE);
    }
}
