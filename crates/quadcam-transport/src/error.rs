use std::fmt;

/// Status reported by the vendor driver for a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverStatus {
    InvalidHandle,
    DeviceNotFound,
    DeviceNotOpened,
    IoError,
    InsufficientResources,
    InvalidParameter,
    NotSupported,
    /// Any other vendor status code.
    Other(u32),
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverStatus::InvalidHandle => f.write_str("FT_INVALID_HANDLE"),
            DriverStatus::DeviceNotFound => f.write_str("FT_DEVICE_NOT_FOUND"),
            DriverStatus::DeviceNotOpened => f.write_str("FT_DEVICE_NOT_OPENED"),
            DriverStatus::IoError => f.write_str("FT_IO_ERROR"),
            DriverStatus::InsufficientResources => f.write_str("FT_INSUFFICIENT_RESOURCES"),
            DriverStatus::InvalidParameter => f.write_str("FT_INVALID_PARAMETER"),
            DriverStatus::NotSupported => f.write_str("FT_NOT_SUPPORTED"),
            DriverStatus::Other(code) => write!(f, "FT_STATUS({code})"),
        }
    }
}

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A driver call returned a non-OK status.
    #[error("{op} failed (error {status})")]
    Driver {
        op: &'static str,
        status: DriverStatus,
    },

    /// The operation requires an open device.
    #[error("{op} requires an open device")]
    NotOpen { op: &'static str },

    /// An I/O error occurred below the driver.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Convenience constructor for a failed driver call.
    pub fn driver(op: &'static str, status: DriverStatus) -> Self {
        Self::Driver { op, status }
    }

    /// The driver status behind this error, if any.
    pub fn status(&self) -> Option<DriverStatus> {
        match self {
            TransportError::Driver { status, .. } => Some(*status),
            TransportError::NotOpen { .. } => Some(DriverStatus::DeviceNotOpened),
            TransportError::Io(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_names_operation_and_status() {
        let err = TransportError::driver("SetBitMode", DriverStatus::IoError);
        assert_eq!(err.to_string(), "SetBitMode failed (error FT_IO_ERROR)");
        assert_eq!(err.status(), Some(DriverStatus::IoError));
    }

    #[test]
    fn other_status_keeps_code() {
        assert_eq!(DriverStatus::Other(17).to_string(), "FT_STATUS(17)");
    }
}
