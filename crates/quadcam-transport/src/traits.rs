use std::time::Duration;

use crate::error::Result;

/// Descriptor of an attached device as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Product description string burned into the bridge EEPROM.
    pub description: String,
    /// Serial number used to open the device.
    pub serial: String,
}

impl DeviceInfo {
    pub fn new(description: impl Into<String>, serial: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            serial: serial.into(),
        }
    }
}

/// Bit modes understood by the FIFO bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitMode {
    /// Return the bridge to its default (asynchronous FIFO) state.
    Reset,
    /// Synchronous 245 FIFO streaming.
    SyncFifo,
}

/// A vendor USB FIFO driver handle.
///
/// One value represents one driver handle: enumeration works before a
/// device is opened, every other call requires an open device. Handles are
/// not safe for interleaved use; callers serialize access (see
/// `quadcam_session::DeviceLink`).
pub trait Transport: Send {
    /// List attached devices.
    fn enumerate_devices(&mut self) -> Result<Vec<DeviceInfo>>;

    /// Open the device with the given serial number.
    fn open_by_serial(&mut self, serial: &str) -> Result<()>;

    /// Number of received bytes waiting in the driver queue.
    fn rx_bytes_available(&mut self) -> Result<usize>;

    /// Read up to `buf.len()` bytes, returning how many were read.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write bytes, returning how many the driver accepted.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Set the bridge bit mode with the given pin mask.
    fn set_bit_mode(&mut self, mask: u8, mode: BitMode) -> Result<()>;

    /// Set the receive latency timer in milliseconds.
    fn set_latency_timer(&mut self, ms: u8) -> Result<()>;

    /// Set blocking read and write timeouts.
    fn set_timeouts(&mut self, read: Duration, write: Duration) -> Result<()>;

    /// Close the device. Enumeration remains usable afterwards.
    fn close(&mut self) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn enumerate_devices(&mut self) -> Result<Vec<DeviceInfo>> {
        (**self).enumerate_devices()
    }

    fn open_by_serial(&mut self, serial: &str) -> Result<()> {
        (**self).open_by_serial(serial)
    }

    fn rx_bytes_available(&mut self) -> Result<usize> {
        (**self).rx_bytes_available()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).write(buf)
    }

    fn set_bit_mode(&mut self, mask: u8, mode: BitMode) -> Result<()> {
        (**self).set_bit_mode(mask, mode)
    }

    fn set_latency_timer(&mut self, ms: u8) -> Result<()> {
        (**self).set_latency_timer(ms)
    }

    fn set_timeouts(&mut self, read: Duration, write: Duration) -> Result<()> {
        (**self).set_timeouts(read, write)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}
