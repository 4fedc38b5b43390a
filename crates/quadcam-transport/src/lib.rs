//! Vendor USB FIFO driver abstraction.
//!
//! The QuadCam board talks to the host through an FTDI-style FIFO bridge.
//! This crate defines the driver surface the rest of quadcam is written
//! against:
//! - [`Transport`]: enumerate, open by serial, receive, transmit, bit modes
//! - [`SimulatedTransport`]: an in-memory device for tests and replays
//!
//! This is the lowest layer of quadcam. Everything else builds on top of
//! the [`Transport`] trait provided here.

pub mod error;
pub mod sim;
pub mod traits;

pub use error::{DriverStatus, Result, TransportError};
pub use sim::{SimCall, SimOp, SimulatedTransport};
pub use traits::{BitMode, DeviceInfo, Transport};
