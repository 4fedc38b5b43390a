//! Host capture stack for the QuadCam four-sensor camera board.
//!
//! The board streams images from four sensors over a USB FIFO bridge,
//! interleaved with its text console. This crate recovers the images,
//! stitches and converts them, and keeps the link alive across faults.
//!
//! # Crate Structure
//!
//! - [`transport`]: driver abstraction and the simulated bridge
//! - [`frame`]: marker framing, tile collation and pixel conversion
//! - [`session`]: discovery, mode control and the reader/writer loops
//! - [`sink`]: frame persistence, rendering and notification

/// Re-export transport types.
pub mod transport {
    pub use quadcam_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use quadcam_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use quadcam_session::*;
}

pub mod sink;
