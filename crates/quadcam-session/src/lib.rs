//! Device session coordination for QuadCam.
//!
//! This is the "just runs" layer. A [`Session`] finds the capture board,
//! keeps it in the right FIFO mode, pulls frames off the wire on a reader
//! thread and forwards operator keystrokes on the main thread. Transport
//! faults trigger a full reinitialization instead of ending the session.

pub mod discovery;
pub mod error;
pub mod link;
pub mod mode;
pub mod pipeline;
pub mod reader;
pub mod session;
pub mod state;
pub mod timing;
pub mod writer;

pub use discovery::{initialize, wait_for_device, DiscoveryConfig, QUADCAM_DESCRIPTION};
pub use error::{ModeError, Result, SessionError, SinkError};
pub use link::DeviceLink;
pub use mode::{ModeController, ModeTiming};
pub use pipeline::{
    decode_frame, DecodedFrame, FramePipeline, FrameSink, NullSink, PipelineCounters,
};
pub use reader::{PollOutcome, ReaderConfig, ReaderLoop, ReaderStats};
pub use session::{Session, SessionConfig, SessionReport};
pub use state::{SessionState, SessionStatus, StreamMode};
pub use timing::pause;
pub use writer::{spawn_input_reader, transmit};

pub use tokio_util::sync::CancellationToken;
