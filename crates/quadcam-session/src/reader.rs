//! Receive loop: pull bytes from the link and recover frames.

use std::sync::Arc;
use std::time::Duration;

use quadcam_frame::{AssemblerEvent, DiscardReason, FrameAssembler};
use quadcam_transport::Transport;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::link::DeviceLink;
use crate::pipeline::FramePipeline;
use crate::state::SessionState;
use crate::timing::pause;

/// Reader loop tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Largest single read from the driver.
    pub read_chunk: usize,
    /// Sleep when no bytes are waiting.
    pub idle_poll: Duration,
    /// Sleep while the session is not ready.
    pub panic_backoff: Duration,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            read_chunk: 4096,
            idle_poll: Duration::from_millis(10),
            panic_backoff: Duration::from_secs(1),
        }
    }
}

/// Result of a single poll of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The session is not ready; nothing was attempted.
    NotReady,
    /// The driver had no bytes waiting, or a read returned none.
    Idle,
    /// This many bytes were read and processed.
    Received(usize),
    /// A driver call failed and the session was flagged for reinit.
    Fault,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub bytes_read: u64,
    pub frames_completed: u64,
    pub frames_discarded: u64,
    pub faults: u64,
}

/// Owns the assembler and drives it from the shared link.
#[derive(Debug)]
pub struct ReaderLoop<T> {
    link: DeviceLink<T>,
    state: Arc<SessionState>,
    assembler: FrameAssembler,
    pipeline: FramePipeline,
    config: ReaderConfig,
    buf: Vec<u8>,
    stats: ReaderStats,
}

impl<T: Transport> ReaderLoop<T> {
    pub fn new(
        link: DeviceLink<T>,
        state: Arc<SessionState>,
        assembler: FrameAssembler,
        pipeline: FramePipeline,
        config: ReaderConfig,
    ) -> Self {
        Self {
            buf: vec![0u8; config.read_chunk.max(1)],
            link,
            state,
            assembler,
            pipeline,
            config,
            stats: ReaderStats::default(),
        }
    }

    /// Query the driver once and process whatever it returns.
    ///
    /// The link lock is held only for the driver calls, not while frames are
    /// decoded.
    pub fn poll_once(&mut self) -> PollOutcome {
        if !self.state.is_ready() {
            return PollOutcome::NotReady;
        }

        let read = {
            let mut transport = self.link.lock();
            let available = match transport.rx_bytes_available() {
                Ok(n) => n,
                Err(err) => {
                    drop(transport);
                    warn!(error = %err, "failed to get number of bytes available to read");
                    return self.fault();
                }
            };
            if available == 0 {
                return PollOutcome::Idle;
            }
            let want = available.min(self.buf.len());
            match transport.read(&mut self.buf[..want]) {
                Ok(n) => n,
                Err(err) => {
                    drop(transport);
                    warn!(error = %err, "failed to read data");
                    return self.fault();
                }
            }
        };

        if read == 0 {
            // Read timed out despite the driver reporting data.
            debug!("read returned no bytes");
            return PollOutcome::Idle;
        }

        self.stats.bytes_read += read as u64;
        let events = self.assembler.push(&self.buf[..read]);
        for event in events {
            self.dispatch(event);
        }
        PollOutcome::Received(read)
    }

    /// Poll until `cancel` fires.
    pub fn run(mut self, cancel: &CancellationToken) -> ReaderStats {
        debug!("reader started");
        while !cancel.is_cancelled() {
            let slept = match self.poll_once() {
                PollOutcome::Received(_) => true,
                PollOutcome::Idle => pause(cancel, self.config.idle_poll),
                PollOutcome::NotReady | PollOutcome::Fault => {
                    pause(cancel, self.config.panic_backoff)
                }
            };
            if !slept {
                break;
            }
        }
        debug!(stats = ?self.stats, "reader stopped");
        self.stats
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    pub fn assembler(&self) -> &FrameAssembler {
        &self.assembler
    }

    pub fn pipeline(&self) -> &FramePipeline {
        &self.pipeline
    }

    fn fault(&mut self) -> PollOutcome {
        self.stats.faults += 1;
        if self.state.raise_panic() {
            warn!("transport fault, requesting reinitialization");
        }
        // Bytes after a fault may belong to a different frame.
        self.assembler.reset();
        PollOutcome::Fault
    }

    fn dispatch(&mut self, event: AssemblerEvent) {
        match event {
            AssemblerEvent::Text(text) => self.pipeline.forward_text(&text),
            AssemblerEvent::FrameStarted { sequence } => {
                info!(sequence, "frame start");
            }
            AssemblerEvent::FrameCompleted(frame) => {
                self.stats.frames_completed += 1;
                self.pipeline.handle(&frame);
            }
            AssemblerEvent::FrameDiscarded { reason, dropped } => {
                if reason != DiscardReason::UnmatchedEnd {
                    self.stats.frames_discarded += 1;
                }
                debug!(?reason, dropped, "frame discarded");
            }
        }
    }
}
