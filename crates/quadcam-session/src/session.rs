//! The session coordinator.

use std::io::Read;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use quadcam_frame::{AssemblerConfig, ChannelOrder, FrameAssembler};
use quadcam_transport::Transport;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::discovery::{initialize, DiscoveryConfig};
use crate::error::{Result, SessionError};
use crate::link::DeviceLink;
use crate::mode::{ModeController, ModeTiming};
use crate::pipeline::{FramePipeline, FrameSink};
use crate::reader::{ReaderConfig, ReaderLoop, ReaderStats};
use crate::state::{SessionState, SessionStatus, StreamMode};
use crate::timing::pause;
use crate::writer::{spawn_input_reader, transmit};

/// Everything a [`Session`] needs to know up front.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub discovery: DiscoveryConfig,
    pub mode_timing: ModeTiming,
    pub reader: ReaderConfig,
    pub assembler: AssemblerConfig,
    pub channel_order: ChannelOrder,
    /// Main loop sleep when there is nothing to send.
    pub idle_tick: Duration,
    /// Bytes sent once after the first initialization to wake the board.
    pub wake_bytes: Vec<u8>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            mode_timing: ModeTiming::default(),
            reader: ReaderConfig::default(),
            assembler: AssemblerConfig::default(),
            channel_order: ChannelOrder::default(),
            idle_tick: Duration::from_millis(10),
            wake_bytes: b"\n".to_vec(),
        }
    }
}

/// Summary of a finished session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionReport {
    /// Successful (re)initializations.
    pub initializations: u64,
    pub bytes_sent: u64,
    pub write_failures: u64,
    /// FIFO mode the device was left in.
    pub stream_mode: StreamMode,
    pub reader: ReaderStats,
}

/// Coordinates discovery, the reader thread and operator input over one
/// device link.
#[derive(Debug)]
pub struct Session<T> {
    link: DeviceLink<T>,
    state: Arc<SessionState>,
    config: SessionConfig,
}

impl<T: Transport + 'static> Session<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            link: DeviceLink::new(transport),
            state: Arc::new(SessionState::new()),
            config,
        }
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    pub fn link(&self) -> &DeviceLink<T> {
        &self.link
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run until `cancel` fires.
    ///
    /// Operator bytes read from `input` are forwarded to the device; frames
    /// and console text go to `sink`. Transport faults never end the run:
    /// the device is reacquired and streaming resumes. Only cancellation, a
    /// discovery timeout or the death of the reader thread return.
    pub fn run<R>(
        &self,
        input: R,
        sink: Box<dyn FrameSink>,
        cancel: &CancellationToken,
    ) -> Result<SessionReport>
    where
        R: Read + Send + 'static,
    {
        let workers = cancel.child_token();

        let pipeline = FramePipeline::new(
            self.config.assembler.geometry,
            self.config.channel_order,
            sink,
        );
        let reader = ReaderLoop::new(
            self.link.clone(),
            Arc::clone(&self.state),
            FrameAssembler::with_config(self.config.assembler.clone()),
            pipeline,
            self.config.reader,
        );
        let reader_token = workers.clone();
        let reader = std::thread::Builder::new()
            .name("quadcam-reader".into())
            .spawn(move || reader.run(&reader_token))
            .map_err(|source| SessionError::Spawn {
                name: "reader",
                source,
            })?;

        let (tx, rx) = mpsc::channel();
        let input = match spawn_input_reader(input, tx, workers.clone()) {
            Ok(handle) => handle,
            Err(err) => {
                workers.cancel();
                let _ = reader.join();
                return Err(err);
            }
        };

        let mut report = SessionReport::default();
        let outcome = self.drive(&rx, &reader, &mut report, cancel);

        workers.cancel();
        let reader = reader.join();
        let input = if input.is_finished() {
            input.join()
        } else {
            debug!("leaving operator input thread blocked on read");
            Ok(())
        };

        if self.state.generation() > 0 {
            if let Err(err) = self.link.with(|t| t.close()) {
                warn!(error = %err, "device did not close cleanly");
            }
        }

        report.reader = reader.map_err(|_| SessionError::ThreadPanicked("reader"))?;
        input.map_err(|_| SessionError::ThreadPanicked("input"))?;
        report.stream_mode = self.state.stream_mode();
        info!(?report, "session finished");
        outcome.map(|()| report)
    }

    fn drive(
        &self,
        input: &Receiver<u8>,
        reader: &JoinHandle<ReaderStats>,
        report: &mut SessionReport,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut modes = ModeController::new(self.config.mode_timing);
        let mut pending = self.config.wake_bytes.clone();

        while !cancel.is_cancelled() {
            // The reader only returns on its own when it panicked.
            if reader.is_finished() && !cancel.is_cancelled() {
                error!("reader thread exited, stopping session");
                return Err(SessionError::ThreadPanicked("reader"));
            }

            if self.state.status() == SessionStatus::Panic {
                info!("reinitializing device after fault");
                self.state.request_init();
            }

            if self.state.status() == SessionStatus::NeedInit {
                match self.reacquire(&mut modes, cancel) {
                    Ok(serial) => {
                        self.state.set_stream_mode(modes.mode());
                        self.state.mark_ready(&serial);
                        report.initializations += 1;
                    }
                    Err(SessionError::Cancelled) => break,
                    Err(err) => return Err(err),
                }
            }

            pending.extend(input.try_iter());

            if pending.is_empty() || !self.state.is_ready() {
                if !pause(cancel, self.config.idle_tick) {
                    break;
                }
                continue;
            }

            match self.link.with(|t| transmit(t, &mut modes, &pending)) {
                Ok(n) => report.bytes_sent += n as u64,
                Err(err) => {
                    report.write_failures += 1;
                    warn!(error = %err, bytes = pending.len(), "failed to write data");
                }
            }
            self.state.set_stream_mode(modes.mode());
            pending.clear();
        }
        Ok(())
    }

    fn reacquire(&self, modes: &mut ModeController, cancel: &CancellationToken) -> Result<String> {
        let discovery = &self.config.discovery;
        let had_device = self.state.generation() > 0;
        self.link.with(|t| {
            if had_device {
                if let Err(err) = t.close() {
                    debug!(error = %err, "stale handle close failed");
                }
            }
            initialize(t, modes, discovery, cancel)
        })
    }
}
