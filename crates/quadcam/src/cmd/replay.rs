//! Play a recorded device stream through a complete session.
//!
//! The capture is loaded into a simulated bridge, so discovery, mode control,
//! the reader loop and every sink run exactly as they would against hardware.

use std::fs;
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use quadcam::sink::{CaptureSink, DiskSink, Notifier, RenderCommand};
use quadcam_frame::AssemblerConfig;
use quadcam_session::{
    CancellationToken, DecodedFrame, FrameSink, ReaderConfig, Session, SessionConfig, SinkError,
    QUADCAM_DESCRIPTION,
};
use quadcam_transport::SimulatedTransport;
use serde::Serialize;
use tracing::{debug, info};

use crate::cmd::ReplayArgs;
use crate::exit::{io_error, session_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{field_rows, print_report, OutputFormat, Report, COMMAND_LEGEND};

/// Serial reported by the simulated bridge.
const REPLAY_SERIAL: &str = "QCREPLAY";

/// Idle checks with an empty receive queue before the replay counts as drained.
const DRAIN_CHECKS: u32 = 5;
const DRAIN_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Serialize)]
struct ReplayReport {
    serial: Option<String>,
    stream_bytes: u64,
    frames_completed: u64,
    frames_saved: u64,
    frames_discarded: u64,
    initializations: u64,
    bytes_sent: u64,
    stream_mode: String,
    out_dir: String,
}

impl Report for ReplayReport {
    fn table(&self) -> (Vec<&'static str>, Vec<Vec<String>>) {
        let rows = field_rows([
            ("serial", self.serial.clone().unwrap_or_else(|| "-".into())),
            ("stream bytes", self.stream_bytes.to_string()),
            ("frames completed", self.frames_completed.to_string()),
            ("frames saved", self.frames_saved.to_string()),
            ("frames discarded", self.frames_discarded.to_string()),
            ("initializations", self.initializations.to_string()),
            ("bytes sent", self.bytes_sent.to_string()),
            ("stream mode", self.stream_mode.clone()),
            ("output", self.out_dir.clone()),
        ]);
        (vec!["FIELD", "VALUE"], rows)
    }

    fn pretty(&self) -> String {
        format!(
            "replayed {} bytes: {} frames saved to {}, {} discarded",
            self.stream_bytes, self.frames_saved, self.out_dir, self.frames_discarded
        )
    }
}

/// Counts saved frames and ends the replay after a limit.
struct LimitSink {
    inner: CaptureSink,
    saved: Arc<AtomicU64>,
    limit: Option<u64>,
    cancel: CancellationToken,
}

impl FrameSink for LimitSink {
    fn on_frame(&mut self, frame: &DecodedFrame) -> Result<(), SinkError> {
        self.inner.on_frame(frame)?;
        let saved = self.saved.fetch_add(1, Ordering::SeqCst) + 1;
        if self.limit.is_some_and(|limit| saved >= limit) {
            info!(saved, "frame limit reached");
            self.cancel.cancel();
        }
        Ok(())
    }

    fn on_text(&mut self, text: &[u8]) {
        self.inner.on_text(text);
    }
}

pub fn run(args: ReplayArgs, format: OutputFormat) -> CliResult<i32> {
    let geometry = args.geometry.geometry()?;
    let capture = fs::read(&args.capture).map_err(|err| {
        io_error(&format!("failed reading {}", args.capture.display()), err)
    })?;

    let sim = SimulatedTransport::new().with_device(QUADCAM_DESCRIPTION, REPLAY_SERIAL);
    sim.set_rx_packet_size(args.chunk as usize);
    sim.push_rx(&capture);

    let config = SessionConfig {
        assembler: AssemblerConfig {
            geometry,
            ..AssemblerConfig::default()
        },
        channel_order: args.channel_order(),
        reader: ReaderConfig {
            read_chunk: args.chunk as usize,
            panic_backoff: Duration::from_millis(50),
            ..ReaderConfig::default()
        },
        ..SessionConfig::default()
    };
    let session = Session::new(sim.clone(), config);

    let cancel = CancellationToken::new();
    install_ctrlc_handler(cancel.clone())?;

    let render = RenderCommand {
        renderer: args.renderer.clone(),
        script_dir: args.scripts.clone(),
        player: args.player.clone(),
        player_args: Vec::new(),
    };
    let mut capture_sink = CaptureSink::new(DiskSink::new(&args.out))
        .with_render(render)
        .with_console(Box::new(std::io::stderr()));
    if let Some(path) = &args.notify {
        capture_sink = capture_sink.with_notifier(Notifier::new(path));
    }
    let saved = Arc::new(AtomicU64::new(0));
    let sink = LimitSink {
        inner: capture_sink,
        saved: Arc::clone(&saved),
        limit: args.frames,
        cancel: cancel.clone(),
    };

    let input: Box<dyn Read + Send> = if args.stdin {
        eprintln!("{COMMAND_LEGEND}");
        Box::new(std::io::stdin())
    } else {
        Box::new(std::io::empty())
    };

    let watcher = spawn_drain_watcher(sim.clone(), Arc::clone(session.state()), cancel.clone());
    let result = session.run(input, Box::new(sink), &cancel);
    cancel.cancel();
    let _ = watcher.join();
    let report = result.map_err(|err| session_error("replay failed", err))?;

    print_report(
        &ReplayReport {
            serial: session.state().serial(),
            stream_bytes: report.reader.bytes_read,
            frames_completed: report.reader.frames_completed,
            frames_saved: saved.load(Ordering::SeqCst),
            frames_discarded: report.reader.frames_discarded,
            initializations: report.initializations,
            bytes_sent: report.bytes_sent,
            stream_mode: report.stream_mode.to_string(),
            out_dir: args.out.display().to_string(),
        },
        format,
    );
    Ok(SUCCESS)
}

/// Cancel the session once the device is ready and its receive queue has
/// stayed empty for a few checks.
fn spawn_drain_watcher(
    sim: SimulatedTransport,
    state: Arc<quadcam_session::SessionState>,
    cancel: CancellationToken,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut empty_checks = 0;
        while quadcam_session::pause(&cancel, DRAIN_INTERVAL) {
            if state.is_ready() && sim.rx_pending() == 0 {
                empty_checks += 1;
            } else {
                empty_checks = 0;
            }
            if empty_checks >= DRAIN_CHECKS {
                debug!("capture drained");
                cancel.cancel();
            }
        }
    })
}

fn install_ctrlc_handler(cancel: CancellationToken) -> CliResult<()> {
    ctrlc::set_handler(move || cancel.cancel()).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })
}
