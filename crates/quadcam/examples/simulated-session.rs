//! Run a capture session against a simulated board.
//!
//! Run with:
//!   cargo run --example simulated-session
//!
//! The simulated board prints a banner and sends a synthetic frame. A failed
//! bytes-available query is then injected to show reinitialization, and a
//! second frame arrives on the reacquired device. Frames are saved under the
//! system temp directory.

use std::sync::Arc;
use std::time::Duration;

use quadcam::frame::{AssemblerConfig, FrameGeometry, FRAME_END_KEY, FRAME_START_KEY};
use quadcam::session::{CancellationToken, DiscoveryConfig, Session, SessionConfig};
use quadcam::sink::{CaptureSink, DiskSink};
use quadcam::transport::{DriverStatus, SimOp, SimulatedTransport};

fn frame(geometry: FrameGeometry, fill: u8) -> Vec<u8> {
    let mut wire = FRAME_START_KEY.to_vec();
    wire.extend(std::iter::repeat(fill).take(geometry.raw_len()));
    wire.extend_from_slice(&FRAME_END_KEY);
    wire
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    let geometry = FrameGeometry::new(64, 32)?;
    let out_dir = std::env::temp_dir().join(format!("quadcam-example-{}", std::process::id()));

    let board = SimulatedTransport::new().with_device("QuadCam", "QC000001");
    board.set_rx_packet_size(512);
    board.push_rx(b"QuadCam v2 booted\n");
    board.push_rx(&frame(geometry, 0xFF));

    let config = SessionConfig {
        assembler: AssemblerConfig {
            geometry,
            ..AssemblerConfig::default()
        },
        discovery: DiscoveryConfig {
            poll_interval: Duration::from_millis(20),
            ..DiscoveryConfig::default()
        },
        ..SessionConfig::default()
    };
    let session = Arc::new(Session::new(board.clone(), config));
    let sink = CaptureSink::new(DiskSink::new(&out_dir)).with_console(Box::new(std::io::stderr()));

    let cancel = CancellationToken::new();
    let runner = {
        let session = Arc::clone(&session);
        let cancel = cancel.clone();
        std::thread::spawn(move || session.run(std::io::empty(), Box::new(sink), &cancel))
    };

    std::thread::sleep(Duration::from_millis(500));
    eprintln!("-- injecting a driver fault");
    board.fail_next(SimOp::RxAvailable, DriverStatus::IoError);
    board.push_rx(&frame(geometry, 0x1F));
    std::thread::sleep(Duration::from_secs(2));

    cancel.cancel();
    let report = runner.join().map_err(|_| "session thread panicked")??;
    eprintln!(
        "{} frames, {} initializations, output in {}",
        report.reader.frames_completed,
        report.initializations,
        out_dir.display()
    );
    Ok(())
}
