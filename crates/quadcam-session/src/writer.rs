//! Operator input forwarding.

use std::io::Read;
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;

use quadcam_transport::Transport;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{Result, SessionError};
use crate::mode::ModeController;

/// Consecutive zero-byte writes tolerated before giving up.
const MAX_STALLED_WRITES: usize = 8;

/// Spawn a thread that queues every byte read from `input`.
///
/// The thread ends at end of input, on a read error, when the receiver is
/// dropped, or after `cancel` fires and the next byte arrives. A blocking
/// read on a terminal cannot be interrupted, so callers should not wait for
/// this thread at shutdown unless it has already finished.
pub fn spawn_input_reader<R>(
    mut input: R,
    queue: Sender<u8>,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    std::thread::Builder::new()
        .name("quadcam-input".into())
        .spawn(move || {
            let mut buf = [0u8; 256];
            while !cancel.is_cancelled() {
                let n = match input.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        warn!(error = %err, "operator input failed");
                        break;
                    }
                };
                for &byte in &buf[..n] {
                    if queue.send(byte).is_err() {
                        return;
                    }
                }
            }
            debug!("operator input closed");
        })
        .map_err(|source| SessionError::Spawn {
            name: "input",
            source,
        })
}

/// Send `bytes` to the device.
///
/// The bridge only accepts host writes in async mode, so the mode is reset
/// first. Partial writes are continued from where the driver stopped.
/// Returns the number of bytes written.
pub fn transmit<T: Transport + ?Sized>(
    transport: &mut T,
    modes: &mut ModeController,
    bytes: &[u8],
) -> Result<usize> {
    if bytes.is_empty() {
        return Ok(0);
    }

    modes.set_async(transport)?;

    let mut written = 0;
    let mut stalled = 0;
    while written < bytes.len() {
        let n = transport.write(&bytes[written..])?;
        if n == 0 {
            stalled += 1;
            if stalled >= MAX_STALLED_WRITES {
                return Err(SessionError::WriteStalled {
                    written,
                    total: bytes.len(),
                });
            }
            continue;
        }
        stalled = 0;
        written += n;
        trace!(written, total = bytes.len(), "wrote bytes");
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::mpsc;
    use std::time::Duration;

    use quadcam_transport::{BitMode, DriverStatus, SimCall, SimOp, SimulatedTransport};

    use super::*;
    use crate::mode::ModeTiming;

    fn open_sim() -> SimulatedTransport {
        let mut sim = SimulatedTransport::new().with_device("QuadCam", "QC01");
        sim.open_by_serial("QC01").unwrap();
        sim
    }

    #[test]
    fn input_bytes_are_queued_in_order() {
        let (tx, rx) = mpsc::channel();
        let handle =
            spawn_input_reader(Cursor::new(b"a^+".to_vec()), tx, CancellationToken::new())
                .unwrap();
        handle.join().unwrap();

        let bytes: Vec<u8> = rx.try_iter().collect();
        assert_eq!(bytes, b"a^+");
    }

    #[test]
    fn transmit_resets_mode_before_writing() {
        let mut sim = open_sim();
        let mut modes = ModeController::new(ModeTiming::immediate());

        assert_eq!(transmit(&mut sim, &mut modes, b"\n7").unwrap(), 2);
        assert_eq!(
            sim.calls()[1..],
            [
                SimCall::SetBitMode {
                    mask: 0xFF,
                    mode: BitMode::Reset
                },
                SimCall::Write(b"\n7".to_vec()),
            ]
        );
    }

    #[test]
    fn partial_writes_are_continued() {
        let mut sim = open_sim();
        sim.set_max_write(3);
        let mut modes = ModeController::new(ModeTiming::immediate());

        assert_eq!(transmit(&mut sim, &mut modes, b"abcdefgh").unwrap(), 8);
        assert_eq!(sim.written(), b"abcdefgh");
    }

    #[test]
    fn write_error_is_returned() {
        let mut sim = open_sim();
        sim.fail_next(SimOp::Write, DriverStatus::IoError);
        let mut modes = ModeController::new(ModeTiming::immediate());

        let err = transmit(&mut sim, &mut modes, b"x").unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
    }

    #[test]
    fn mode_failure_skips_write() {
        let mut sim = open_sim();
        sim.fail_next(SimOp::SetBitMode, DriverStatus::IoError);
        let mut modes = ModeController::new(ModeTiming::immediate());

        let err = transmit(&mut sim, &mut modes, b"x").unwrap_err();
        assert!(matches!(err, SessionError::Mode(_)));
        assert!(sim.written().is_empty());
    }

    #[test]
    fn nothing_to_send_touches_nothing() {
        let mut sim = open_sim();
        let mut modes = ModeController::new(ModeTiming::immediate());

        assert_eq!(transmit(&mut sim, &mut modes, b"").unwrap(), 0);
        assert_eq!(sim.calls().len(), 1);
    }

    #[test]
    fn dropped_receiver_ends_input_thread() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let handle = spawn_input_reader(
            Cursor::new(vec![b'x'; 1024]),
            tx,
            CancellationToken::new(),
        )
        .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !handle.is_finished() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(handle.is_finished());
    }
}
