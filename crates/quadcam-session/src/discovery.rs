//! Device discovery and initialization.

use std::time::{Duration, Instant};

use quadcam_transport::{DeviceInfo, Transport};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::mode::ModeController;
use crate::timing::pause;

/// Product description the capture board reports.
pub const QUADCAM_DESCRIPTION: &str = "QuadCam";

/// Discovery and link configuration.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Description string a device must report to be selected.
    pub description: String,
    /// Delay between enumeration attempts.
    pub poll_interval: Duration,
    /// Give up after this long. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Receive latency timer applied after open.
    pub latency_ms: u8,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            description: QUADCAM_DESCRIPTION.to_string(),
            poll_interval: Duration::from_millis(100),
            timeout: None,
            latency_ms: 2,
            read_timeout: Duration::from_millis(90),
            write_timeout: Duration::from_millis(200),
        }
    }
}

/// Conditions already logged during one discovery run.
#[derive(Debug, Default)]
struct Reported {
    enumerate_failed: bool,
    no_devices: bool,
    no_match: bool,
}

fn find_serial<'a>(devices: &'a [DeviceInfo], description: &str) -> Option<&'a str> {
    devices
        .iter()
        .find(|d| d.description == description)
        .map(|d| d.serial.as_str())
}

/// Poll the bus until a device with the configured description appears.
///
/// Returns the serial of the first match. Each failure condition is logged
/// once per call, however long the wait.
pub fn wait_for_device<T: Transport + ?Sized>(
    transport: &mut T,
    config: &DiscoveryConfig,
    cancel: &CancellationToken,
) -> Result<String> {
    let started = Instant::now();
    let mut reported = Reported::default();

    loop {
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        match transport.enumerate_devices() {
            Ok(devices) if devices.is_empty() => {
                if !std::mem::replace(&mut reported.no_devices, true) {
                    info!("no FTDI devices detected");
                }
            }
            Ok(devices) => match find_serial(&devices, &config.description) {
                Some(serial) => return Ok(serial.to_string()),
                None => {
                    if !std::mem::replace(&mut reported.no_match, true) {
                        info!(
                            description = %config.description,
                            attached = devices.len(),
                            "no QuadCam found"
                        );
                    }
                }
            },
            Err(err) => {
                if !std::mem::replace(&mut reported.enumerate_failed, true) {
                    warn!(error = %err, "failed to get number of devices");
                }
            }
        }

        if let Some(limit) = config.timeout {
            let waited = started.elapsed();
            if waited >= limit {
                warn!(?waited, "timed out waiting for QuadCam");
                return Err(SessionError::DiscoveryTimeout {
                    description: config.description.clone(),
                    waited,
                });
            }
        }

        if !pause(cancel, config.poll_interval) {
            return Err(SessionError::Cancelled);
        }
    }
}

/// Find, open and configure the device.
///
/// An open failure restarts discovery from scratch. Once open the link is
/// forced to async mode and the latency timer and timeouts are applied;
/// failures of those settings are logged but do not fail initialization.
pub fn initialize<T: Transport + ?Sized>(
    transport: &mut T,
    modes: &mut ModeController,
    config: &DiscoveryConfig,
    cancel: &CancellationToken,
) -> Result<String> {
    let serial = loop {
        let serial = wait_for_device(transport, config, cancel)?;
        match transport.open_by_serial(&serial) {
            Ok(()) => break serial,
            Err(err) => {
                debug!(%serial, error = %err, "open failed, retrying discovery");
                if !pause(cancel, config.poll_interval) {
                    return Err(SessionError::Cancelled);
                }
            }
        }
    };

    info!(%serial, "found QuadCam");

    if let Err(err) = modes.set_async(transport) {
        warn!(error = %err, "device left in unknown mode after open");
    }
    if let Err(err) = transport.set_latency_timer(config.latency_ms) {
        warn!(error = %err, "failed to set latency timer");
    }
    if let Err(err) = transport.set_timeouts(config.read_timeout, config.write_timeout) {
        warn!(error = %err, "failed to set timeouts");
    }

    Ok(serial)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use quadcam_transport::{
        BitMode, DriverStatus, SimCall, SimOp, SimulatedTransport, TransportError,
    };
    use tracing_subscriber::fmt::MakeWriter;

    use super::*;
    use crate::mode::ModeTiming;
    use crate::state::StreamMode;

    fn fast_config() -> DiscoveryConfig {
        DiscoveryConfig {
            poll_interval: Duration::from_millis(1),
            ..DiscoveryConfig::default()
        }
    }

    #[test]
    fn returns_first_matching_serial() {
        let mut sim = SimulatedTransport::new()
            .with_device("FT232R USB UART", "A100")
            .with_device("QuadCam", "QC01")
            .with_device("QuadCam", "QC02");

        let serial =
            wait_for_device(&mut sim, &fast_config(), &CancellationToken::new()).unwrap();
        assert_eq!(serial, "QC01");
    }

    #[test]
    fn waits_until_device_is_attached() {
        let sim = SimulatedTransport::new();
        let plug = sim.clone();
        let mut handle = sim.clone();
        let config = fast_config();

        let attach = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            plug.attach(DeviceInfo::new("QuadCam", "QC07"));
        });

        let serial = wait_for_device(&mut handle, &config, &CancellationToken::new()).unwrap();
        attach.join().unwrap();
        assert_eq!(serial, "QC07");
    }

    #[test]
    fn survives_enumeration_failures() {
        let mut sim = SimulatedTransport::new().with_device("QuadCam", "QC01");
        sim.fail_next(SimOp::Enumerate, DriverStatus::IoError);
        sim.fail_next(SimOp::Enumerate, DriverStatus::IoError);

        let serial =
            wait_for_device(&mut sim, &fast_config(), &CancellationToken::new()).unwrap();
        assert_eq!(serial, "QC01");
    }

    /// Bus that answers enumeration from a script, one entry per poll.
    struct ScriptedBus {
        polls: std::collections::VecDeque<quadcam_transport::Result<Vec<DeviceInfo>>>,
    }

    impl ScriptedBus {
        fn new(failures: usize, empty: usize, foreign: usize) -> Self {
            let mut polls = std::collections::VecDeque::new();
            for _ in 0..failures {
                polls.push_back(Err(TransportError::driver(
                    "GetDeviceList",
                    DriverStatus::IoError,
                )));
            }
            for _ in 0..empty {
                polls.push_back(Ok(Vec::new()));
            }
            for _ in 0..foreign {
                polls.push_back(Ok(vec![DeviceInfo::new("FT232R USB UART", "A100")]));
            }
            polls.push_back(Ok(vec![
                DeviceInfo::new("FT232R USB UART", "A100"),
                DeviceInfo::new("QuadCam", "QC01"),
            ]));
            Self { polls }
        }
    }

    impl Transport for ScriptedBus {
        fn enumerate_devices(&mut self) -> quadcam_transport::Result<Vec<DeviceInfo>> {
            self.polls.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }

        fn open_by_serial(&mut self, _serial: &str) -> quadcam_transport::Result<()> {
            Ok(())
        }

        fn rx_bytes_available(&mut self) -> quadcam_transport::Result<usize> {
            Ok(0)
        }

        fn read(&mut self, _buf: &mut [u8]) -> quadcam_transport::Result<usize> {
            Ok(0)
        }

        fn write(&mut self, buf: &[u8]) -> quadcam_transport::Result<usize> {
            Ok(buf.len())
        }

        fn set_bit_mode(&mut self, _mask: u8, _mode: BitMode) -> quadcam_transport::Result<()> {
            Ok(())
        }

        fn set_latency_timer(&mut self, _ms: u8) -> quadcam_transport::Result<()> {
            Ok(())
        }

        fn set_timeouts(
            &mut self,
            _read: Duration,
            _write: Duration,
        ) -> quadcam_transport::Result<()> {
            Ok(())
        }

        fn close(&mut self) -> quadcam_transport::Result<()> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogCapture {
        type Writer = LogCapture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    impl LogCapture {
        fn count(&self, message: &str) -> usize {
            String::from_utf8_lossy(&self.0.lock().unwrap())
                .matches(message)
                .count()
        }
    }

    fn discover_logged(bus: &mut ScriptedBus, logs: &LogCapture) -> String {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            wait_for_device(bus, &fast_config(), &CancellationToken::new()).unwrap()
        })
    }

    #[test]
    fn each_condition_is_logged_once_per_run() {
        let logs = LogCapture::default();

        let mut bus = ScriptedBus::new(3, 4, 5);
        assert_eq!(discover_logged(&mut bus, &logs), "QC01");
        assert!(bus.polls.is_empty());
        assert_eq!(logs.count("failed to get number of devices"), 1);
        assert_eq!(logs.count("no FTDI devices detected"), 1);
        assert_eq!(logs.count("no QuadCam found"), 1);

        // A fresh run reports again.
        let mut bus = ScriptedBus::new(2, 2, 2);
        assert_eq!(discover_logged(&mut bus, &logs), "QC01");
        assert_eq!(logs.count("failed to get number of devices"), 2);
        assert_eq!(logs.count("no FTDI devices detected"), 2);
        assert_eq!(logs.count("no QuadCam found"), 2);
    }

    #[test]
    fn cancellation_ends_discovery() {
        let mut sim = SimulatedTransport::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            trigger.cancel();
        });

        let err = wait_for_device(&mut sim, &fast_config(), &cancel).unwrap_err();
        stopper.join().unwrap();
        assert!(matches!(err, SessionError::Cancelled));
    }

    #[test]
    fn timeout_is_reported() {
        let mut sim = SimulatedTransport::new().with_device("Other", "X1");
        let config = DiscoveryConfig {
            timeout: Some(Duration::from_millis(15)),
            ..fast_config()
        };

        let err = wait_for_device(&mut sim, &config, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, SessionError::DiscoveryTimeout { .. }));
    }

    #[test]
    fn initialize_configures_link() {
        let mut sim = SimulatedTransport::new().with_device("QuadCam", "QC01");
        let mut modes = ModeController::new(ModeTiming::immediate());

        let serial = initialize(
            &mut sim,
            &mut modes,
            &fast_config(),
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(serial, "QC01");
        assert_eq!(modes.mode(), StreamMode::Async);
        assert_eq!(
            sim.calls(),
            vec![
                SimCall::Open("QC01".into()),
                SimCall::SetBitMode {
                    mask: 0xFF,
                    mode: BitMode::Reset
                },
                SimCall::SetLatency(2),
                SimCall::SetTimeouts {
                    read: Duration::from_millis(90),
                    write: Duration::from_millis(200)
                },
            ]
        );
    }

    #[test]
    fn open_failure_restarts_discovery() {
        let mut sim = SimulatedTransport::new().with_device("QuadCam", "QC01");
        sim.fail_next(SimOp::Open, DriverStatus::DeviceNotOpened);
        let mut modes = ModeController::new(ModeTiming::immediate());

        let serial = initialize(
            &mut sim,
            &mut modes,
            &fast_config(),
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(serial, "QC01");
        assert_eq!(sim.open_serial().as_deref(), Some("QC01"));
    }

    #[test]
    fn setting_failures_do_not_abort_initialization() {
        let mut sim = SimulatedTransport::new().with_device("QuadCam", "QC01");
        sim.fail_next(SimOp::SetLatency, DriverStatus::IoError);
        sim.fail_next(SimOp::SetBitMode, DriverStatus::IoError);
        let mut modes = ModeController::new(ModeTiming::immediate());

        initialize(
            &mut sim,
            &mut modes,
            &fast_config(),
            &CancellationToken::new(),
        )
        .unwrap();

        assert!(sim
            .calls()
            .iter()
            .any(|c| matches!(c, SimCall::SetTimeouts { .. })));
    }
}
