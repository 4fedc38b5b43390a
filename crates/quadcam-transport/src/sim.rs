//! In-memory simulated QuadCam bridge.
//!
//! `SimulatedTransport` behaves like a driver handle with a scripted receive
//! queue. Clones share state, so a test (or the replay command) can keep a
//! clone to feed bytes, inject driver faults and inspect what the session
//! transmitted.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{DriverStatus, Result, TransportError};
use crate::traits::{BitMode, DeviceInfo, Transport};

/// Driver operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimOp {
    Enumerate,
    Open,
    RxAvailable,
    Read,
    Write,
    SetBitMode,
    SetLatency,
    SetTimeouts,
    Close,
}

/// A control or transmit call recorded by the simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimCall {
    Open(String),
    Write(Vec<u8>),
    SetBitMode { mask: u8, mode: BitMode },
    SetLatency(u8),
    SetTimeouts { read: Duration, write: Duration },
    Close,
}

#[derive(Debug, Default)]
struct SimState {
    devices: Vec<DeviceInfo>,
    open: Option<String>,
    rx: VecDeque<u8>,
    rx_packet: usize,
    max_write: usize,
    stalled_reads: usize,
    written: Vec<u8>,
    calls: Vec<SimCall>,
    faults: HashMap<SimOp, VecDeque<Option<DriverStatus>>>,
}

impl SimState {
    fn take_fault(&mut self, op: SimOp, name: &'static str) -> Result<()> {
        if let Some(Some(status)) = self.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            debug!(?op, %status, "injected driver fault");
            return Err(TransportError::driver(name, status));
        }
        Ok(())
    }

    fn require_open(&self, name: &'static str) -> Result<()> {
        if self.open.is_none() {
            return Err(TransportError::NotOpen { op: name });
        }
        Ok(())
    }
}

/// A shared-state simulated driver handle.
#[derive(Debug, Clone, Default)]
pub struct SimulatedTransport {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedTransport {
    /// Create a simulator with no attached devices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: attach a device.
    pub fn with_device(self, description: &str, serial: &str) -> Self {
        self.attach(DeviceInfo::new(description, serial));
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a device to the simulated bus.
    pub fn attach(&self, device: DeviceInfo) {
        self.lock().devices.push(device);
    }

    /// Remove every device from the bus and drop any open handle.
    pub fn detach_all(&self) {
        let mut state = self.lock();
        state.devices.clear();
        state.open = None;
    }

    /// Queue bytes for the host to receive.
    pub fn push_rx(&self, bytes: &[u8]) {
        self.lock().rx.extend(bytes.iter().copied());
    }

    /// Limit how many bytes become visible per availability query.
    ///
    /// Zero means the whole queue is visible at once.
    pub fn set_rx_packet_size(&self, size: usize) {
        self.lock().rx_packet = size;
    }

    /// Limit how many bytes a single write accepts. Zero means unlimited.
    pub fn set_max_write(&self, size: usize) {
        self.lock().max_write = size;
    }

    /// Make the next `count` reads time out with nothing read, even while
    /// bytes are reported available.
    pub fn stall_reads(&self, count: usize) {
        self.lock().stalled_reads = count;
    }

    /// Make the next call of `op` fail with `status`.
    pub fn fail_next(&self, op: SimOp, status: DriverStatus) {
        self.lock().faults.entry(op).or_default().push_back(Some(status));
    }

    /// Let `skip` calls of `op` through, then fail the one after with `status`.
    pub fn fail_after(&self, op: SimOp, skip: usize, status: DriverStatus) {
        let mut state = self.lock();
        let queue = state.faults.entry(op).or_default();
        queue.extend(std::iter::repeat(None).take(skip));
        queue.push_back(Some(status));
    }

    /// Bytes still waiting to be received.
    pub fn rx_pending(&self) -> usize {
        self.lock().rx.len()
    }

    /// Every byte the host has transmitted so far.
    pub fn written(&self) -> Vec<u8> {
        self.lock().written.clone()
    }

    /// Recorded control and transmit calls, oldest first.
    pub fn calls(&self) -> Vec<SimCall> {
        self.lock().calls.clone()
    }

    /// Serial of the currently open device.
    pub fn open_serial(&self) -> Option<String> {
        self.lock().open.clone()
    }
}

impl Transport for SimulatedTransport {
    fn enumerate_devices(&mut self) -> Result<Vec<DeviceInfo>> {
        let mut state = self.lock();
        state.take_fault(SimOp::Enumerate, "GetDeviceList")?;
        Ok(state.devices.clone())
    }

    fn open_by_serial(&mut self, serial: &str) -> Result<()> {
        let mut state = self.lock();
        state.take_fault(SimOp::Open, "OpenBySerialNumber")?;
        if !state.devices.iter().any(|d| d.serial == serial) {
            return Err(TransportError::driver(
                "OpenBySerialNumber",
                DriverStatus::DeviceNotFound,
            ));
        }
        state.open = Some(serial.to_string());
        state.calls.push(SimCall::Open(serial.to_string()));
        Ok(())
    }

    fn rx_bytes_available(&mut self) -> Result<usize> {
        let mut state = self.lock();
        state.take_fault(SimOp::RxAvailable, "GetRxBytesAvailable")?;
        state.require_open("GetRxBytesAvailable")?;
        let pending = state.rx.len();
        Ok(match state.rx_packet {
            0 => pending,
            packet => pending.min(packet),
        })
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.lock();
        state.take_fault(SimOp::Read, "Read")?;
        state.require_open("Read")?;
        if state.stalled_reads > 0 {
            state.stalled_reads -= 1;
            trace!("simulated read timeout");
            return Ok(0);
        }
        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        trace!(bytes = n, "simulated read");
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let mut state = self.lock();
        state.take_fault(SimOp::Write, "Write")?;
        state.require_open("Write")?;
        let n = match state.max_write {
            0 => buf.len(),
            max => buf.len().min(max),
        };
        state.written.extend_from_slice(&buf[..n]);
        state.calls.push(SimCall::Write(buf[..n].to_vec()));
        Ok(n)
    }

    fn set_bit_mode(&mut self, mask: u8, mode: BitMode) -> Result<()> {
        let mut state = self.lock();
        state.take_fault(SimOp::SetBitMode, "SetBitMode")?;
        state.require_open("SetBitMode")?;
        state.calls.push(SimCall::SetBitMode { mask, mode });
        Ok(())
    }

    fn set_latency_timer(&mut self, ms: u8) -> Result<()> {
        let mut state = self.lock();
        state.take_fault(SimOp::SetLatency, "SetLatency")?;
        state.require_open("SetLatency")?;
        state.calls.push(SimCall::SetLatency(ms));
        Ok(())
    }

    fn set_timeouts(&mut self, read: Duration, write: Duration) -> Result<()> {
        let mut state = self.lock();
        state.take_fault(SimOp::SetTimeouts, "SetTimeouts")?;
        state.require_open("SetTimeouts")?;
        state.calls.push(SimCall::SetTimeouts { read, write });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.take_fault(SimOp::Close, "Close")?;
        state.require_open("Close")?;
        state.open = None;
        state.calls.push(SimCall::Close);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumerate_lists_attached_devices() {
        let mut sim = SimulatedTransport::new()
            .with_device("FT245R", "A1")
            .with_device("QuadCam", "QC01");

        let devices = sim.enumerate_devices().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[1], DeviceInfo::new("QuadCam", "QC01"));
    }

    #[test]
    fn operations_require_open_device() {
        let mut sim = SimulatedTransport::new().with_device("QuadCam", "QC01");
        let err = sim.rx_bytes_available().unwrap_err();
        assert!(matches!(err, TransportError::NotOpen { .. }));

        sim.open_by_serial("QC01").unwrap();
        assert_eq!(sim.rx_bytes_available().unwrap(), 0);
    }

    #[test]
    fn open_unknown_serial_fails() {
        let mut sim = SimulatedTransport::new().with_device("QuadCam", "QC01");
        let err = sim.open_by_serial("nope").unwrap_err();
        assert_eq!(err.status(), Some(DriverStatus::DeviceNotFound));
        assert!(sim.open_serial().is_none());
    }

    #[test]
    fn receive_queue_respects_packet_size() {
        let mut sim = SimulatedTransport::new().with_device("QuadCam", "QC01");
        sim.open_by_serial("QC01").unwrap();
        sim.push_rx(b"hello world");
        sim.set_rx_packet_size(4);

        assert_eq!(sim.rx_bytes_available().unwrap(), 4);
        let mut buf = [0u8; 4];
        assert_eq!(sim.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"hell");
        assert_eq!(sim.rx_pending(), 7);
    }

    #[test]
    fn partial_writes_are_recorded() {
        let mut sim = SimulatedTransport::new().with_device("QuadCam", "QC01");
        sim.open_by_serial("QC01").unwrap();
        sim.set_max_write(2);

        assert_eq!(sim.write(b"abc").unwrap(), 2);
        assert_eq!(sim.write(b"c").unwrap(), 1);
        assert_eq!(sim.written(), b"abc");
    }

    #[test]
    fn injected_fault_fires_once() {
        let mut sim = SimulatedTransport::new().with_device("QuadCam", "QC01");
        sim.open_by_serial("QC01").unwrap();
        sim.fail_next(SimOp::SetBitMode, DriverStatus::IoError);

        let err = sim.set_bit_mode(0xFF, BitMode::Reset).unwrap_err();
        assert_eq!(err.status(), Some(DriverStatus::IoError));
        sim.set_bit_mode(0xFF, BitMode::Reset).unwrap();
        assert_eq!(
            sim.calls().last(),
            Some(&SimCall::SetBitMode {
                mask: 0xFF,
                mode: BitMode::Reset
            })
        );
    }

    #[test]
    fn delayed_fault_skips_earlier_calls() {
        let mut sim = SimulatedTransport::new().with_device("QuadCam", "QC01");
        sim.open_by_serial("QC01").unwrap();
        sim.fail_after(SimOp::Write, 2, DriverStatus::IoError);

        sim.write(b"a").unwrap();
        sim.write(b"b").unwrap();
        assert!(sim.write(b"c").is_err());
        sim.write(b"d").unwrap();
        assert_eq!(sim.written(), b"abd");
    }

    #[test]
    fn clones_share_state() {
        let sim = SimulatedTransport::new().with_device("QuadCam", "QC01");
        let mut handle = sim.clone();
        handle.open_by_serial("QC01").unwrap();
        sim.push_rx(&[1, 2, 3]);

        assert_eq!(handle.rx_bytes_available().unwrap(), 3);
        assert_eq!(sim.open_serial().as_deref(), Some("QC01"));
    }

    #[test]
    fn detach_closes_handle() {
        let mut sim = SimulatedTransport::new().with_device("QuadCam", "QC01");
        sim.open_by_serial("QC01").unwrap();
        sim.detach_all();

        assert!(sim.enumerate_devices().unwrap().is_empty());
        assert!(sim.read(&mut [0u8; 1]).is_err());
    }
}
