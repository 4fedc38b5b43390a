//! Shared session state.
//!
//! The coordinator owns the state and is the only writer of `NeedInit` and
//! `Ready`; the reader raises `Panic` when the transport faults. Everything
//! is atomic, so the loops observe changes without locking.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Lifecycle of the device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionStatus {
    /// The device must be (re)acquired before any I/O.
    NeedInit = 0,
    /// The device is open and configured.
    Ready = 1,
    /// The transport is in an unknown state and must be reacquired.
    Panic = 2,
}

impl SessionStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionStatus::Ready,
            2 => SessionStatus::Panic,
            _ => SessionStatus::NeedInit,
        }
    }
}

/// FIFO transfer discipline of the bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamMode {
    /// Request/acknowledge transfers.
    #[default]
    Async = 0,
    /// Continuous streaming.
    Sync = 1,
}

impl StreamMode {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => StreamMode::Sync,
            _ => StreamMode::Async,
        }
    }
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamMode::Async => "async",
            StreamMode::Sync => "sync",
        })
    }
}

/// Device session state shared between the coordinator and its loops.
#[derive(Debug)]
pub struct SessionState {
    status: AtomicU8,
    mode: AtomicU8,
    generation: AtomicU64,
    serial: Mutex<Option<String>>,
}

impl SessionState {
    /// A fresh session that still needs initialization.
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(SessionStatus::NeedInit as u8),
            mode: AtomicU8::new(StreamMode::Async as u8),
            generation: AtomicU64::new(0),
            serial: Mutex::new(None),
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.status() == SessionStatus::Ready
    }

    /// Record a successful initialization.
    pub fn mark_ready(&self, serial: &str) {
        *self.serial.lock().unwrap_or_else(PoisonError::into_inner) = Some(serial.to_string());
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.status
            .store(SessionStatus::Ready as u8, Ordering::Release);
    }

    /// Flag a transport fault. Returns true only for the call that moved the
    /// session out of `Ready`, so a burst of faults is reported once.
    pub fn raise_panic(&self) -> bool {
        self.status
            .compare_exchange(
                SessionStatus::Ready as u8,
                SessionStatus::Panic as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Ask for the device to be reacquired.
    pub fn request_init(&self) {
        self.status
            .store(SessionStatus::NeedInit as u8, Ordering::Release);
    }

    pub fn stream_mode(&self) -> StreamMode {
        StreamMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    pub fn set_stream_mode(&self, mode: StreamMode) {
        self.mode.store(mode as u8, Ordering::Release);
    }

    /// Number of successful initializations so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Serial of the most recently acquired device.
    pub fn serial(&self) -> Option<String> {
        self.serial
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn starts_needing_init() {
        let state = SessionState::new();
        assert_eq!(state.status(), SessionStatus::NeedInit);
        assert_eq!(state.stream_mode(), StreamMode::Async);
        assert!(state.serial().is_none());
    }

    #[test]
    fn stream_mode_round_trips_through_state() {
        let state = SessionState::new();
        state.set_stream_mode(StreamMode::Sync);
        assert_eq!(state.stream_mode(), StreamMode::Sync);
        assert_eq!(state.stream_mode().to_string(), "sync");
    }

    #[test]
    fn panic_only_raised_from_ready() {
        let state = SessionState::new();
        assert!(!state.raise_panic());
        assert_eq!(state.status(), SessionStatus::NeedInit);

        state.mark_ready("QC01");
        assert!(state.raise_panic());
        assert!(!state.raise_panic());
        assert_eq!(state.status(), SessionStatus::Panic);
    }

    #[test]
    fn ready_records_serial_and_generation() {
        let state = SessionState::new();
        state.mark_ready("QC01");
        state.request_init();
        state.mark_ready("QC02");

        assert!(state.is_ready());
        assert_eq!(state.serial().as_deref(), Some("QC02"));
        assert_eq!(state.generation(), 2);
    }

    #[test]
    fn concurrent_panics_report_once() {
        let state = Arc::new(SessionState::new());
        state.mark_ready("QC01");

        let raised: usize = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || state.raise_panic())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum();

        assert_eq!(raised, 1);
    }
}
