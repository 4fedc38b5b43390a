use std::time::Duration;

use quadcam_transport::{BitMode, Transport};
use tracing::{debug, warn};

use crate::error::ModeError;
use crate::state::StreamMode;

/// Pin mask used for every bit-mode command.
const BIT_MODE_MASK: u8 = 0xFF;

/// Settle delays around bit-mode changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTiming {
    /// Wait after the reset to async FIFO.
    pub reset_settle: Duration,
    /// Additional wait before switching to sync FIFO.
    pub sync_settle: Duration,
}

impl Default for ModeTiming {
    fn default() -> Self {
        Self {
            reset_settle: Duration::from_millis(10),
            sync_settle: Duration::from_millis(100),
        }
    }
}

impl ModeTiming {
    /// No delays; for simulated devices.
    pub fn immediate() -> Self {
        Self {
            reset_settle: Duration::ZERO,
            sync_settle: Duration::ZERO,
        }
    }
}

/// Drives the bridge between async and sync FIFO modes.
///
/// The tracked mode is only a cache: the bridge can drop back to async on
/// its own, so every transition starts with a reset, even when the tracked
/// mode already equals the target.
#[derive(Debug, Clone, Default)]
pub struct ModeController {
    timing: ModeTiming,
    mode: StreamMode,
    transitions: u64,
}

impl ModeController {
    pub fn new(timing: ModeTiming) -> Self {
        Self {
            timing,
            mode: StreamMode::Async,
            transitions: 0,
        }
    }

    /// Put the bridge into `target` mode.
    ///
    /// On failure the tracked mode is left unchanged and the caller must not
    /// assume `target` is active.
    pub fn set_mode<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        target: StreamMode,
    ) -> Result<StreamMode, ModeError> {
        self.transitions += 1;

        if let Err(err) = transport.set_bit_mode(BIT_MODE_MASK, BitMode::Reset) {
            warn!(error = %err, "failed to reset device to async FIFO mode");
            return Err(ModeError::Reset(err));
        }
        std::thread::sleep(self.timing.reset_settle);

        if target == StreamMode::Sync {
            std::thread::sleep(self.timing.sync_settle);
            if let Err(err) = transport.set_bit_mode(BIT_MODE_MASK, BitMode::SyncFifo) {
                warn!(error = %err, "failed to initialize sync FIFO mode");
                return Err(ModeError::SyncSwitch(err));
            }
        }

        debug!(?target, "device mode set");
        self.mode = target;
        Ok(target)
    }

    pub fn set_async<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<StreamMode, ModeError> {
        self.set_mode(transport, StreamMode::Async)
    }

    pub fn set_sync<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<StreamMode, ModeError> {
        self.set_mode(transport, StreamMode::Sync)
    }

    /// Last mode that was set successfully.
    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    /// Transitions attempted, successful or not.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    pub fn timing(&self) -> ModeTiming {
        self.timing
    }
}
