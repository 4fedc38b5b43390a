use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use quadcam_transport::Transport;

/// The single driver handle shared by a session's loops.
///
/// Every transport call goes through [`DeviceLink::lock`], so receive calls
/// from the reader and transmit/control calls from the coordinator never
/// interleave on the handle.
#[derive(Debug)]
pub struct DeviceLink<T> {
    inner: Arc<Mutex<T>>,
}

impl<T: Transport> DeviceLink<T> {
    pub fn new(transport: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(transport)),
        }
    }

    /// Take exclusive access to the handle.
    ///
    /// A poisoned lock is recovered: the coordinator reinitializes the device
    /// after a fault, so the handle's state is never trusted anyway.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with exclusive access to the handle.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock())
    }
}

impl<T> Clone for DeviceLink<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
