//! Per-device mutual exclusion.
//!
//! One [`DeviceLock`] exists per [`Device`] class. Locks are not reentrant:
//! a flow that already holds the printer lock and asks for it again waits
//! forever. Acquisition hands out a [`DeviceGuard`] that releases the device
//! when dropped, on every exit path.
//!
//! Lock order: the TEF flow takes the pinpad lock for the whole operation and
//! the printer lock briefly inside it. Pollers only ever hold one lock.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use super::Device;
use crate::error::HubError;

/// How to behave when the device is already held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMode {
    /// Wait until the device is released.
    Blocking,
    /// Fail immediately with [`HubError::LockContention`].
    NonBlocking,
}

/// Proof of exclusive access to one device.
#[derive(Debug)]
pub struct DeviceGuard {
    device: Device,
    _guard: OwnedMutexGuard<()>,
}

impl DeviceGuard {
    /// Returns the device this guard holds.
    #[must_use]
    pub const fn device(&self) -> Device {
        self.device
    }
}

/// Binary lock for one device class.
#[derive(Debug)]
pub struct DeviceLock {
    device: Device,
    inner: Arc<Mutex<()>>,
}

impl DeviceLock {
    /// Creates a released lock for `device`.
    #[must_use]
    pub fn new(device: Device) -> Self {
        Self {
            device,
            inner: Arc::new(Mutex::new(())),
        }
    }

    /// Acquires the device.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::LockContention`] when `mode` is
    /// [`AcquireMode::NonBlocking`] and the device is held.
    pub async fn acquire(&self, mode: AcquireMode) -> Result<DeviceGuard, HubError> {
        let guard = match mode {
            AcquireMode::Blocking => {
                if self.is_locked() {
                    tracing::info!(device = %self.device, "waiting for device lock release");
                }
                Arc::clone(&self.inner).lock_owned().await
            }
            AcquireMode::NonBlocking => Arc::clone(&self.inner)
                .try_lock_owned()
                .map_err(|_| HubError::LockContention(self.device))?,
        };
        Ok(DeviceGuard {
            device: self.device,
            _guard: guard,
        })
    }

    /// Returns `true` if some task currently holds the device.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.inner.try_lock().is_err()
    }

    /// Returns the device this lock guards.
    #[must_use]
    pub const fn device(&self) -> Device {
        self.device
    }
}

/// The three device locks of a deployment.
#[derive(Debug)]
pub struct DeviceLocks {
    printer: DeviceLock,
    pinpad: DeviceLock,
    sat: DeviceLock,
}

impl DeviceLocks {
    /// Creates all locks in the released state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            printer: DeviceLock::new(Device::Printer),
            pinpad: DeviceLock::new(Device::Pinpad),
            sat: DeviceLock::new(Device::Sat),
        }
    }

    /// Returns the lock guarding `device`.
    #[must_use]
    pub const fn lock_for(&self, device: Device) -> &DeviceLock {
        match device {
            Device::Printer => &self.printer,
            Device::Pinpad => &self.pinpad,
            Device::Sat => &self.sat,
        }
    }

    /// Acquires `device` with the given mode.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::LockContention`] on non-blocking contention.
    pub async fn acquire(&self, device: Device, mode: AcquireMode) -> Result<DeviceGuard, HubError> {
        self.lock_for(device).acquire(mode).await
    }
}

impl Default for DeviceLocks {
    fn default() -> Self {
        Self::new()
    }
}
