//! Printer health check with bounded reconnection.
//!
//! [`PrinterSupervisor::ensure_printer`] reads the drawer state as a health
//! check. After a transport fault it drops the cached handle and reopens the
//! printer up to `retries` times, pausing between attempts. When every attempt
//! fails the *first* fault is returned, since that is the one that explains
//! what went wrong.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::{DeviceFault, DeviceManager, PrinterListener};
use crate::domain::{Device, DeviceGuard, StationId};
use crate::error::HubError;

/// Default pause between reconnection attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Validates and repairs the printer connection.
#[derive(Debug)]
pub struct PrinterSupervisor {
    devices: Arc<dyn DeviceManager>,
    retry_delay: Duration,
    listeners: Mutex<Vec<Arc<dyn PrinterListener>>>,
}

impl PrinterSupervisor {
    /// Creates a supervisor over `devices`.
    #[must_use]
    pub fn new(devices: Arc<dyn DeviceManager>, retry_delay: Duration) -> Self {
        Self {
            devices,
            retry_delay,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Returns the device manager.
    #[must_use]
    pub fn devices(&self) -> &Arc<dyn DeviceManager> {
        &self.devices
    }

    /// Registers a component to notify after the printer was reopened.
    pub fn add_listener(&self, listener: Arc<dyn PrinterListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Checks the printer of `station`, reconnecting on transport faults.
    ///
    /// Returns `Some(drawer_open)` on success and `None` when the station has
    /// no printer configured. `printer_lock` must be the printer's guard.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::PreconditionViolation`] if `printer_lock` guards
    /// another device, and [`HubError::Device`] with the original fault when
    /// every reconnection attempt fails.
    pub async fn ensure_printer(
        &self,
        printer_lock: &DeviceGuard,
        station: &StationId,
        retries: u32,
    ) -> Result<Option<bool>, HubError> {
        if printer_lock.device() != Device::Printer {
            return Err(HubError::PreconditionViolation(format!(
                "ensure_printer called holding the {} lock",
                printer_lock.device()
            )));
        }

        if !self.devices.printer_configured(station).await {
            return Ok(None);
        }

        let original = match self.read_drawer().await {
            Ok(open) => return Ok(Some(open)),
            Err(fault) => fault,
        };
        tracing::warn!(%station, error = %original, "printer check failed");
        self.devices.discard_printer().await;

        for attempt in 1..=retries {
            tracing::info!(%station, attempt, "printer check failed, reopening");
            match self.read_drawer().await {
                Ok(open) => {
                    self.notify_reset();
                    tracing::info!(%station, attempt, "printer reopened");
                    return Ok(Some(open));
                }
                Err(fault) => {
                    tracing::debug!(%station, attempt, error = %fault, "printer reopen failed");
                    self.devices.discard_printer().await;
                    if attempt < retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(HubError::Device(original))
    }

    async fn read_drawer(&self) -> Result<bool, DeviceFault> {
        let printer = self.devices.printer().await?.ok_or(DeviceFault::Disconnected)?;
        printer.is_drawer_open().await
    }

    fn notify_reset(&self) {
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.printer_reset();
        }
    }
}
