//! Device layer: the device-manager interface, printer supervision and the
//! serial ESC/POS printer.
//!
//! The device manager owns the printer handle. The hub checks it, discards it
//! after a transport fault and asks for a fresh one; it never keeps a handle
//! outside the printer lock.

pub mod escpos;
pub mod supervisor;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::StationId;

pub use escpos::{SerialPrinter, SerialPrinterConfig, SerialPrinterManager};
pub use supervisor::PrinterSupervisor;

/// Transport-level device failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceFault {
    /// The serial link failed (open, read, write or timeout).
    #[error("serial error: {0}")]
    Serial(String),

    /// The device answered with bytes that do not match the protocol.
    #[error("invalid reply: {0}")]
    InvalidReply(String),

    /// No usable handle: the manager has none to give, or the port was closed.
    #[error("device disconnected")]
    Disconnected,
}

/// Receipt printer handle.
#[async_trait]
pub trait Printer: Send + Sync + fmt::Debug {
    /// Reads whether the cash drawer is open.
    async fn is_drawer_open(&self) -> Result<bool, DeviceFault>;

    /// Pulses the drawer kick connector.
    async fn open_drawer(&self) -> Result<(), DeviceFault>;

    /// Prints one block of text followed by a line feed.
    async fn print_line(&self, text: &str) -> Result<(), DeviceFault>;

    /// Cuts the paper.
    async fn cut_paper(&self) -> Result<(), DeviceFault>;
}

/// Owner of the physical device handles.
#[async_trait]
pub trait DeviceManager: Send + Sync + fmt::Debug {
    /// Returns whether a printer is configured for `station`.
    async fn printer_configured(&self, station: &StationId) -> bool;

    /// Returns the printer, opening it if no handle is cached.
    ///
    /// `Ok(None)` means no printer is configured.
    async fn printer(&self) -> Result<Option<Arc<dyn Printer>>, DeviceFault>;

    /// Closes the cached printer handle, if any, and forgets it.
    async fn discard_printer(&self);
}

/// Component that caches its own printer handle and must drop it after the
/// printer connection was rebuilt.
pub trait PrinterListener: Send + Sync + fmt::Debug {
    /// Called after a successful printer recovery.
    fn printer_reset(&self);
}

/// Health check for a device reached through an external plugin.
#[async_trait]
pub trait StatusCheck: Send + Sync + fmt::Debug {
    /// Returns `true` if the device is working.
    async fn check(&self) -> bool;
}
