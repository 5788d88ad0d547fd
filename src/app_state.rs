//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::device::{PrinterSupervisor, StatusCheck};
use crate::domain::DeviceCoordinator;
use crate::service::{PendingTransactionCheck, StationDirectory, TefService};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Device locks, event stream and question desk.
    pub coordinator: Arc<DeviceCoordinator>,
    /// Printer check and recovery.
    pub supervisor: Arc<PrinterSupervisor>,
    /// Interactive TEF operations.
    pub tef: Arc<TefService>,
    /// Token to station lookup.
    pub stations: Arc<dyn StationDirectory>,
    /// Check run when a stream opens.
    pub pending: Arc<dyn PendingTransactionCheck>,
    /// SAT health check, if a SAT is installed.
    pub sat_check: Option<Arc<dyn StatusCheck>>,
    /// Pinpad health check, if a pinpad plugin is installed.
    pub pinpad_check: Option<Arc<dyn StatusCheck>>,
    /// Reconnection attempts for on-demand printer checks.
    pub printer_retries: u32,
}
