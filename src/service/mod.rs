//! Service layer: interactive operations, pollers and collaborator ports.
//!
//! [`TefService`] sequences TEF operations over the shared
//! [`crate::domain::DeviceCoordinator`]. The pollers in [`pollers`] watch the
//! devices in the background, and [`ports`] names what the hub needs from the
//! external domain layer.

pub mod fiscal;
pub mod memory;
pub mod operation;
pub mod pollers;
pub mod ports;
pub mod tef_service;

pub use fiscal::FiscalNotifier;
pub use memory::InMemoryDomain;
pub use operation::{
    OperationFailure, OperationHandler, OperationOutcome, OperationPayload, OperationRegistry,
    PartialFailure, TefSession,
};
pub use pollers::{PollerDeps, PollerSettings, spawn_pollers};
pub use ports::{PendingTransactionCheck, StationDirectory, TelemetrySink, TillLedger};
pub use tef_service::{OperationReport, TefService, TefSettings};
