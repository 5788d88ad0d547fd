//! Interfaces to the external domain layer.
//!
//! Till bookkeeping, station lookup, pending TEF transactions and telemetry
//! delivery live outside the hub. These traits are the narrow surface the hub
//! needs from them.

use std::fmt;

use async_trait::async_trait;

use crate::domain::{Station, StationId, TillStatus};
use crate::error::HubError;

/// Read access to till sessions.
#[async_trait]
pub trait TillLedger: Send + Sync + fmt::Debug {
    /// Returns the status of the station's last till, if it ever had one.
    async fn last_till_status(&self, station: &StationId) -> Result<Option<TillStatus>, HubError>;
}

/// Lookup of stations by access token.
#[async_trait]
pub trait StationDirectory: Send + Sync + fmt::Debug {
    /// Resolves the station an access token belongs to.
    async fn station_for_token(&self, token: &str) -> Result<Option<Station>, HubError>;
}

/// Check for a TEF transaction left unfinished by a previous session.
#[async_trait]
pub trait PendingTransactionCheck: Send + Sync + fmt::Debug {
    /// Returns `true` if the last TEF transaction was cancelled and the
    /// operator must be warned.
    async fn has_cancelled_transaction(&self) -> bool;
}

/// Destination of the periodic telemetry report.
#[async_trait]
pub trait TelemetrySink: Send + Sync + fmt::Debug {
    /// Sends one report for `station`.
    async fn report(&self, station: &StationId) -> Result<(), HubError>;
}

/// Check used when no TEF plugin tracks pending transactions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPendingTransactions;

#[async_trait]
impl PendingTransactionCheck for NoPendingTransactions {
    async fn has_cancelled_transaction(&self) -> bool {
        false
    }
}

/// Telemetry sink that writes the report to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTelemetry;

#[async_trait]
impl TelemetrySink for LogTelemetry {
    async fn report(&self, station: &StationId) -> Result<(), HubError> {
        tracing::info!(
            %station,
            version = env!("CARGO_PKG_VERSION"),
            os = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            "telemetry report"
        );
        Ok(())
    }
}
