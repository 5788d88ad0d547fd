//! Interactive TEF operations.
//!
//! [`TefService::start`] runs one operation through its fixed sequence:
//! till check, printer check, dispatch to the registered handler, and one
//! terminal `TEF_OPERATION_FINISHED` event. The pinpad lock is held for the
//! whole run, so operations are serialized across stations. While the handler
//! runs, the frontend answers questions through [`TefService::submit_reply`]
//! and may ask for an abort through [`TefService::abort`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::operation::{
    OperationHandler, OperationOutcome, OperationPayload, OperationRegistry, PartialFailure,
    TefSession,
};
use super::ports::TillLedger;
use crate::device::PrinterSupervisor;
use crate::domain::{AcquireMode, Device, DeviceCoordinator, PosEvent, StationId, TillStatus};
use crate::error::HubError;

/// Message shown when the printer check before an operation fails.
pub const PRINTER_COMMUNICATION_ERROR: &str = "Erro comunicando com a impressora";

/// Operations that run without an open till.
pub const DEFAULT_NO_TILL_OPERATIONS: [&str; 2] =
    ["StartTefSaleSummaryEvent", "StartTefAdminEvent"];

/// Default reconnection attempts for the printer check.
pub const DEFAULT_PRINTER_RETRIES: u32 = 20;

/// Tunables of the TEF flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TefSettings {
    /// Operations exempt from the open-till requirement.
    pub no_till_operations: HashSet<String>,
    /// Reconnection attempts when the printer check fails.
    pub printer_retries: u32,
}

impl Default for TefSettings {
    fn default() -> Self {
        Self {
            no_till_operations: DEFAULT_NO_TILL_OPERATIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
            printer_retries: DEFAULT_PRINTER_RETRIES,
        }
    }
}

/// What the terminal event of an operation reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationReport {
    /// Success flag sent to the frontend.
    pub success: bool,
    /// Message sent to the frontend.
    pub message: String,
    /// Partial failure, when the main action succeeded but a follow-up did not.
    pub partial: Option<PartialFailure>,
}

impl OperationReport {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            partial: None,
        }
    }

    fn to_event(&self) -> PosEvent {
        PosEvent::TefOperationFinished {
            success: self.success,
            message: self.message.clone(),
            error_type: self.partial.as_ref().map(|p| p.kind),
            record_id: self.partial.as_ref().map(|p| p.record_id.clone()),
        }
    }
}

impl From<OperationOutcome> for OperationReport {
    fn from(outcome: OperationOutcome) -> Self {
        Self {
            success: true,
            message: outcome.message,
            partial: outcome.partial,
        }
    }
}

/// Coordinator of interactive TEF operations.
#[derive(Debug)]
pub struct TefService {
    coordinator: Arc<DeviceCoordinator>,
    supervisor: Arc<PrinterSupervisor>,
    registry: Arc<OperationRegistry>,
    tills: Arc<dyn TillLedger>,
    settings: TefSettings,
    in_flight: Mutex<HashMap<StationId, Arc<dyn OperationHandler>>>,
}

impl TefService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        coordinator: Arc<DeviceCoordinator>,
        supervisor: Arc<PrinterSupervisor>,
        registry: Arc<OperationRegistry>,
        tills: Arc<dyn TillLedger>,
        settings: TefSettings,
    ) -> Self {
        Self {
            coordinator,
            supervisor,
            registry,
            tills,
            settings,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the operation registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    /// Runs `operation` for `station` to completion.
    ///
    /// A routing-only `origin` field is removed from `payload` before the
    /// handler sees it. Once the printer check has started, the run always
    /// ends with exactly one `TEF_OPERATION_FINISHED` event, whose content is
    /// also returned.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::TillNotOpen`] when the operation needs an open till
    /// and the station has none, and [`HubError::UnknownOperation`] when no
    /// handler is registered. Both are raised before any device is touched
    /// and emit no event.
    pub async fn start(
        &self,
        station: &StationId,
        operation: &str,
        mut payload: OperationPayload,
    ) -> Result<OperationReport, HubError> {
        payload.remove("origin");

        self.check_till(station, operation).await?;
        let handler = self.registry.get(operation)?;

        let _pinpad = self
            .coordinator
            .locks()
            .acquire(Device::Pinpad, AcquireMode::Blocking)
            .await?;

        if let Err(err) = self.check_printer(station).await {
            tracing::warn!(%station, operation, error = %err, "printer check failed, tef operation not started");
            let report = OperationReport::failure(PRINTER_COMMUNICATION_ERROR);
            self.finish(station, &report).await;
            return Ok(report);
        }

        let session = TefSession::new(
            station.clone(),
            Arc::clone(&self.coordinator),
            Arc::clone(self.supervisor.devices()),
        );
        let _in_flight = InFlight::register(self, station, Arc::clone(&handler));

        tracing::info!(%station, operation, payload = ?payload, "dispatching tef operation");
        let report = match handler.execute(&session, payload).await {
            Ok(outcome) => OperationReport::from(outcome),
            Err(failure) => {
                tracing::info!(%station, operation, reason = failure.reason(), "tef operation failed");
                OperationReport::failure(failure.display_message())
            }
        };

        self.finish(station, &report).await;
        Ok(report)
    }

    /// Delivers the operator's reply to the question pending for `station`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NoPendingQuestion`] if the station is not waiting
    /// for a reply.
    pub fn submit_reply(&self, station: &StationId, value: serde_json::Value) -> Result<(), HubError> {
        self.coordinator.questions().submit_reply(station, value)
    }

    /// Decodes `encoded` as JSON text and delivers it as the reply.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidRequest`] when `encoded` is not valid JSON,
    /// otherwise as [`Self::submit_reply`].
    pub fn submit_encoded_reply(&self, station: &StationId, encoded: &str) -> Result<(), HubError> {
        let value = serde_json::from_str(encoded)
            .map_err(|e| HubError::InvalidRequest(format!("reply value is not JSON: {e}")))?;
        self.submit_reply(station, value)
    }

    /// Asks the operation running for `station` to stop.
    ///
    /// Returns `false` when nothing is running. The handler decides whether
    /// and when to honor the request.
    pub async fn abort(&self, station: &StationId) -> bool {
        let handler = self.in_flight().get(station).map(Arc::clone);
        match handler {
            Some(handler) => {
                tracing::info!(%station, "aborting tef operation");
                handler.abort().await;
                true
            }
            None => {
                tracing::debug!(%station, "abort requested with no tef operation running");
                false
            }
        }
    }

    /// Returns `true` while an operation runs for `station`.
    #[must_use]
    pub fn is_running(&self, station: &StationId) -> bool {
        self.in_flight().contains_key(station)
    }

    async fn check_till(&self, station: &StationId, operation: &str) -> Result<(), HubError> {
        if self.settings.no_till_operations.contains(operation) {
            return Ok(());
        }
        match self.tills.last_till_status(station).await? {
            Some(TillStatus::Open) => Ok(()),
            _ => Err(HubError::TillNotOpen),
        }
    }

    async fn check_printer(&self, station: &StationId) -> Result<Option<bool>, HubError> {
        let printer_lock = self
            .coordinator
            .locks()
            .acquire(Device::Printer, AcquireMode::Blocking)
            .await?;
        self.supervisor
            .ensure_printer(&printer_lock, station, self.settings.printer_retries)
            .await
    }

    async fn finish(&self, station: &StationId, report: &OperationReport) {
        self.coordinator
            .events()
            .push_to_station(station, &report.to_event())
            .await;
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<StationId, Arc<dyn OperationHandler>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks an operation as running until dropped.
struct InFlight<'a> {
    service: &'a TefService,
    station: &'a StationId,
}

impl<'a> InFlight<'a> {
    fn register(
        service: &'a TefService,
        station: &'a StationId,
        handler: Arc<dyn OperationHandler>,
    ) -> Self {
        service.in_flight().insert(station.clone(), handler);
        Self { service, station }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.service.in_flight().remove(self.station);
    }
}
