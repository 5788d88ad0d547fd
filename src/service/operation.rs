//! Interactive operation handlers and their registry.
//!
//! An [`OperationHandler`] drives one blocking external operation, typically
//! a TEF payment or administrative function. While it runs it talks to the
//! operator through the [`TefSession`] it is handed: status messages,
//! at most one question at a time, and receipt printing.
//!
//! The [`OperationRegistry`] maps an operation name to exactly one handler.
//! Registering a second handler for a name fails at registration time.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::device::DeviceManager;
use crate::domain::{AcquireMode, Device, DeviceCoordinator, PartialFailureKind, PosEvent, StationId};
use crate::error::HubError;

/// Message shown when a failed operation carries no user-facing text.
pub const GENERIC_FAILURE_MESSAGE: &str = "Falha na operação";

/// Request payload handed to a handler.
pub type OperationPayload = serde_json::Map<String, serde_json::Value>;

/// Failure raised by an operation handler.
///
/// `reason` is for logs; `user_message`, when present, is shown to the
/// operator verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct OperationFailure {
    reason: String,
    user_message: Option<String>,
}

impl OperationFailure {
    /// Failure without operator-facing text.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            user_message: None,
        }
    }

    /// Failure with a message for the operator.
    #[must_use]
    pub fn with_user_message(reason: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            user_message: Some(user_message.into()),
        }
    }

    /// Builds a failure from positional details reported by a driver.
    ///
    /// Exactly two details are read as `(reason, user message)`; any other
    /// count carries no user message.
    #[must_use]
    pub fn from_details(details: Vec<String>) -> Self {
        match <[String; 2]>::try_from(details) {
            Ok([reason, user_message]) => Self::with_user_message(reason, user_message),
            Err(details) => Self::new(details.join(": ")),
        }
    }

    /// Returns the diagnostic reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Returns the operator-facing message, if any.
    #[must_use]
    pub fn user_message(&self) -> Option<&str> {
        self.user_message.as_deref()
    }

    /// Returns the message to show: the user message or the generic fallback.
    #[must_use]
    pub fn display_message(&self) -> &str {
        self.user_message().unwrap_or(GENERIC_FAILURE_MESSAGE)
    }
}

impl From<HubError> for OperationFailure {
    fn from(err: HubError) -> Self {
        Self::new(err.to_string())
    }
}

/// Follow-up step that failed after the main action succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialFailure {
    /// What kind of follow-up failed.
    pub kind: PartialFailureKind,
    /// Record the operator may retry against (e.g. a sale id).
    pub record_id: String,
    /// Why the follow-up failed, for logs.
    pub reason: Option<String>,
}

/// Successful result of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOutcome {
    /// Message to show to the operator.
    pub message: String,
    /// Set when only part of the operation went through.
    pub partial: Option<PartialFailure>,
}

impl OperationOutcome {
    /// Complete success.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            partial: None,
        }
    }

    /// Success of the main action with a failed follow-up.
    #[must_use]
    pub fn partial(
        message: impl Into<String>,
        kind: PartialFailureKind,
        record_id: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            partial: Some(PartialFailure {
                kind,
                record_id: record_id.into(),
                reason: None,
            }),
        }
    }

    /// Attaches a diagnostic reason to the partial failure, if any.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        if let Some(partial) = self.partial.as_mut() {
            partial.reason = Some(reason.into());
        }
        self
    }
}

/// Driver of one named interactive operation.
#[async_trait]
pub trait OperationHandler: Send + Sync + fmt::Debug {
    /// Runs the operation to completion. May call back into `session` any
    /// number of times.
    async fn execute(
        &self,
        session: &TefSession,
        payload: OperationPayload,
    ) -> Result<OperationOutcome, OperationFailure>;

    /// Asks a running operation to stop. Cooperative; the default ignores it.
    async fn abort(&self) {}
}

/// Channel between a running handler and the station's frontend.
#[derive(Debug, Clone)]
pub struct TefSession {
    station: StationId,
    coordinator: Arc<DeviceCoordinator>,
    devices: Arc<dyn DeviceManager>,
}

impl TefSession {
    /// Creates a session for `station`.
    #[must_use]
    pub fn new(
        station: StationId,
        coordinator: Arc<DeviceCoordinator>,
        devices: Arc<dyn DeviceManager>,
    ) -> Self {
        Self {
            station,
            coordinator,
            devices,
        }
    }

    /// Returns the station the operation runs for.
    #[must_use]
    pub const fn station(&self) -> &StationId {
        &self.station
    }

    /// Shows a status message and returns once the frontend stream has taken
    /// it, so the handler's next blocking call does not hold it back.
    pub async fn message(&self, message: impl Into<String>, can_abort: bool) {
        let event = PosEvent::TefDisplayMessage {
            message: message.into(),
            can_abort,
        };
        self.coordinator
            .events()
            .push_to_station_flushed(&self.station, &event)
            .await;
    }

    /// Asks the operator a question and waits for the reply.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Internal`] if the question was torn down.
    pub async fn question(&self, data: serde_json::Value) -> Result<serde_json::Value, HubError> {
        self.coordinator
            .questions()
            .ask(self.coordinator.events(), &self.station, data)
            .await
    }

    /// Prints the merchant and/or holder receipt copies, each followed by a
    /// paper cut. Copies that are absent or empty are skipped; without a
    /// printer nothing is printed.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Device`] on a printer fault.
    pub async fn print(&self, holder: Option<&str>, merchant: Option<&str>) -> Result<(), HubError> {
        let _printer_lock = self
            .coordinator
            .locks()
            .acquire(Device::Printer, AcquireMode::Blocking)
            .await?;
        let Some(printer) = self.devices.printer().await? else {
            return Ok(());
        };
        for copy in [merchant, holder]
            .into_iter()
            .flatten()
            .filter(|copy| !copy.is_empty())
        {
            printer.print_line(copy).await?;
            printer.cut_paper().await?;
        }
        Ok(())
    }
}

/// Registry of operation handlers keyed by operation name.
#[derive(Debug, Default)]
pub struct OperationRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn OperationHandler>>>,
}

impl OperationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::DuplicateOperation`] if `name` already has a
    /// handler.
    pub fn register(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn OperationHandler>,
    ) -> Result<(), HubError> {
        let name = name.into();
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if handlers.contains_key(&name) {
            return Err(HubError::DuplicateOperation(name));
        }
        tracing::info!(operation = %name, "operation handler registered");
        handlers.insert(name, handler);
        Ok(())
    }

    /// Returns the handler for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownOperation`] if nothing is registered.
    pub fn get(&self, name: &str) -> Result<Arc<dyn OperationHandler>, HubError> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| HubError::UnknownOperation(name.to_string()))
    }

    /// Returns the registered operation names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
