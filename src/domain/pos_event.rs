//! Events pushed to the frontend over the station event stream.
//!
//! Every notification the hub sends is a [`PosEvent`]. Events serialize to a
//! single JSON object whose `type` field names the event, e.g.
//! `{"type":"DEVICE_STATUS_CHANGED","device":"sat","status":true}`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Device, TillStatus};

/// Category of a partial success: the hardware action went through but a
/// follow-up step did not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PartialFailureKind {
    /// The fiscal document was emitted but its receipt could not be printed.
    Printing,
    /// The fiscal document was rejected by the authority.
    Rejection,
}

/// Snapshot of the last till attached to `CHECK_TILL_FINISHED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastTill {
    /// Status of the last till, `null` when the station never had one.
    pub status: Option<TillStatus>,
}

/// Notification delivered to a station's frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PosEvent {
    /// Catalog or configuration data changed on the server.
    ServerUpdateData {
        /// Fresh data for the frontend.
        data: serde_json::Value,
    },

    /// The cash drawer was observed open.
    DrawerAlertOpen,

    /// The cash drawer was observed closed.
    DrawerAlertClose,

    /// The drawer state could not be read.
    DrawerAlertError,

    /// A device went from working to faulty or back.
    DeviceStatusChanged {
        /// Device whose status changed.
        device: Device,
        /// `true` when working; `false` or `null` when not.
        status: Option<bool>,
    },

    /// Status text from a running TEF operation.
    TefDisplayMessage {
        /// Text to show.
        message: String,
        /// Whether the operator may abort at this point.
        can_abort: bool,
    },

    /// A TEF operation needs an answer from the operator.
    TefAskQuestion {
        /// Question descriptor, passed through from the operation handler.
        data: serde_json::Value,
    },

    /// Terminal event of an interactive operation.
    TefOperationFinished {
        /// Whether the operation succeeded.
        success: bool,
        /// Message to show to the operator.
        message: String,
        /// Set when the operation only partially succeeded.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_type: Option<PartialFailureKind>,
        /// Identifier of the record a partial success refers to.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        record_id: Option<String>,
    },

    /// Warning about a previous TEF transaction.
    TefWarningMessage {
        /// Warning text.
        message: String,
    },

    /// The frontend must discard the sale in progress.
    ClearSale,

    /// A new working day started; carries the last till status.
    CheckTillFinished {
        /// Last till of the station.
        #[serde(rename = "lastTill")]
        last_till: LastTill,
    },

    /// Progress of a fiscal document emission.
    NfeProgress {
        /// Progress text.
        message: String,
    },

    /// Non-fatal problem during fiscal document emission.
    NfeWarning {
        /// Warning text.
        message: String,
        /// Extra details from the fiscal plugin.
        details: serde_json::Value,
    },

    /// Fiscal document emitted.
    NfeSuccess {
        /// Success text.
        message: String,
        /// Extra details from the fiscal plugin.
        details: serde_json::Value,
    },
}

impl PosEvent {
    /// Returns the wire value of the `type` field.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::ServerUpdateData { .. } => "SERVER_UPDATE_DATA",
            Self::DrawerAlertOpen => "DRAWER_ALERT_OPEN",
            Self::DrawerAlertClose => "DRAWER_ALERT_CLOSE",
            Self::DrawerAlertError => "DRAWER_ALERT_ERROR",
            Self::DeviceStatusChanged { .. } => "DEVICE_STATUS_CHANGED",
            Self::TefDisplayMessage { .. } => "TEF_DISPLAY_MESSAGE",
            Self::TefAskQuestion { .. } => "TEF_ASK_QUESTION",
            Self::TefOperationFinished { .. } => "TEF_OPERATION_FINISHED",
            Self::TefWarningMessage { .. } => "TEF_WARNING_MESSAGE",
            Self::ClearSale => "CLEAR_SALE",
            Self::CheckTillFinished { .. } => "CHECK_TILL_FINISHED",
            Self::NfeProgress { .. } => "NFE_PROGRESS",
            Self::NfeWarning { .. } => "NFE_WARNING",
            Self::NfeSuccess { .. } => "NFE_SUCCESS",
        }
    }

    /// Serializes the event into the JSON object sent on the stream.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
