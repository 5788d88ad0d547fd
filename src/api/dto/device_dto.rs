//! Device, drawer and broadcast DTOs.

use serde::Serialize;
use utoipa::ToSchema;

use crate::service::pollers::DeviceStatusSnapshot;

/// Response body for `GET /devices/status`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceStatusResponse {
    /// SAT working (or absent, or busy).
    pub sat_status: bool,
    /// Pinpad working (or absent, or busy).
    pub pinpad_status: bool,
    /// `null` when the printer cannot be read.
    pub printer_status: Option<bool>,
}

impl From<DeviceStatusSnapshot> for DeviceStatusResponse {
    fn from(snapshot: DeviceStatusSnapshot) -> Self {
        Self {
            sat_status: snapshot.sat,
            pinpad_status: snapshot.pinpad,
            printer_status: snapshot.printer,
        }
    }
}

/// Response body for `POST /drawer`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DrawerOpenedResponse {
    /// Always `"success"`.
    pub status: String,
}

/// Response body for `POST /data/notify`.
#[derive(Debug, Serialize, ToSchema)]
pub struct NotifyResponse {
    /// Stations with a live stream when the update was queued.
    pub subscribers: usize,
}
