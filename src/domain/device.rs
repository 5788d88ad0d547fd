//! Device classes guarded by the hub and till status values.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A class of physical device. One lock exists per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Receipt printer, which also drives the cash drawer.
    Printer,
    /// Card-payment terminal used by TEF operations.
    Pinpad,
    /// Fiscal signing and transmission device.
    Sat,
}

impl Device {
    /// Returns the device name as used on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Printer => "printer",
            Self::Pinpad => "pinpad",
            Self::Sat => "sat",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a station's cash-accounting session, as reported by the
/// domain layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TillStatus {
    /// Created but not opened yet.
    Pending,
    /// Open for sales.
    Open,
    /// Closed at the end of the day.
    Closed,
    /// Closed and verified by a supervisor.
    Verified,
}
