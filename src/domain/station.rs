//! Station identity.
//!
//! A [`Station`] is one physical terminal. Stations are created and looked up
//! by the domain layer; the hub only references them to route events and to
//! key per-station state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a point-of-sale station.
///
/// The primary key for per-station event routing and for the pending
/// question slot. Opaque to the hub.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(String);

impl StationId {
    /// Wraps a raw station identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A point-of-sale terminal as seen by the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    /// Station identifier.
    pub id: StationId,
    /// Human-readable station name.
    pub name: String,
}

impl Station {
    /// Creates a station with the given id and name.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: StationId::new(id),
            name: name.into(),
        }
    }
}
