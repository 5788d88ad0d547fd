//! In-memory domain collaborators.
//!
//! [`InMemoryDomain`] stands in for the external domain layer: a fixed set
//! of stations keyed by access token and a till status per station. The
//! server binary uses it when no domain service is wired in.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::ports::{StationDirectory, TillLedger};
use crate::domain::{Station, StationId, TillStatus};
use crate::error::HubError;

/// Station and till registry held in memory.
#[derive(Debug, Default)]
pub struct InMemoryDomain {
    stations: HashMap<String, Station>,
    tills: RwLock<HashMap<StationId, TillStatus>>,
}

impl InMemoryDomain {
    /// Creates a registry from `(token, station)` pairs.
    #[must_use]
    pub fn new(stations: impl IntoIterator<Item = (String, Station)>) -> Self {
        Self {
            stations: stations.into_iter().collect(),
            tills: RwLock::new(HashMap::new()),
        }
    }

    /// Sets the same till status for every known station.
    #[must_use]
    pub fn with_till_status(self, status: TillStatus) -> Self {
        for station in self.stations.values() {
            self.set_till_status(&station.id, status);
        }
        self
    }

    /// Records the till status of `station`.
    pub fn set_till_status(&self, station: &StationId, status: TillStatus) {
        self.tills
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(station.clone(), status);
    }

    /// Returns every known station.
    #[must_use]
    pub fn stations(&self) -> Vec<Station> {
        self.stations.values().cloned().collect()
    }
}

#[async_trait]
impl TillLedger for InMemoryDomain {
    async fn last_till_status(&self, station: &StationId) -> Result<Option<TillStatus>, HubError> {
        Ok(self
            .tills
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(station)
            .copied())
    }
}

#[async_trait]
impl StationDirectory for InMemoryDomain {
    async fn station_for_token(&self, token: &str) -> Result<Option<Station>, HubError> {
        Ok(self.stations.get(token).cloned())
    }
}
