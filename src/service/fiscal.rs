//! Fiscal document progress relay.
//!
//! Fiscal plugins running inside a sale flow report emission progress through
//! a [`FiscalNotifier`], which forwards it to the station's event stream as
//! `NFE_*` events.

use std::sync::Arc;

use crate::domain::{DeviceCoordinator, PosEvent, StationId};

/// Publisher of fiscal emission progress for one station.
#[derive(Debug, Clone)]
pub struct FiscalNotifier {
    coordinator: Arc<DeviceCoordinator>,
    station: StationId,
}

impl FiscalNotifier {
    /// Creates a notifier bound to `station`.
    #[must_use]
    pub fn new(coordinator: Arc<DeviceCoordinator>, station: StationId) -> Self {
        Self {
            coordinator,
            station,
        }
    }

    /// Reports a progress step.
    pub async fn progress(&self, message: impl Into<String>) -> bool {
        self.publish(PosEvent::NfeProgress {
            message: message.into(),
        })
        .await
    }

    /// Reports a recoverable problem.
    pub async fn warning(&self, message: impl Into<String>, details: serde_json::Value) -> bool {
        self.publish(PosEvent::NfeWarning {
            message: message.into(),
            details,
        })
        .await
    }

    /// Reports a successful emission.
    pub async fn success(&self, message: impl Into<String>, details: serde_json::Value) -> bool {
        self.publish(PosEvent::NfeSuccess {
            message: message.into(),
            details,
        })
        .await
    }

    async fn publish(&self, event: PosEvent) -> bool {
        tracing::debug!(station = %self.station, kind = event.event_type_str(), "fiscal notification");
        self.coordinator
            .events()
            .push_to_station(&self.station, &event)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn relays_nfe_events_in_order() {
        let coordinator = Arc::new(DeviceCoordinator::new());
        let station = StationId::from("s1");
        let mut source = coordinator.events().subscribe(&station);
        let notifier = FiscalNotifier::new(Arc::clone(&coordinator), station);

        assert!(notifier.progress("Assinando").await);
        assert!(notifier.warning("Contingência", json!({"code": 108})).await);
        assert!(notifier.success("Autorizada", json!({"key": "3519"})).await);

        let mut received = Vec::new();
        for _ in 0..4 {
            let Some(event) = source.next_event().await else {
                panic!("stream ended early");
            };
            received.push(event);
        }
        assert_eq!(
            received,
            vec![
                json!({}),
                json!({"type": "NFE_PROGRESS", "message": "Assinando"}),
                json!({"type": "NFE_WARNING", "message": "Contingência", "details": {"code": 108}}),
                json!({"type": "NFE_SUCCESS", "message": "Autorizada", "details": {"key": "3519"}}),
            ]
        );
    }

    #[tokio::test]
    async fn unsubscribed_station_drops_notification() {
        let coordinator = Arc::new(DeviceCoordinator::new());
        let _other = coordinator.events().subscribe(&StationId::from("s2"));
        let notifier = FiscalNotifier::new(coordinator, StationId::from("s1"));
        assert!(!notifier.progress("Assinando").await);
    }
}
