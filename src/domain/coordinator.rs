//! Process-wide device coordinator.
//!
//! One [`DeviceCoordinator`] is built at startup and shared by reference with
//! every request handler and poller. It owns the device locks, the station
//! event queues and the pending-question slots; there is no hidden global
//! state anywhere else.

use super::{DeviceLocks, EventStream, QuestionDesk};

/// Shared coordination state for one deployment's devices.
#[derive(Debug, Default)]
pub struct DeviceCoordinator {
    locks: DeviceLocks,
    events: EventStream,
    questions: QuestionDesk,
}

impl DeviceCoordinator {
    /// Creates a coordinator with released locks and no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the device locks.
    #[must_use]
    pub const fn locks(&self) -> &DeviceLocks {
        &self.locks
    }

    /// Returns the event broadcaster.
    #[must_use]
    pub const fn events(&self) -> &EventStream {
        &self.events
    }

    /// Returns the pending-question slots.
    #[must_use]
    pub const fn questions(&self) -> &QuestionDesk {
        &self.questions
    }
}
