//! Domain layer: stations, devices, events and the coordination primitives.
//!
//! This module contains the hub's core state: per-device locks, the
//! per-station event queues with their readiness gate, and the per-station
//! pending-question slots, bundled into a [`DeviceCoordinator`].

pub mod coordinator;
pub mod device;
pub mod device_lock;
pub mod event_stream;
pub mod pos_event;
pub mod question_desk;
pub mod station;

pub use coordinator::DeviceCoordinator;
pub use device::{Device, TillStatus};
pub use device_lock::{AcquireMode, DeviceGuard, DeviceLock, DeviceLocks};
pub use event_stream::{EventSource, EventStream};
pub use pos_event::{LastTill, PartialFailureKind, PosEvent};
pub use question_desk::QuestionDesk;
pub use station::{Station, StationId};
