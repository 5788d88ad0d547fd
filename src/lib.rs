//! # pos-device-hub
//!
//! Device coordination hub between a point-of-sale web frontend and the slow,
//! stateful hardware attached to a terminal: the receipt printer (and its cash
//! drawer), the card-payment pinpad driven through TEF operations, and the SAT
//! fiscal signing device.
//!
//! The hub owns three concerns. Mutually exclusive access to each device,
//! a per-station server-sent event stream that carries status and prompts to
//! the frontend, and the interactive TEF flow where a long blocking payment
//! operation asks the operator a question and waits for exactly one reply.
//! Sale, payment and fiscal logic stay in external collaborators reached
//! through the traits in [`device`] and [`service::ports`].
//!
//! ## Architecture
//!
//! ```text
//! Frontend (HTTP, SSE)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── Event stream (stream/)
//!     │
//!     ├── TefService, pollers (service/)
//!     ├── PrinterSupervisor (device/)
//!     │
//!     ├── DeviceCoordinator (domain/)
//!     │     ├── DeviceLocks
//!     │     ├── EventStream
//!     │     └── QuestionDesk
//!     │
//!     └── Device manager / operation handlers (external)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod device;
pub mod domain;
pub mod error;
pub mod service;
pub mod stream;
