//! Event stream endpoint.
//!
//! The frontend opens `GET /stream?token=<station token>` and keeps it open.
//! Each station has one live stream; opening a new one retires the old.

pub mod connection;
pub mod handler;

pub use connection::{PENDING_TRANSACTION_WARNING, connect_station};
pub use handler::stream_handler;
