//! Data Transfer Objects for REST request/response serialization.

pub mod device_dto;
pub mod tef_dto;

pub use device_dto::*;
pub use tef_dto::*;
