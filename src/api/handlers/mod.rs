//! REST endpoint handlers organized by resource.

pub mod data;
pub mod devices;
pub mod system;
pub mod tef;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(tef::routes())
        .merge(devices::routes())
        .merge(data::routes())
}
