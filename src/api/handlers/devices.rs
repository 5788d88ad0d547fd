//! Drawer and device status handlers.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::auth::CurrentStation;
use crate::api::dto::{DeviceStatusResponse, DrawerOpenedResponse};
use crate::app_state::AppState;
use crate::domain::{AcquireMode, Device};
use crate::error::{ErrorResponse, HubError};
use crate::service::pollers::device_status;

/// `GET /drawer` — Read the cash drawer.
///
/// Returns `true` (open), `false` (closed) or `null` (no printer configured).
///
/// # Errors
///
/// Returns [`HubError::Device`] when the printer stays unreachable after
/// every reconnection attempt.
#[utoipa::path(
    get,
    path = "/api/v1/drawer",
    tag = "Devices",
    summary = "Drawer status",
    description = "Checks the printer, reconnecting if needed, and returns whether the drawer is open. `null` when the station has no printer.",
    responses(
        (status = 200, description = "Drawer state, `null` without a printer", body = bool),
        (status = 503, description = "Printer unreachable", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn drawer_status(
    State(state): State<AppState>,
    CurrentStation(station): CurrentStation,
) -> Result<impl IntoResponse, HubError> {
    let printer_lock = state
        .coordinator
        .locks()
        .acquire(Device::Printer, AcquireMode::Blocking)
        .await?;
    let drawer_open = state
        .supervisor
        .ensure_printer(&printer_lock, &station.id, state.printer_retries)
        .await?;
    Ok(Json(drawer_open))
}

/// `POST /drawer` — Open the cash drawer.
///
/// # Errors
///
/// Returns [`HubError::PrinterNotConfigured`] without a printer and
/// [`HubError::Device`] on a printer fault.
#[utoipa::path(
    post,
    path = "/api/v1/drawer",
    tag = "Devices",
    summary = "Open the drawer",
    description = "Pulses the drawer kick connector of the receipt printer.",
    responses(
        (status = 200, description = "Drawer opened", body = DrawerOpenedResponse),
        (status = 409, description = "No printer configured", body = ErrorResponse),
        (status = 503, description = "Printer fault", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn open_drawer(
    State(state): State<AppState>,
    CurrentStation(station): CurrentStation,
) -> Result<impl IntoResponse, HubError> {
    let _printer_lock = state
        .coordinator
        .locks()
        .acquire(Device::Printer, AcquireMode::Blocking)
        .await?;
    let printer = state
        .supervisor
        .devices()
        .printer()
        .await?
        .ok_or(HubError::PrinterNotConfigured)?;
    printer.open_drawer().await?;
    tracing::info!(station = %station.id, "drawer opened");
    Ok(Json(DrawerOpenedResponse {
        status: "success".to_string(),
    }))
}

/// `GET /devices/status` — Current status of every device.
///
/// # Errors
///
/// Returns [`HubError::Unauthorized`] for an unknown token.
#[utoipa::path(
    get,
    path = "/api/v1/devices/status",
    tag = "Devices",
    summary = "Device status",
    description = "Reads SAT, pinpad and printer once. A busy or absent SAT or pinpad reports `true`; an unreadable printer reports `null`.",
    responses(
        (status = 200, description = "Device status", body = DeviceStatusResponse),
    ),
    security(("bearer" = []))
)]
pub async fn devices_status(
    State(state): State<AppState>,
    CurrentStation(station): CurrentStation,
) -> Result<impl IntoResponse, HubError> {
    let snapshot = device_status(
        &state.coordinator,
        &state.supervisor,
        &station.id,
        state.sat_check.as_deref(),
        state.pinpad_check.as_deref(),
    )
    .await;
    Ok(Json(DeviceStatusResponse::from(snapshot)))
}

/// Drawer and device routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/drawer", get(drawer_status).post(open_drawer))
        .route("/devices/status", get(devices_status))
}
