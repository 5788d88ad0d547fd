//! Server data broadcast handler.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::auth::CurrentStation;
use crate::api::dto::NotifyResponse;
use crate::app_state::AppState;
use crate::domain::PosEvent;
use crate::error::HubError;

/// `POST /data/notify` — Tell every station that server data changed.
///
/// The body is forwarded as the `data` of a `SERVER_UPDATE_DATA` event to
/// every open stream. Before the first stream ever opens, the event waits
/// for it.
///
/// # Errors
///
/// Returns [`HubError::Unauthorized`] for an unknown token.
#[utoipa::path(
    post,
    path = "/api/v1/data/notify",
    tag = "Events",
    summary = "Broadcast a data update",
    description = "Pushes SERVER_UPDATE_DATA with the request body to all stations.",
    request_body(content = Object, description = "Fresh data for the frontends"),
    responses(
        (status = 202, description = "Update queued", body = NotifyResponse),
    ),
    security(("bearer" = []))
)]
pub async fn notify_data(
    State(state): State<AppState>,
    CurrentStation(station): CurrentStation,
    Json(data): Json<serde_json::Value>,
) -> Result<impl IntoResponse, HubError> {
    let coordinator = Arc::clone(&state.coordinator);
    let subscribers = coordinator.events().subscriber_count();
    tracing::info!(station = %station.id, subscribers, "server data update");

    tokio::spawn(async move {
        coordinator
            .events()
            .push_to_all(&PosEvent::ServerUpdateData { data })
            .await;
    });

    Ok((StatusCode::ACCEPTED, Json(NotifyResponse { subscribers })))
}

/// Data routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/data/notify", post(notify_data))
}
