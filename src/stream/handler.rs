//! Axum server-sent events handler.

use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use utoipa::IntoParams;

use super::connection::connect_station;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, HubError};

/// Query parameters of the stream endpoint.
#[derive(Debug, Deserialize, IntoParams)]
pub struct StreamParams {
    /// Access token of the station.
    pub token: String,
}

/// `GET /stream?token=` — Open the station's event stream.
///
/// Every event is sent as one `data: <json>` frame. The first frame is an
/// empty `{}` object.
///
/// # Errors
///
/// Returns [`HubError::Unauthorized`] when the token matches no station.
#[utoipa::path(
    get,
    path = "/stream",
    tag = "Events",
    summary = "Open the event stream",
    description = "Server-sent event stream for the station owning `token`. Opening it replaces the station's previous stream.",
    params(StreamParams),
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream"),
        (status = 401, description = "Unknown token", body = ErrorResponse),
    )
)]
pub async fn stream_handler(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, HubError> {
    let station = state
        .stations
        .station_for_token(&params.token)
        .await?
        .ok_or_else(|| HubError::Unauthorized("invalid stream token".to_string()))?;

    let source =
        connect_station(state.coordinator.events(), state.pending.as_ref(), &station.id).await;
    let frames = source.map(|payload| Ok(Event::default().data(payload.to_string())));

    Ok(Sse::new(frames).keep_alive(KeepAlive::default()))
}
