//! TEF handlers: start an operation, reply to a question, abort.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::auth::CurrentStation;
use crate::api::dto::{AbortResponse, OperationReportResponse, ReplyRequest};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, HubError};
use crate::service::OperationPayload;

/// `POST /tef/{operation}` — Run an interactive TEF operation.
///
/// The call returns when the operation has finished. The operation itself
/// runs on its own task, so a client that disconnects does not interrupt
/// the hardware.
///
/// # Errors
///
/// Returns [`HubError`] on a malformed body, a missing till or an
/// unregistered operation.
#[utoipa::path(
    post,
    path = "/api/v1/tef/{operation}",
    tag = "TEF",
    summary = "Run a TEF operation",
    description = "Runs the named operation for the calling station. Progress, questions and the final result are pushed on the station's event stream; the result is also returned. A top-level `origin` field is removed before dispatch.",
    params(("operation" = String, Path, description = "Registered operation name")),
    request_body(content = Object, description = "Operation payload"),
    responses(
        (status = 200, description = "Operation finished", body = OperationReportResponse),
        (status = 400, description = "Body is not a JSON object", body = ErrorResponse),
        (status = 401, description = "Unknown token", body = ErrorResponse),
        (status = 409, description = "No till open", body = ErrorResponse),
        (status = 500, description = "Operation not registered", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn start_operation(
    State(state): State<AppState>,
    CurrentStation(station): CurrentStation,
    Path(operation): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, HubError> {
    let payload = parse_payload(&body)?;

    let tef = Arc::clone(&state.tef);
    let station_id = station.id.clone();
    let name = operation.clone();
    let report = tokio::spawn(async move { tef.start(&station_id, &name, payload).await })
        .await
        .map_err(|e| HubError::Internal(format!("tef task failed: {e}")))??;

    Ok(Json(OperationReportResponse::new(operation, station.id, report)))
}

/// `POST /tef/reply` — Answer the pending question.
///
/// # Errors
///
/// Returns [`HubError::NoPendingQuestion`] when the station is not waiting
/// for a reply, [`HubError::InvalidRequest`] when `value` is not JSON text.
#[utoipa::path(
    post,
    path = "/api/v1/tef/reply",
    tag = "TEF",
    summary = "Reply to a TEF question",
    description = "Delivers the decoded `value` to the operation waiting on a question for the calling station.",
    request_body = ReplyRequest,
    responses(
        (status = 204, description = "Reply delivered"),
        (status = 400, description = "Value is not JSON text", body = ErrorResponse),
        (status = 409, description = "No question pending", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn submit_reply(
    State(state): State<AppState>,
    CurrentStation(station): CurrentStation,
    Json(req): Json<ReplyRequest>,
) -> Result<impl IntoResponse, HubError> {
    state.tef.submit_encoded_reply(&station.id, &req.value)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /tef/abort` — Ask the running operation to stop.
///
/// # Errors
///
/// Returns [`HubError::Unauthorized`] for an unknown token.
#[utoipa::path(
    post,
    path = "/api/v1/tef/abort",
    tag = "TEF",
    summary = "Abort the running TEF operation",
    description = "Forwards a cooperative abort to the operation running for the calling station. The operation still ends with its own TEF_OPERATION_FINISHED event.",
    responses(
        (status = 200, description = "Abort forwarded or nothing to abort", body = AbortResponse),
    ),
    security(("bearer" = []))
)]
pub async fn abort_operation(
    State(state): State<AppState>,
    CurrentStation(station): CurrentStation,
) -> Result<impl IntoResponse, HubError> {
    let aborted = state.tef.abort(&station.id).await;
    Ok(Json(AbortResponse { aborted }))
}

fn parse_payload(body: &[u8]) -> Result<OperationPayload, HubError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(OperationPayload::new());
    }
    match serde_json::from_slice(body) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(HubError::InvalidRequest(
            "operation payload must be a JSON object".to_string(),
        )),
        Err(e) => Err(HubError::InvalidRequest(format!("malformed JSON: {e}"))),
    }
}

/// TEF routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tef/reply", post(submit_reply))
        .route("/tef/abort", post(abort_operation))
        .route("/tef/{operation}", post(start_operation))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_empty_payload() {
        let Ok(payload) = parse_payload(b"  ") else {
            panic!("empty body accepted");
        };
        assert!(payload.is_empty());
    }

    #[test]
    fn object_body_is_payload() {
        let Ok(payload) = parse_payload(br#"{"value": "10.00", "origin": "pos"}"#) else {
            panic!("object accepted");
        };
        assert_eq!(payload.len(), 2);
    }

    #[test]
    fn non_object_body_is_rejected() {
        assert!(matches!(
            parse_payload(b"[1, 2]"),
            Err(HubError::InvalidRequest(_))
        ));
        assert!(matches!(
            parse_payload(b"{oops"),
            Err(HubError::InvalidRequest(_))
        ));
    }
}
