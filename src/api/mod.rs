//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api/v1` and authenticate the
//! calling station with `Authorization: Bearer <token>`. The event stream
//! (`/stream`) and the system endpoints (`/health`, `/ping`) live at the
//! root.

pub mod auth;
pub mod dto;
pub mod handlers;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::app_state::AppState;
use crate::stream::stream_handler;

/// OpenAPI document of the hub.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "pos-device-hub",
        description = "Device coordination hub for point-of-sale terminals"
    ),
    paths(
        handlers::tef::start_operation,
        handlers::tef::submit_reply,
        handlers::tef::abort_operation,
        handlers::devices::drawer_status,
        handlers::devices::open_drawer,
        handlers::devices::devices_status,
        handlers::data::notify_data,
        handlers::system::health_handler,
        handlers::system::ping_handler,
        crate::stream::handler::stream_handler,
    ),
    components(schemas(crate::error::ErrorResponse, crate::error::ErrorBody)),
    modifiers(&BearerAuth),
    tags(
        (name = "TEF", description = "Interactive payment operations"),
        (name = "Devices", description = "Printer, drawer, SAT and pinpad"),
        (name = "Events", description = "Event stream and broadcasts"),
        (name = "System", description = "Health and liveness"),
    )
)]
pub struct ApiDoc;

#[derive(Debug)]
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
}

/// Builds the application: REST API, event stream, tracing and CORS layers.
pub fn build_app(state: AppState) -> Router {
    let router = Router::new()
        .merge(build_router())
        .route("/stream", get(stream_handler));

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::device::{PrinterSupervisor, SerialPrinterManager};
    use crate::domain::{DeviceCoordinator, Station, StationId, TillStatus};
    use crate::service::ports::NoPendingTransactions;
    use crate::service::{InMemoryDomain, OperationRegistry, TefService, TefSettings};

    fn app() -> (Router, Arc<InMemoryDomain>) {
        let domain = Arc::new(InMemoryDomain::new([(
            "tok-1".to_string(),
            Station::new("s1", "Caixa 1"),
        )]));
        let coordinator = Arc::new(DeviceCoordinator::new());
        let supervisor = Arc::new(PrinterSupervisor::new(
            Arc::new(SerialPrinterManager::new(None)),
            Duration::from_millis(1),
        ));
        let tef = Arc::new(TefService::new(
            Arc::clone(&coordinator),
            Arc::clone(&supervisor),
            Arc::new(OperationRegistry::new()),
            Arc::clone(&domain) as _,
            TefSettings::default(),
        ));
        let state = AppState {
            coordinator,
            supervisor,
            tef,
            stations: Arc::clone(&domain) as _,
            pending: Arc::new(NoPendingTransactions),
            sat_check: None,
            pinpad_check: None,
            printer_retries: 0,
        };
        (build_app(state), domain)
    }

    async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", "Bearer tok-1")
            .header("content-type", "application/json");
        let body = body.map_or_else(Body::empty, |value| Body::from(value.to_string()));
        let Ok(request) = builder.body(body) else {
            panic!("request builds");
        };
        let Ok(response) = app.oneshot(request).await;
        let status = response.status();
        let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
            panic!("body readable");
        };
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let (app, _) = app();
        let Ok(request) = Request::builder()
            .method("POST")
            .uri("/api/v1/tef/abort")
            .body(Body::empty())
        else {
            panic!("request builds");
        };
        let Ok(response) = app.oneshot(request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn abort_without_operation_reports_false() {
        let (app, _) = app();
        let (status, body) = call(app, "POST", "/api/v1/tef/abort", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"aborted": false}));
    }

    #[tokio::test]
    async fn unknown_operation_is_server_error() {
        let (app, domain) = app();
        domain.set_till_status(&StationId::from("s1"), TillStatus::Open);
        let (status, body) = call(app, "POST", "/api/v1/tef/Nope", Some(json!({}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], 3001);
    }

    #[tokio::test]
    async fn non_object_payload_is_bad_request() {
        let (app, _) = app();
        let (status, body) = call(app, "POST", "/api/v1/tef/Sale", Some(json!([1]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], 1001);
    }

    #[tokio::test]
    async fn reply_value_must_be_json_text() {
        let (app, _) = app();
        let (status, _) = call(
            app,
            "POST",
            "/api/v1/tef/reply",
            Some(json!({"value": "{not json"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn openapi_lists_every_endpoint() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/v1/tef/{operation}",
            "/api/v1/tef/reply",
            "/api/v1/tef/abort",
            "/api/v1/drawer",
            "/api/v1/devices/status",
            "/api/v1/data/notify",
            "/health",
            "/ping",
            "/stream",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let Some(components) = doc.components.as_ref() else {
            panic!("components present");
        };
        assert!(components.security_schemes.contains_key("bearer"));
    }
}
