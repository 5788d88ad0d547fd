//! Hub error types with HTTP status code mapping.
//!
//! [`HubError`] is the central error type. Each variant maps to a specific
//! HTTP status code and structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::device::DeviceFault;
use crate::domain::{Device, StationId};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2003,
///     "message": "no question pending for station till-01",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category            | HTTP Status                    |
/// |-----------|---------------------|--------------------------------|
/// | 1000–1999 | Validation / auth   | 400 Bad Request / 401          |
/// | 2000–2999 | State / precondition| 409 Conflict / 423 Locked      |
/// | 3000–3999 | Server / deployment | 500 / 502                      |
/// | 4000–4999 | Device              | 503 Service Unavailable        |
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or unknown station token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The operation requires an open till and the station has none.
    #[error("There is no till open")]
    TillNotOpen,

    /// A non-blocking lock acquisition found the device busy.
    #[error("device {0} is locked")]
    LockContention(Device),

    /// A reply was submitted while the station had no pending question.
    #[error("no question pending for station {0}")]
    NoPendingQuestion(StationId),

    /// A caller broke a contract of the hub (integration bug).
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    /// The drawer was asked to open but no printer is configured.
    #[error("printer not configured in this station")]
    PrinterNotConfigured,

    /// No handler is registered for the named operation.
    #[error("no handler registered for operation {0}")]
    UnknownOperation(String),

    /// A second handler was registered for the same operation.
    #[error("operation {0} already has a handler")]
    DuplicateOperation(String),

    /// Transport-level device failure.
    #[error("device error: {0}")]
    Device(#[from] DeviceFault),

    /// An external domain collaborator failed.
    #[error("domain error: {0}")]
    Domain(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HubError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::Unauthorized(_) => 1002,
            Self::TillNotOpen => 2001,
            Self::LockContention(_) => 2002,
            Self::NoPendingQuestion(_) => 2003,
            Self::PreconditionViolation(_) => 2004,
            Self::PrinterNotConfigured => 2005,
            Self::Internal(_) => 3000,
            Self::UnknownOperation(_) => 3001,
            Self::DuplicateOperation(_) => 3002,
            Self::Domain(_) => 3003,
            Self::Device(_) => 4001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::TillNotOpen
            | Self::NoPendingQuestion(_)
            | Self::PreconditionViolation(_)
            | Self::PrinterNotConfigured => StatusCode::CONFLICT,
            Self::LockContention(_) => StatusCode::LOCKED,
            Self::UnknownOperation(_) | Self::DuplicateOperation(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Domain(_) => StatusCode::BAD_GATEWAY,
            Self::Device(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
