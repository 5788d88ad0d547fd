//! TEF operation DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{PartialFailureKind, StationId};
use crate::service::OperationReport;

/// Request body for `POST /tef/reply`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplyRequest {
    /// Reply encoded as JSON text, e.g. `"\"12345678900\""`.
    pub value: String,
}

/// Response body for `POST /tef/{operation}`.
///
/// Mirrors the `TEF_OPERATION_FINISHED` event sent on the stream.
#[derive(Debug, Serialize, ToSchema)]
pub struct OperationReportResponse {
    /// Operation that ran.
    pub operation: String,
    /// Station it ran for.
    #[schema(value_type = String)]
    pub station: StationId,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Message shown to the operator.
    pub message: String,
    /// Set on partial success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<PartialFailureKind>,
    /// Record a partial success refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    /// Completion timestamp.
    pub finished_at: DateTime<Utc>,
}

impl OperationReportResponse {
    /// Builds the response for `operation` run by `station`.
    #[must_use]
    pub fn new(operation: String, station: StationId, report: OperationReport) -> Self {
        let (error_type, record_id) = report
            .partial
            .map_or((None, None), |p| (Some(p.kind), Some(p.record_id)));
        Self {
            operation,
            station,
            success: report.success,
            message: report.message,
            error_type,
            record_id,
            finished_at: Utc::now(),
        }
    }
}

/// Response body for `POST /tef/abort`.
#[derive(Debug, Serialize, ToSchema)]
pub struct AbortResponse {
    /// `false` when no operation was running for the station.
    pub aborted: bool,
}
