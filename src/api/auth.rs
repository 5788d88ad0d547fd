//! Bearer-token station extractor.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::app_state::AppState;
use crate::domain::Station;
use crate::error::HubError;

/// Station owning the request's `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct CurrentStation(pub Station);

impl FromRequestParts<AppState> for CurrentStation {
    type Rejection = HubError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| HubError::Unauthorized("missing bearer token".to_string()))?;

        state
            .stations
            .station_for_token(token)
            .await?
            .map(Self)
            .ok_or_else(|| HubError::Unauthorized("unknown token".to_string()))
    }
}
