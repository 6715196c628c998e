//! Claim status query endpoint.
//!
//! `GET /api/event/status/:identity` - reads the durable application record.
//! A missing record means "pending or never submitted", not failure: the
//! outcome may still be in flight through the channel.

use crate::api::apply::ErrorResponse;
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

/// Recorded outcome of a claim.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Identity the record belongs to
    pub identity: String,
    /// "SUCCESS" or "FAILURE"
    pub status: String,
    /// When the record was created
    pub created_at: DateTime<Utc>,
}

/// Look up the recorded outcome for one identity.
///
/// # Responses
///
/// - `200` with the record
/// - `404` when no record exists yet
pub async fn get_status(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> Response {
    match state.applications.find(&identity).await {
        Ok(Some(record)) => (
            StatusCode::OK,
            Json(StatusResponse {
                identity: record.identity,
                status: record.status.as_str().to_string(),
                created_at: record.created_at,
            }),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "no application recorded for this identity".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!(identity, error = %e, "status lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}
