//! Claim submission endpoint.
//!
//! `POST /api/event/apply` - the synchronous admission path. The response
//! carries the admission decision only; the durable application record is
//! written asynchronously by the outcome worker.

use crate::server::state::AppState;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use farewell_core::admission::AdmissionError;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Request to claim a gift.
#[derive(Debug, Deserialize)]
pub struct ApplyRequest {
    /// Verified identity of the requester (one claim per identity)
    pub identity: String,
}

/// Response carrying the admission decision.
#[derive(Debug, Serialize)]
pub struct ApplyResponse {
    /// "GRANTED" or "REJECTED"
    pub decision: String,
}

/// Error response body shared by all API endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error description
    pub error: String,
}

/// Submit a claim for one identity.
///
/// # Responses
///
/// - `200` with the decision (`GRANTED` or `REJECTED`)
/// - `400` when the identity is empty
/// - `409` when a request for the same identity is already in flight
/// - `503` when the stock counter is unavailable or uninitialized
/// - `500` when the outcome could not be durably enqueued
pub async fn apply(
    State(state): State<AppState>,
    Json(request): Json<ApplyRequest>,
) -> Response {
    let identity = request.identity.trim();
    if identity.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "identity must not be empty".to_string(),
            }),
        )
            .into_response();
    }

    match state.admission.admit(identity).await {
        Ok(decision) => {
            info!(identity, decision = decision.as_str(), "claim decided");
            (
                StatusCode::OK,
                Json(ApplyResponse {
                    decision: decision.as_str().to_string(),
                }),
            )
                .into_response()
        }
        Err(AdmissionError::AlreadyProcessing) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "a request for this identity is already being processed".to_string(),
            }),
        )
            .into_response(),
        Err(e @ AdmissionError::CounterUnavailable(_)) => {
            error!(identity, error = %e, "claim failed: counter unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!(identity, error = %e, "claim failed");
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
