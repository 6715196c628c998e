//! Administrative endpoints.
//!
//! `POST /api/admin/stock` resets the stock counter. The reset may happen at
//! any time, including while admissions are in flight; the new value becomes
//! the base for subsequent decrements.

use crate::api::apply::ErrorResponse;
use crate::server::state::AppState;
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Header carrying the shared admin secret.
const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Request to reset the stock counter.
#[derive(Debug, Deserialize)]
pub struct SetStockRequest {
    /// New stock value (non-negative)
    pub stock: i64,
}

/// Response after a stock reset.
#[derive(Debug, Serialize)]
pub struct SetStockResponse {
    /// The value the counter was set to
    pub stock: i64,
}

/// Reset the stock counter to an arbitrary non-negative value.
///
/// # Responses
///
/// - `200` with the applied value
/// - `400` when the value is negative
/// - `403` when the admin key is missing or wrong
/// - `503` when the counter store is unavailable
pub async fn set_stock(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SetStockRequest>,
) -> Response {
    let presented = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if presented != state.admin_key {
        warn!("stock reset rejected: invalid admin key");
        return (
            StatusCode::FORBIDDEN,
            Json(ErrorResponse {
                error: "invalid admin key".to_string(),
            }),
        )
            .into_response();
    }

    if request.stock < 0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "stock must be non-negative".to_string(),
            }),
        )
            .into_response();
    }

    match state.counter.set(&state.stock_key, request.stock).await {
        Ok(()) => {
            info!(stock = request.stock, "stock counter reset");
            metrics::counter!("admin.stock_resets").increment(1);
            (
                StatusCode::OK,
                Json(SetStockResponse {
                    stock: request.stock,
                }),
            )
                .into_response()
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}
