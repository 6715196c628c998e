//! Router configuration.

use super::health::{health_check, readiness_check};
use super::state::AppState;
use crate::api::{admin, apply, status};
use axum::{
    Router,
    routing::{get, post},
};

/// Build the complete Axum router.
///
/// - `POST /api/event/apply` - submit a claim and receive the decision
/// - `GET /api/event/status/:identity` - query the recorded outcome
/// - `POST /api/admin/stock` - reset the stock counter (admin key required)
/// - `GET /health`, `GET /ready` - probes
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/event/apply", post(apply::apply))
        .route("/event/status/:identity", get(status::get_status))
        .route("/admin/stock", post(admin::set_stock));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .with_state(state)
}
