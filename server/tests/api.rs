//! HTTP handler tests over in-memory fakes.
//!
//! Calls the Axum handlers directly with constructed extractors, asserting
//! the status-code contract of each endpoint.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use farewell_core::admission::{AdmissionController, AdmissionPolicy};
use farewell_core::application::{ApplicationStatus, ApplicationStore};
use farewell_core::counter::CounterStore;
use farewell_server::api::admin::{SetStockRequest, set_stock};
use farewell_server::api::apply::{ApplyRequest, apply};
use farewell_server::api::status::get_status;
use farewell_server::server::AppState;
use farewell_testing::mocks::{
    InMemoryAdmissionLock, InMemoryApplicationStore, InMemoryCounterStore,
    InMemoryOutcomeChannel,
};
use std::sync::Arc;
use std::time::Duration;

const STOCK_KEY: &str = "event:gift:stock";
const TOPIC: &str = "admission-outcomes";
const ADMIN_KEY: &str = "test-admin-key";

struct TestApp {
    state: AppState,
    counter: Arc<InMemoryCounterStore>,
    store: Arc<InMemoryApplicationStore>,
}

fn build_app() -> TestApp {
    let counter = Arc::new(InMemoryCounterStore::new());
    let lock = Arc::new(InMemoryAdmissionLock::new());
    let channel = Arc::new(InMemoryOutcomeChannel::new());
    let store = Arc::new(InMemoryApplicationStore::new());

    let controller = Arc::new(AdmissionController::new(
        counter.clone(),
        lock,
        channel,
        STOCK_KEY,
        TOPIC,
        AdmissionPolicy {
            lock_wait: Duration::from_millis(50),
            lock_lease: Duration::from_secs(1),
            publish_attempts: 3,
            publish_backoff_base: Duration::from_millis(1),
            publish_backoff_multiplier: 2,
        },
    ));

    let state = AppState::new(
        controller,
        store.clone(),
        counter.clone(),
        STOCK_KEY,
        ADMIN_KEY,
    );
    TestApp {
        state,
        counter,
        store,
    }
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn apply_grants_while_stocked() {
    let app = build_app();
    app.counter.set(STOCK_KEY, 1).await.unwrap();

    let response = apply(
        State(app.state.clone()),
        Json(ApplyRequest {
            identity: "a@example.com".to_string(),
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["decision"], "GRANTED");

    let response = apply(
        State(app.state),
        Json(ApplyRequest {
            identity: "b@example.com".to_string(),
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["decision"], "REJECTED");
}

#[tokio::test]
async fn apply_rejects_empty_identity() {
    let app = build_app();
    let response = apply(
        State(app.state),
        Json(ApplyRequest {
            identity: "   ".to_string(),
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn apply_is_unavailable_without_counter() {
    let app = build_app();
    let response = apply(
        State(app.state),
        Json(ApplyRequest {
            identity: "a@example.com".to_string(),
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn status_is_not_found_until_confirmed() {
    let app = build_app();

    let response = get_status(
        State(app.state.clone()),
        Path("a@example.com".to_string()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.store
        .insert("a@example.com", ApplicationStatus::Success)
        .await
        .unwrap();

    let response = get_status(State(app.state), Path("a@example.com".to_string())).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["identity"], "a@example.com");
    assert_eq!(body["status"], "SUCCESS");
}

#[tokio::test]
async fn stock_reset_requires_admin_key() {
    let app = build_app();

    let response = set_stock(
        State(app.state.clone()),
        HeaderMap::new(),
        Json(SetStockRequest { stock: 100 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let mut headers = HeaderMap::new();
    headers.insert("x-admin-key", HeaderValue::from_static("wrong-key"));
    let response = set_stock(
        State(app.state),
        headers,
        Json(SetStockRequest { stock: 100 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn stock_reset_applies_new_value() {
    let app = build_app();

    let mut headers = HeaderMap::new();
    headers.insert("x-admin-key", HeaderValue::from_static(ADMIN_KEY));

    let response = set_stock(
        State(app.state.clone()),
        headers.clone(),
        Json(SetStockRequest { stock: 250 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.counter.current(STOCK_KEY).await.unwrap(), 250);

    // Negative values are refused before touching the counter.
    let response = set_stock(
        State(app.state),
        headers,
        Json(SetStockRequest { stock: -1 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.counter.current(STOCK_KEY).await.unwrap(), 250);
}
