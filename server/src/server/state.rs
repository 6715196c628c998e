//! Application state for the Farewell HTTP server.
//!
//! Contains all shared resources needed by HTTP handlers:
//! - Admission controller (the synchronous write side)
//! - Application store (the queryable read side)
//! - Counter store (for administrative stock resets)

use farewell_core::admission::AdmissionController;
use farewell_core::application::ApplicationStore;
use farewell_core::counter::CounterStore;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Cloned (cheaply via Arc) for each request.
#[derive(Clone)]
pub struct AppState {
    /// Admission controller deciding claims against the stock counter
    pub admission: Arc<AdmissionController>,

    /// Application record store for status queries
    pub applications: Arc<dyn ApplicationStore>,

    /// Counter store for administrative stock resets
    pub counter: Arc<dyn CounterStore>,

    /// Counter key holding the remaining stock
    pub stock_key: String,

    /// Shared secret required by administrative endpoints
    pub admin_key: String,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        admission: Arc<AdmissionController>,
        applications: Arc<dyn ApplicationStore>,
        counter: Arc<dyn CounterStore>,
        stock_key: impl Into<String>,
        admin_key: impl Into<String>,
    ) -> Self {
        Self {
            admission,
            applications,
            counter,
            stock_key: stock_key.into(),
            admin_key: admin_key.into(),
        }
    }
}
