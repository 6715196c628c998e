//! HTTP server assembly.
//!
//! Contains the shared application state, the router, and the health
//! endpoints.

pub mod health;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
