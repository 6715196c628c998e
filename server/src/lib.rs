//! Farewell HTTP server and outcome worker.
//!
//! Wires the pipeline together:
//!
//! - Redis backs the stock counter and the per-identity admission locks
//! - RedPanda carries the admission outcomes
//! - `PostgreSQL` holds the application records and the dead letters
//!
//! The binary serves the claim API and runs the outcome worker in the same
//! process; both sides share one channel handle.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod config;
pub mod notify;
pub mod runtime;
pub mod server;

pub use config::Config;
pub use notify::LogNotificationSender;
pub use runtime::OutcomeWorker;
pub use server::{AppState, build_router};
