//! HTTP API endpoints.

pub mod admin;
pub mod apply;
pub mod status;
