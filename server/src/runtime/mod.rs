//! Background runtime components.

pub mod worker;

pub use worker::OutcomeWorker;
