//! Farewell core - the limited-inventory admission and confirmation pipeline.
//!
//! A fixed, finite pool of gifts is claimed strictly first-come-first-served.
//! The synchronous side decides admission against an atomic stock counter;
//! the asynchronous side durably records exactly one outcome per identity.
//!
//! # Architecture
//!
//! ```text
//! Write side (synchronous admission):
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//! │  Admission   │──▶│ AdmissionLock │   │ CounterStore │
//! │  Controller  │   │ (per identity)│   │ (atomic DECR │
//! │              │──────────────────────▶│  with floor) │
//! └──────┬───────┘   └───────────────┘   └──────────────┘
//!        │
//!        ▼
//! ┌─────────────────┐
//! │ OutcomeChannel  │◄─── at-least-once, ordered per identity
//! └────────┬────────┘
//!          │
//! Read side (asynchronous confirmation):
//!          ▼
//! ┌─────────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │OutcomeProcessor │──▶│ ApplicationStore │   │ DeadLetter   │
//! │ (idempotent,    │   │ (unique per      │   │ Sink (after  │
//! │  bounded retry) │   │  identity)       │   │  exhaustion) │
//! └─────────────────┘   └──────────────────┘   └──────────────┘
//! ```
//!
//! # Key principles
//!
//! - **Atomic decrement**: the stock counter is only ever mutated through a
//!   single server-side decrement-with-floor operation; a transient negative
//!   is compensated within the same atomic step.
//! - **At-least-once delivery**: outcome messages may be redelivered; the
//!   consumer is idempotent via the unique identity constraint.
//! - **Explicit retry**: the attempt counter travels with the message and the
//!   consumer computes exponential backoff itself before republication.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod admission;
pub mod application;
pub mod channel;
pub mod consumer;
pub mod counter;
pub mod dead_letter;
pub mod lock;
pub mod notify;
pub mod outcome;

pub use admission::{AdmissionController, AdmissionError, AdmissionPolicy};
pub use application::{ApplicationRecord, ApplicationStatus, ApplicationStore, ApplicationStoreError};
pub use channel::{ChannelError, DeliveryAck, OutcomeChannel, OutcomeDelivery, OutcomeStream};
pub use consumer::{OutcomeProcessor, RetryPolicy};
pub use counter::{CounterError, CounterStore};
pub use dead_letter::{DeadLetterError, DeadLetterSink};
pub use lock::{AdmissionLock, LockError, LockToken};
pub use notify::{NotificationSender, NotifyError};
pub use outcome::{AdmissionOutcome, Decision};
