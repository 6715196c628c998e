//! Outcome channel abstraction.
//!
//! The channel carries [`AdmissionOutcome`] messages from the admission
//! controller to the outcome consumer, decoupling admission latency from
//! confirmation work.
//!
//! # Delivery semantics
//!
//! - **Durable**: a successful `publish` means the message is durably
//!   enqueued before the admission call returns.
//! - **At-least-once**: messages may be redelivered; consumers must be
//!   idempotent (the unique identity constraint downstream).
//! - **Ordered per identity**: implementations key messages by identity so
//!   ordering holds within a partition. No cross-identity ordering is
//!   assumed anywhere in the pipeline.
//! - **Acknowledged after processing**: each delivery carries a
//!   [`DeliveryAck`]; the transport marks the message consumed only once
//!   [`DeliveryAck::complete`] fires, so a crash mid-processing redelivers
//!   the message instead of losing it.

use crate::outcome::AdmissionOutcome;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors that can occur during channel operations.
#[derive(Error, Debug, Clone)]
pub enum ChannelError {
    /// Failed to connect to the channel backend.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an outcome to a topic.
    #[error("publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed.
        topic: String,
        /// The reason for failure.
        reason: String,
    },

    /// Failed to subscribe to a topic.
    #[error("subscription failed for topic '{topic}': {reason}")]
    SubscriptionFailed {
        /// The topic that failed to subscribe.
        topic: String,
        /// The reason for failure.
        reason: String,
    },

    /// Failed to decode a delivered message.
    #[error("deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Network or transport error while consuming.
    #[error("transport error: {0}")]
    TransportError(String),
}

/// Stream of outcome deliveries from a subscription.
///
/// Each item is a `Result` so transport and decode errors surface inline
/// without tearing down the stream.
pub type OutcomeStream = Pin<Box<dyn Stream<Item = Result<OutcomeDelivery, ChannelError>> + Send>>;

/// One delivered outcome paired with its deferred acknowledgement.
///
/// The transport holds the message's offset open until the consumer calls
/// [`DeliveryAck::complete`], so an outcome that was delivered but not yet
/// persisted (or durably republished) is redelivered after a crash.
#[derive(Debug)]
pub struct OutcomeDelivery {
    outcome: AdmissionOutcome,
    ack: DeliveryAck,
}

impl OutcomeDelivery {
    /// Delivery with no transport acknowledgement behind it.
    ///
    /// Used by in-memory transports where nothing needs committing.
    #[must_use]
    pub const fn unacked(outcome: AdmissionOutcome) -> Self {
        Self {
            outcome,
            ack: DeliveryAck::noop(),
        }
    }

    /// Delivery whose transport commits the message once the returned
    /// acknowledgement completes.
    #[must_use]
    pub const fn with_ack(outcome: AdmissionOutcome, ack: oneshot::Sender<()>) -> Self {
        Self {
            outcome,
            ack: DeliveryAck(Some(ack)),
        }
    }

    /// The delivered outcome.
    #[must_use]
    pub const fn outcome(&self) -> &AdmissionOutcome {
        &self.outcome
    }

    /// Split into the outcome and its acknowledgement handle.
    #[must_use]
    pub fn into_parts(self) -> (AdmissionOutcome, DeliveryAck) {
        (self.outcome, self.ack)
    }
}

/// Deferred acknowledgement of one delivery.
///
/// Dropping it without calling [`complete`](Self::complete) leaves the
/// message uncommitted, so the transport redelivers it.
#[derive(Debug)]
pub struct DeliveryAck(Option<oneshot::Sender<()>>);

impl DeliveryAck {
    /// Acknowledgement with no transport behind it.
    #[must_use]
    pub const fn noop() -> Self {
        Self(None)
    }

    /// Mark the delivery fully processed, letting the transport commit it.
    pub fn complete(self) {
        if let Some(tx) = self.0 {
            let _ = tx.send(());
        }
    }
}

/// Durable, ordered, at-least-once message channel for admission outcomes.
///
/// All implementations must be `Send + Sync` so the controller and the
/// consumer workers can share one handle.
#[async_trait]
pub trait OutcomeChannel: Send + Sync {
    /// Durably enqueue an outcome message.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::PublishFailed`] if the enqueue could not be
    /// confirmed; callers on the admission path retry with bounded backoff
    /// because an unconfirmed publish after a decrement is a stock leak.
    async fn publish(&self, topic: &str, outcome: &AdmissionOutcome) -> Result<(), ChannelError>;

    /// Subscribe to a topic, returning a stream of deliveries.
    ///
    /// Each delivery must be acknowledged once processed; the transport
    /// only commits acknowledged deliveries.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::SubscriptionFailed`] if the consumer could
    /// not be created or the subscription was rejected.
    async fn subscribe(&self, topic: &str) -> Result<OutcomeStream, ChannelError>;
}
