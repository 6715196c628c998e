//! Redpanda/Kafka outcome channel for the Farewell pipeline.
//!
//! Implements the [`OutcomeChannel`] trait from `farewell-core` over rdkafka.
//! Any Kafka-compatible broker works (Redpanda, Apache Kafka, managed
//! offerings); the protocol is the contract.
//!
//! # Delivery semantics
//!
//! **At-least-once** with acknowledgement-gated offset commits:
//! - An outcome's offset is committed only AFTER the subscriber completed
//!   the delivery's acknowledgement, so a crash anywhere between delivery
//!   and processing means redelivery, never loss.
//! - The commit watermark advances strictly over the contiguous prefix of
//!   acknowledged deliveries; an offset behind an unacknowledged message
//!   stays uncommitted.
//! - Messages are keyed by identity, so ordering holds per identity within
//!   a partition. The pipeline never depends on cross-identity ordering.
//! - The downstream consumer is idempotent (unique identity constraint), so
//!   duplicates from redelivery are harmless.
//!
//! # Example
//!
//! ```no_run
//! use farewell_redpanda::RedpandaOutcomeChannel;
//! use farewell_core::channel::OutcomeChannel;
//! use farewell_core::outcome::{AdmissionOutcome, Decision};
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let channel = RedpandaOutcomeChannel::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("farewell-outcomes")
//!     .build()?;
//!
//! let outcome = AdmissionOutcome::new("user@example.com", Decision::Granted);
//! channel.publish("gift-outcomes", &outcome).await?;
//!
//! let mut stream = channel.subscribe("gift-outcomes").await?;
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(delivery) => {
//!             let (outcome, ack) = delivery.into_parts();
//!             println!("{} -> {}", outcome.identity, outcome.decision);
//!             ack.complete();
//!         }
//!         Err(e) => eprintln!("stream error: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use farewell_core::channel::{ChannelError, OutcomeChannel, OutcomeDelivery, OutcomeStream};
use farewell_core::outcome::AdmissionOutcome;
use rdkafka::Offset;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::topic_partition_list::TopicPartitionList;
use rdkafka::util::Timeout;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::oneshot;

/// Kafka-compatible [`OutcomeChannel`] implementation.
///
/// # Configuration
///
/// - **Broker addresses**: bootstrap servers (required)
/// - **Producer acks**: `"all"` by default - a publish is only confirmed
///   once durably replicated, which the admission path relies on
/// - **Consumer group**: explicit ID so multiple worker instances share the
///   partition load
/// - **Buffer size**: bounds both the in-memory buffer between the Kafka
///   consumer and the subscriber stream and the window of delivered but not
///   yet acknowledged messages (default: 1000)
/// - **Offset reset**: where new groups start reading (default: "earliest",
///   so a freshly deployed consumer drains outcomes published before it
///   joined)
pub struct RedpandaOutcomeChannel {
    /// Kafka producer for publishing outcomes.
    producer: FutureProducer,
    /// Broker addresses (for creating consumers).
    brokers: String,
    /// Producer send timeout.
    timeout: Duration,
    /// Consumer group ID.
    consumer_group: String,
    /// Outcome buffer size for subscribers.
    buffer_size: usize,
    /// Auto offset reset policy.
    auto_offset_reset: String,
}

impl RedpandaOutcomeChannel {
    /// Create a channel with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::ConnectionFailed`] if the producer cannot be
    /// created or the broker addresses are invalid.
    pub fn new(brokers: &str) -> Result<Self, ChannelError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a builder for configuring the channel.
    #[must_use]
    pub fn builder() -> RedpandaOutcomeChannelBuilder {
        RedpandaOutcomeChannelBuilder::default()
    }

    /// The configured broker addresses.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }
}

/// Builder for configuring a [`RedpandaOutcomeChannel`].
#[derive(Default)]
pub struct RedpandaOutcomeChannelBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
}

impl RedpandaOutcomeChannelBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode: "0", "1" or "all".
    ///
    /// Default: "all". The admission path treats a confirmed publish as a
    /// durable enqueue, so anything weaker trades correctness for latency.
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the producer send timeout. Default: 5 seconds.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the consumer group ID for subscriptions.
    ///
    /// Default: `"farewell-outcome-consumer"`. Multiple worker instances in
    /// the same group share the partitioned workload.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Set the outcome buffer size for subscriptions.
    ///
    /// # Panics
    ///
    /// Panics if `buffer_size` is 0.
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        assert!(buffer_size > 0, "buffer_size must be greater than 0");
        self.buffer_size = Some(buffer_size);
        self
    }

    /// Set the auto offset reset policy: "earliest", "latest" or "error".
    ///
    /// Default: "earliest".
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the [`RedpandaOutcomeChannel`].
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::ConnectionFailed`] if brokers are not set or
    /// the producer cannot be created.
    pub fn build(self) -> Result<RedpandaOutcomeChannel, ChannelError> {
        let brokers = self
            .brokers
            .ok_or_else(|| ChannelError::ConnectionFailed("brokers not configured".to_string()))?;

        let mut producer_config = ClientConfig::new();
        producer_config
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", self.producer_acks.as_deref().unwrap_or("all"));

        let producer: FutureProducer = producer_config.create().map_err(|e| {
            ChannelError::ConnectionFailed(format!("failed to create producer: {e}"))
        })?;

        let consumer_group = self
            .consumer_group
            .unwrap_or_else(|| "farewell-outcome-consumer".to_string());

        tracing::info!(
            brokers = %brokers,
            consumer_group = %consumer_group,
            acks = self.producer_acks.as_deref().unwrap_or("all"),
            buffer_size = self.buffer_size.unwrap_or(1000),
            "Redpanda outcome channel created"
        );

        Ok(RedpandaOutcomeChannel {
            producer,
            brokers,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
            consumer_group,
            buffer_size: self.buffer_size.unwrap_or(1000),
            auto_offset_reset: self
                .auto_offset_reset
                .unwrap_or_else(|| "earliest".to_string()),
        })
    }
}

#[async_trait]
impl OutcomeChannel for RedpandaOutcomeChannel {
    async fn publish(&self, topic: &str, outcome: &AdmissionOutcome) -> Result<(), ChannelError> {
        let payload = bincode::serialize(outcome).map_err(|e| ChannelError::PublishFailed {
            topic: topic.to_string(),
            reason: format!("failed to serialize outcome: {e}"),
        })?;

        // Key by identity: outcomes for one identity land on one partition,
        // preserving per-identity order.
        let record = FutureRecord::to(topic)
            .payload(&payload)
            .key(outcome.identity.as_bytes());

        match self.producer.send(record, Timeout::After(self.timeout)).await {
            Ok((partition, offset)) => {
                tracing::debug!(
                    topic,
                    partition,
                    offset,
                    identity = %outcome.identity,
                    decision = %outcome.decision,
                    attempt = outcome.attempt,
                    "outcome published"
                );
                Ok(())
            }
            Err((kafka_error, _)) => {
                tracing::error!(topic, error = %kafka_error, "failed to publish outcome");
                Err(ChannelError::PublishFailed {
                    topic: topic.to_string(),
                    reason: kafka_error.to_string(),
                })
            }
        }
    }

    async fn subscribe(&self, topic: &str) -> Result<OutcomeStream, ChannelError> {
        let topic = topic.to_string();

        // Manual commit for at-least-once delivery.
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.consumer_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| ChannelError::SubscriptionFailed {
                topic: topic.clone(),
                reason: format!("failed to create consumer: {e}"),
            })?;

        consumer
            .subscribe(&[topic.as_str()])
            .map_err(|e| ChannelError::SubscriptionFailed {
                topic: topic.clone(),
                reason: format!("failed to subscribe: {e}"),
            })?;

        tracing::info!(
            topic = %topic,
            consumer_group = %self.consumer_group,
            auto_offset_reset = %self.auto_offset_reset,
            manual_commit = true,
            "subscribed to outcome topic"
        );

        let (tx, rx) = tokio::sync::mpsc::channel(self.buffer_size);
        let buffer_size = self.buffer_size;

        // The consumer lives in its own task; deliveries are forwarded over
        // a bounded channel and each one carries an acknowledgement. Offsets
        // are committed only for the contiguous prefix of acknowledged
        // deliveries, so a crash redelivers every outcome the subscriber had
        // not finished processing.
        tokio::spawn(async move {
            use futures::StreamExt;
            use tokio::sync::oneshot::error::TryRecvError;

            let mut stream = consumer.stream();
            // Forwarded but not yet acknowledged deliveries, in order:
            // (partition, offset, ack receiver).
            let mut pending: VecDeque<(i32, i64, oneshot::Receiver<()>)> = VecDeque::new();

            while let Some(msg_result) = stream.next().await {
                match msg_result {
                    Ok(message) => {
                        let partition = message.partition();
                        let offset = message.offset();
                        let (ack_tx, ack_rx) = oneshot::channel();

                        let decoded = match message.payload() {
                            Some(payload) => bincode::deserialize::<AdmissionOutcome>(payload)
                                .map_err(|e| {
                                    ChannelError::DeserializationFailed(format!(
                                        "failed to deserialize outcome: {e}"
                                    ))
                                }),
                            None => Err(ChannelError::DeserializationFailed(
                                "message has no payload".to_string(),
                            )),
                        };

                        let item = match decoded {
                            Ok(outcome) => Ok(OutcomeDelivery::with_ack(outcome, ack_tx)),
                            Err(e) => {
                                // Replaying an undecodable message can never
                                // succeed; self-acknowledge so the watermark
                                // moves past it.
                                let _ = ack_tx.send(());
                                Err(e)
                            }
                        };

                        if tx.send(item).await.is_err() {
                            tracing::debug!("subscriber dropped, exiting consumer task");
                            break;
                        }
                        pending.push_back((partition, offset, ack_rx));

                        // Commit the contiguous acknowledged prefix.
                        while let Some((p, o, rx)) = pending.front_mut() {
                            match rx.try_recv() {
                                Ok(()) => {
                                    commit_acked(&consumer, &topic, *p, *o);
                                    pending.pop_front();
                                }
                                Err(TryRecvError::Empty) => break,
                                Err(TryRecvError::Closed) => {
                                    tracing::error!(
                                        topic = %topic,
                                        partition = *p,
                                        offset = *o,
                                        "delivery dropped without acknowledgement, halting consumer"
                                    );
                                    return;
                                }
                            }
                        }

                        // Bound the unacknowledged window before taking more
                        // messages from the broker.
                        while pending.len() >= buffer_size {
                            let Some((p, o, rx)) = pending.pop_front() else {
                                break;
                            };
                            match rx.await {
                                Ok(()) => commit_acked(&consumer, &topic, p, o),
                                Err(_) => {
                                    tracing::error!(
                                        topic = %topic,
                                        partition = p,
                                        offset = o,
                                        "delivery dropped without acknowledgement, halting consumer"
                                    );
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let err =
                            ChannelError::TransportError(format!("failed to receive message: {e}"));
                        if tx.send(Err(err)).await.is_err() {
                            break;
                        }
                    }
                }
            }

            tracing::debug!("outcome consumer task exiting");
        });

        let stream = async_stream::stream! {
            let mut rx = rx;
            while let Some(result) = rx.recv().await {
                yield result;
            }
        };

        Ok(Box::pin(stream) as OutcomeStream)
    }
}

/// Commit the offset after an acknowledged delivery (exclusive, so the next
/// fetch resumes at `offset + 1`), logging on failure. A failed commit only
/// widens the redelivery window; the idempotent consumer absorbs it.
fn commit_acked(consumer: &StreamConsumer, topic: &str, partition: i32, offset: i64) {
    let mut tpl = TopicPartitionList::new();
    if let Err(e) = tpl.add_partition_offset(topic, partition, Offset::Offset(offset + 1)) {
        tracing::warn!(topic, partition, offset, error = %e, "failed to build commit list");
        return;
    }
    if let Err(e) = consumer.commit(&tpl, CommitMode::Async) {
        tracing::warn!(
            topic,
            partition,
            offset,
            error = %e,
            "failed to commit offset (message may be redelivered)"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_channel_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaOutcomeChannel>();
        assert_sync::<RedpandaOutcomeChannel>();
    }

    #[test]
    fn builder_requires_brokers() {
        assert!(matches!(
            RedpandaOutcomeChannel::builder().build(),
            Err(ChannelError::ConnectionFailed(_))
        ));
    }
}
