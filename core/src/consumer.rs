//! The asynchronous confirmation path.
//!
//! [`OutcomeProcessor`] handles one delivered outcome message to completion:
//!
//! ```text
//! RECEIVED → (duplicate? SKIP : PERSIST) → (granted? NOTIFY) → ACK
//! ```
//!
//! Faults never propagate to the original requester - the synchronous call
//! has already returned. Instead the processor implements an explicit retry
//! mechanism: the attempt counter travels with the message, the backoff is
//! computed here, and the message is republished until the ceiling is
//! reached, after which it is routed to the dead-letter sink exactly once.
//!
//! The delivery acknowledgement completes only once the message reached a
//! terminal state: recorded, skipped, dead-lettered, or durably republished
//! with the attempt counter advanced. An outcome lost mid-processing is
//! therefore redelivered by the transport rather than dropped.

use crate::application::{ApplicationStatus, ApplicationStore, ApplicationStoreError};
use crate::channel::{DeliveryAck, OutcomeChannel};
use crate::dead_letter::DeadLetterSink;
use crate::notify::NotificationSender;
use crate::outcome::{AdmissionOutcome, Decision};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Retry-with-backoff-then-dead-letter policy.
///
/// Mirrors the channel-level retry contract: `max_attempts` total processing
/// attempts, exponential delay of `base_delay * multiplier^attempt` before
/// each republication.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total processing attempts before dead-lettering.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplier applied per subsequent attempt.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before redelivering a message that failed on `attempt`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * self.multiplier.saturating_pow(attempt)
    }
}

/// A fault while applying an outcome message.
///
/// Transient by definition: resolved by redelivery, and on redelivery a
/// unique-constraint race collapses into a duplicate skip.
#[derive(Error, Debug)]
enum ProcessingFault {
    #[error("application store fault: {0}")]
    Store(#[from] ApplicationStoreError),
}

/// How a message was resolved on a successful pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    /// A new terminal record was written.
    Recorded,
    /// A record already existed; acknowledged without side effects.
    Skipped,
}

/// Idempotent, retrying consumer of admission outcomes.
///
/// Exclusively owns the decision to materialize an application record; no
/// other component writes the store.
#[derive(Clone)]
pub struct OutcomeProcessor {
    store: Arc<dyn ApplicationStore>,
    notifier: Arc<dyn NotificationSender>,
    channel: Arc<dyn OutcomeChannel>,
    dead_letters: Arc<dyn DeadLetterSink>,
    topic: String,
    retry: RetryPolicy,
}

impl OutcomeProcessor {
    /// Create a processor over the given seams.
    ///
    /// `channel` and `topic` are used for retry republication only.
    #[must_use]
    pub fn new(
        store: Arc<dyn ApplicationStore>,
        notifier: Arc<dyn NotificationSender>,
        channel: Arc<dyn OutcomeChannel>,
        dead_letters: Arc<dyn DeadLetterSink>,
        topic: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            notifier,
            channel,
            dead_letters,
            topic: topic.into(),
            retry,
        }
    }

    /// Handle one delivered outcome message to completion.
    ///
    /// Never errors outward: a processing fault is resolved by backoff and
    /// republication with the attempt counter advanced, or - once the
    /// ceiling is exhausted - by the dead-letter sink. `ack` completes once
    /// the message reached one of those terminal states, never before.
    pub async fn handle(&self, outcome: AdmissionOutcome, ack: DeliveryAck) {
        match self.apply(&outcome).await {
            Ok(Applied::Recorded) => {
                metrics::counter!("consumer.recorded", "decision" => outcome.decision.as_str())
                    .increment(1);
                ack.complete();
            }
            Ok(Applied::Skipped) => {
                metrics::counter!("consumer.duplicates_skipped").increment(1);
                ack.complete();
            }
            Err(fault) => self.retry_or_dead_letter(outcome, &fault, ack).await,
        }
    }

    /// One pass of the per-message state machine.
    async fn apply(&self, outcome: &AdmissionOutcome) -> Result<Applied, ProcessingFault> {
        if self.store.exists(&outcome.identity).await? {
            info!(
                identity = %outcome.identity,
                "outcome already applied, skipping redelivered message"
            );
            return Ok(Applied::Skipped);
        }

        let status = ApplicationStatus::from(outcome.decision);
        self.store.insert(&outcome.identity, status).await?;
        info!(
            identity = %outcome.identity,
            status = status.as_str(),
            attempt = outcome.attempt,
            "application record persisted"
        );

        // Persist strictly before notify: the claim is real regardless of
        // notification delivery, so a notify failure must not re-enqueue the
        // message or roll anything back.
        if outcome.decision == Decision::Granted {
            if let Err(e) = self.notifier.notify(&outcome.identity).await {
                warn!(
                    identity = %outcome.identity,
                    error = %e,
                    "confirmation notification failed after persistence"
                );
                metrics::counter!("consumer.notification_failures").increment(1);
            }
        }

        Ok(Applied::Recorded)
    }

    async fn retry_or_dead_letter(
        &self,
        outcome: AdmissionOutcome,
        fault: &ProcessingFault,
        ack: DeliveryAck,
    ) {
        if outcome.attempt + 1 >= self.retry.max_attempts {
            error!(
                identity = %outcome.identity,
                attempts = outcome.attempt + 1,
                error = %fault,
                "outcome processing exhausted retries, routing to dead letter"
            );
            if let Err(e) = self
                .dead_letters
                .add_entry(&outcome, &fault.to_string(), outcome.attempt)
                .await
            {
                // Operator attention required either way; the log is the
                // last resort when even the sink is down.
                error!(
                    identity = %outcome.identity,
                    error = %e,
                    "failed to record dead-lettered outcome"
                );
            }
            metrics::counter!("consumer.dead_lettered").increment(1);
            ack.complete();
            return;
        }

        let delay = self.retry.delay_for(outcome.attempt);
        warn!(
            identity = %outcome.identity,
            attempt = outcome.attempt,
            delay_ms = delay.as_millis() as u64,
            error = %fault,
            "outcome processing failed, scheduling redelivery"
        );

        // The backoff and republication run off the consumer loop so one
        // faulty message never stalls the outcomes queued behind it. The
        // acknowledgement travels with the task: the original delivery is
        // only committed once its retry is durably enqueued (or the retry
        // itself is dead-lettered).
        let processor = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let redelivery = outcome.next_attempt();
            if let Err(e) = processor.channel.publish(&processor.topic, &redelivery).await {
                error!(
                    identity = %redelivery.identity,
                    error = %e,
                    "failed to republish outcome for retry, routing to dead letter"
                );
                if let Err(sink_err) = processor
                    .dead_letters
                    .add_entry(&redelivery, &e.to_string(), redelivery.attempt)
                    .await
                {
                    error!(
                        identity = %redelivery.identity,
                        error = %sink_err,
                        "failed to record dead-lettered outcome"
                    );
                }
                metrics::counter!("consumer.dead_lettered").increment(1);
            }
            ack.complete();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processor_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<OutcomeProcessor>();
        assert_sync::<OutcomeProcessor>();
    }

    #[test]
    fn backoff_grows_exponentially() {
        let retry = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            multiplier: 2,
        };
        assert_eq!(retry.delay_for(0), Duration::from_millis(1000));
        assert_eq!(retry.delay_for(1), Duration::from_millis(2000));
        assert_eq!(retry.delay_for(2), Duration::from_millis(4000));
    }
}
