//! The synchronous admission path.
//!
//! [`AdmissionController`] orchestrates lock acquisition, the atomic
//! decrement and outcome publication for a single claim request. One counter
//! mutation and one message publication happen per successful call; the
//! authoritative application record is written asynchronously by the
//! consumer, so callers only ever see the admission decision.

use crate::channel::{ChannelError, OutcomeChannel};
use crate::counter::{CounterError, CounterStore};
use crate::lock::{AdmissionLock, LockError};
use crate::outcome::{AdmissionOutcome, Decision};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Tunable timing and retry knobs for the admission path.
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    /// Maximum time to wait for the per-identity lock.
    pub lock_wait: Duration,
    /// Lock lease; deliberately short since the critical section is one
    /// atomic decrement.
    pub lock_lease: Duration,
    /// Publish attempts before surfacing a publication failure.
    pub publish_attempts: u32,
    /// Base delay before the first publish retry.
    pub publish_backoff_base: Duration,
    /// Backoff multiplier applied per publish retry.
    pub publish_backoff_multiplier: u32,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            lock_wait: Duration::from_secs(10),
            lock_lease: Duration::from_secs(1),
            publish_attempts: 3,
            publish_backoff_base: Duration::from_millis(100),
            publish_backoff_multiplier: 2,
        }
    }
}

/// Errors surfaced synchronously to the caller of [`AdmissionController::admit`].
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// Lock contention from the same identity; user-retriable after a short
    /// delay.
    #[error("a request for this identity is already being processed")]
    AlreadyProcessing,

    /// The counter store is unreachable or uninitialized. Fatal for the
    /// request: no safe default exists without a counter read.
    #[error("stock counter unavailable: {0}")]
    CounterUnavailable(#[from] CounterError),

    /// The lock backend failed outright (distinct from contention).
    #[error("admission lock failure: {0}")]
    Lock(#[from] LockError),

    /// The decrement succeeded but the outcome message could not be durably
    /// enqueued after bounded retries. Critical: represents a potential
    /// stock leak and is logged distinctly from ordinary rejections.
    #[error("failed to publish admission outcome after {attempts} attempts: {source}")]
    Publication {
        /// How many publish attempts were made.
        attempts: u32,
        /// The final publish error.
        source: ChannelError,
    },
}

/// Synchronous entry point for claim requests.
///
/// The counter handle is an explicit resource owned by the controller, not a
/// process-wide singleton, so the component is testable in isolation with a
/// fake counter store.
pub struct AdmissionController {
    counter: Arc<dyn CounterStore>,
    lock: Arc<dyn AdmissionLock>,
    channel: Arc<dyn OutcomeChannel>,
    stock_key: String,
    topic: String,
    policy: AdmissionPolicy,
}

impl AdmissionController {
    /// Create a controller over the given seams.
    ///
    /// # Arguments
    ///
    /// - `counter`: atomic stock counter store
    /// - `lock`: per-identity admission lock
    /// - `channel`: durable outcome channel
    /// - `stock_key`: counter key holding units remaining
    /// - `topic`: outcome topic to publish decisions to
    /// - `policy`: timing and retry knobs
    #[must_use]
    pub fn new(
        counter: Arc<dyn CounterStore>,
        lock: Arc<dyn AdmissionLock>,
        channel: Arc<dyn OutcomeChannel>,
        stock_key: impl Into<String>,
        topic: impl Into<String>,
        policy: AdmissionPolicy,
    ) -> Self {
        Self {
            counter,
            lock,
            channel,
            stock_key: stock_key.into(),
            topic: topic.into(),
            policy,
        }
    }

    /// Lock key scoped per identity, never global, so the admission path
    /// does not become a serialized bottleneck.
    fn lock_key(identity: &str) -> String {
        format!("lock:event:apply:{identity}")
    }

    /// Decide admission for one verified identity.
    ///
    /// Acquires the per-identity lock, performs the atomic decrement,
    /// durably publishes the outcome, and releases the lock on every exit
    /// path.
    ///
    /// # Errors
    ///
    /// - [`AdmissionError::AlreadyProcessing`] when the lock was contended
    ///   past the wait timeout
    /// - [`AdmissionError::CounterUnavailable`] when the counter could not
    ///   be read (propagated, never guessed)
    /// - [`AdmissionError::Publication`] when the outcome could not be
    ///   enqueued after bounded retries
    pub async fn admit(&self, identity: &str) -> Result<Decision, AdmissionError> {
        let lock_key = Self::lock_key(identity);
        let Some(token) = self
            .lock
            .acquire(&lock_key, self.policy.lock_wait, self.policy.lock_lease)
            .await?
        else {
            warn!(identity, "admission lock not acquired, request already in flight");
            metrics::counter!("admission.already_processing").increment(1);
            return Err(AdmissionError::AlreadyProcessing);
        };

        let result = self.admit_locked(identity).await;

        // Release unconditionally; an expired lease makes this a no-op.
        if let Err(e) = self.lock.release(&lock_key, &token).await {
            warn!(identity, error = %e, "failed to release admission lock (lease will expire)");
        }

        result
    }

    async fn admit_locked(&self, identity: &str) -> Result<Decision, AdmissionError> {
        let remaining = self.counter.decrement_with_floor(&self.stock_key).await?;

        let decision = if remaining < 0 {
            info!(identity, "stock exhausted, claim rejected");
            Decision::Rejected
        } else {
            info!(identity, remaining, "claim granted");
            Decision::Granted
        };
        metrics::counter!("admission.decisions", "decision" => decision.as_str()).increment(1);

        self.publish_outcome(AdmissionOutcome::new(identity, decision))
            .await?;

        Ok(decision)
    }

    /// Durably enqueue the outcome, retrying with bounded backoff.
    ///
    /// The decrement is already irreversible at this point: a counter
    /// consumed with no corresponding message is a silent stock leak, so
    /// exhaustion here is logged as critical rather than as an ordinary
    /// rejection.
    async fn publish_outcome(&self, outcome: AdmissionOutcome) -> Result<(), AdmissionError> {
        let mut delay = self.policy.publish_backoff_base;
        let mut last_error = None;

        for attempt in 0..self.policy.publish_attempts {
            match self.channel.publish(&self.topic, &outcome).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        identity = %outcome.identity,
                        attempt,
                        error = %e,
                        "outcome publish failed"
                    );
                    last_error = Some(e);
                    if attempt + 1 < self.policy.publish_attempts {
                        tokio::time::sleep(delay).await;
                        delay *= self.policy.publish_backoff_multiplier;
                    }
                }
            }
        }

        let source = last_error.unwrap_or_else(|| ChannelError::PublishFailed {
            topic: self.topic.clone(),
            reason: "no publish attempts configured".to_string(),
        });
        error!(
            identity = %outcome.identity,
            decision = %outcome.decision,
            stock_leak = true,
            error = %source,
            "decrement consumed but outcome could not be enqueued"
        );
        metrics::counter!("admission.publication_failures").increment(1);

        Err(AdmissionError::Publication {
            attempts: self.policy.publish_attempts,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<AdmissionController>();
        assert_sync::<AdmissionController>();
    }

    #[test]
    fn lock_key_is_identity_scoped() {
        assert_eq!(
            AdmissionController::lock_key("user@example.com"),
            "lock:event:apply:user@example.com"
        );
    }

    #[test]
    fn default_policy_matches_lock_contract() {
        let policy = AdmissionPolicy::default();
        assert_eq!(policy.lock_wait, Duration::from_secs(10));
        assert_eq!(policy.lock_lease, Duration::from_secs(1));
    }
}
