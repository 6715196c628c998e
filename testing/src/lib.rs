//! # Farewell Testing
//!
//! In-memory fakes of every pipeline seam, for deterministic tests without
//! Redis, Kafka or Postgres:
//!
//! - [`mocks::InMemoryCounterStore`] - atomic decrement-with-floor under one
//!   mutex
//! - [`mocks::InMemoryAdmissionLock`] - lease-based per-key lock with expiry
//! - [`mocks::InMemoryOutcomeChannel`] - at-least-once channel with fault
//!   injection
//! - [`mocks::InMemoryApplicationStore`] - uniquely-keyed record store with
//!   fault injection
//! - [`mocks::RecordingNotifier`] - captures notified identities
//! - [`mocks::RecordingDeadLetterSink`] - captures dead-lettered outcomes
//!
//! ## Example
//!
//! ```ignore
//! use farewell_core::{AdmissionController, AdmissionPolicy};
//! use farewell_testing::mocks::*;
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn grants_within_stock() {
//!     let counter = Arc::new(InMemoryCounterStore::new());
//!     counter.set("gift:stock", 1).await.unwrap();
//!     // ... wire an AdmissionController over the fakes and assert.
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// In-memory fake implementations of the pipeline seams.
pub mod mocks {
    use async_trait::async_trait;
    use chrono::Utc;
    use farewell_core::application::{
        ApplicationRecord, ApplicationStatus, ApplicationStore, ApplicationStoreError,
    };
    use farewell_core::channel::{ChannelError, OutcomeChannel, OutcomeDelivery, OutcomeStream};
    use farewell_core::counter::{CounterError, CounterStore, SOLD_OUT};
    use farewell_core::dead_letter::{DeadLetterError, DeadLetterSink};
    use farewell_core::lock::{AdmissionLock, LockError, LockToken};
    use farewell_core::notify::{NotificationSender, NotifyError};
    use farewell_core::outcome::AdmissionOutcome;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::time::{Duration, Instant};
    use tokio::sync::{Mutex, mpsc, oneshot};

    /// In-memory counter store.
    ///
    /// A single mutex around the map makes every decrement-with-floor
    /// indivisible, which is exactly the linearizability the production
    /// scripted decrement provides.
    #[derive(Default)]
    pub struct InMemoryCounterStore {
        counters: Mutex<HashMap<String, i64>>,
    }

    impl InMemoryCounterStore {
        /// Create an empty counter store (no keys initialized).
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl CounterStore for InMemoryCounterStore {
        async fn decrement_with_floor(&self, key: &str) -> Result<i64, CounterError> {
            let mut counters = self.counters.lock().await;
            let Some(value) = counters.get_mut(key) else {
                return Err(CounterError::Missing(key.to_string()));
            };
            *value -= 1;
            if *value < 0 {
                *value += 1;
                return Ok(SOLD_OUT);
            }
            Ok(*value)
        }

        async fn set(&self, key: &str, value: i64) -> Result<(), CounterError> {
            self.counters.lock().await.insert(key.to_string(), value);
            Ok(())
        }

        async fn current(&self, key: &str) -> Result<i64, CounterError> {
            self.counters
                .lock()
                .await
                .get(key)
                .copied()
                .ok_or_else(|| CounterError::Missing(key.to_string()))
        }
    }

    /// In-memory lease-based lock keyed by string.
    ///
    /// Expired leases are purged on the next acquire attempt, matching the
    /// TTL auto-expiry of the production lock.
    #[derive(Default)]
    pub struct InMemoryAdmissionLock {
        held: Mutex<HashMap<String, (String, Instant)>>,
        token_seq: AtomicU64,
    }

    impl InMemoryAdmissionLock {
        /// Create a lock holding no keys.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Poll interval between acquisition attempts.
        const POLL_INTERVAL: Duration = Duration::from_millis(5);
    }

    #[async_trait]
    impl AdmissionLock for InMemoryAdmissionLock {
        async fn acquire(
            &self,
            key: &str,
            wait: Duration,
            lease: Duration,
        ) -> Result<Option<LockToken>, LockError> {
            let deadline = Instant::now() + wait;
            loop {
                {
                    let mut held = self.held.lock().await;
                    let expired = held
                        .get(key)
                        .is_some_and(|(_, expiry)| *expiry <= Instant::now());
                    if expired {
                        held.remove(key);
                    }
                    if !held.contains_key(key) {
                        let token =
                            format!("token-{}", self.token_seq.fetch_add(1, Ordering::Relaxed));
                        held.insert(key.to_string(), (token.clone(), Instant::now() + lease));
                        return Ok(Some(LockToken::new(token)));
                    }
                }
                if Instant::now() >= deadline {
                    return Ok(None);
                }
                tokio::time::sleep(Self::POLL_INTERVAL).await;
            }
        }

        async fn release(&self, key: &str, token: &LockToken) -> Result<(), LockError> {
            let mut held = self.held.lock().await;
            if held
                .get(key)
                .is_some_and(|(value, _)| value == token.as_str())
            {
                held.remove(key);
            }
            Ok(())
        }
    }

    /// In-memory at-least-once outcome channel.
    ///
    /// Publishes are recorded for assertions and forwarded to every live
    /// subscriber of the topic as acknowledged deliveries; `acked` exposes
    /// which outcomes subscribers have acknowledged so far.
    /// `fail_next_publishes` injects publish faults to exercise the
    /// admission path's bounded publish retry.
    #[derive(Default)]
    pub struct InMemoryOutcomeChannel {
        inner: Mutex<ChannelInner>,
        acked: Arc<Mutex<Vec<AdmissionOutcome>>>,
    }

    #[derive(Default)]
    struct ChannelInner {
        subscribers: HashMap<String, Vec<mpsc::UnboundedSender<OutcomeDelivery>>>,
        published: Vec<(String, AdmissionOutcome)>,
        fail_remaining: u32,
    }

    impl InMemoryOutcomeChannel {
        /// Create a channel with no subscribers.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next `n` publishes fail with a transport error.
        pub async fn fail_next_publishes(&self, n: u32) {
            self.inner.lock().await.fail_remaining = n;
        }

        /// All successfully published messages, in publish order.
        pub async fn published(&self) -> Vec<(String, AdmissionOutcome)> {
            self.inner.lock().await.published.clone()
        }

        /// Outcomes whose deliveries subscribers have acknowledged so far.
        pub async fn acked(&self) -> Vec<AdmissionOutcome> {
            self.acked.lock().await.clone()
        }
    }

    #[async_trait]
    impl OutcomeChannel for InMemoryOutcomeChannel {
        async fn publish(
            &self,
            topic: &str,
            outcome: &AdmissionOutcome,
        ) -> Result<(), ChannelError> {
            let mut inner = self.inner.lock().await;
            if inner.fail_remaining > 0 {
                inner.fail_remaining -= 1;
                return Err(ChannelError::PublishFailed {
                    topic: topic.to_string(),
                    reason: "injected publish fault".to_string(),
                });
            }
            inner
                .published
                .push((topic.to_string(), outcome.clone()));
            if let Some(senders) = inner.subscribers.get_mut(topic) {
                senders.retain(|tx| {
                    let (ack_tx, ack_rx) = oneshot::channel();
                    let delivered = tx
                        .send(OutcomeDelivery::with_ack(outcome.clone(), ack_tx))
                        .is_ok();
                    if delivered {
                        let acked = Arc::clone(&self.acked);
                        let outcome = outcome.clone();
                        tokio::spawn(async move {
                            if ack_rx.await.is_ok() {
                                acked.lock().await.push(outcome);
                            }
                        });
                    }
                    delivered
                });
            }
            Ok(())
        }

        async fn subscribe(&self, topic: &str) -> Result<OutcomeStream, ChannelError> {
            let (tx, mut rx) = mpsc::unbounded_channel();
            self.inner
                .lock()
                .await
                .subscribers
                .entry(topic.to_string())
                .or_default()
                .push(tx);

            let stream = async_stream::stream! {
                while let Some(delivery) = rx.recv().await {
                    yield Ok(delivery);
                }
            };
            Ok(Box::pin(stream) as OutcomeStream)
        }
    }

    /// In-memory application record store with injectable insert faults.
    #[derive(Default)]
    pub struct InMemoryApplicationStore {
        inner: Mutex<StoreInner>,
    }

    #[derive(Default)]
    struct StoreInner {
        records: HashMap<String, ApplicationRecord>,
        fail_remaining: u32,
        fail_always: bool,
    }

    impl InMemoryApplicationStore {
        /// Create an empty store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next `n` inserts fail with a database error.
        pub async fn fail_next_inserts(&self, n: u32) {
            self.inner.lock().await.fail_remaining = n;
        }

        /// Make every insert fail until cleared.
        pub async fn fail_all_inserts(&self, fail: bool) {
            self.inner.lock().await.fail_always = fail;
        }

        /// Number of records currently stored.
        pub async fn len(&self) -> usize {
            self.inner.lock().await.records.len()
        }

        /// Whether the store holds no records.
        pub async fn is_empty(&self) -> bool {
            self.inner.lock().await.records.is_empty()
        }
    }

    #[async_trait]
    impl ApplicationStore for InMemoryApplicationStore {
        async fn exists(&self, identity: &str) -> Result<bool, ApplicationStoreError> {
            Ok(self.inner.lock().await.records.contains_key(identity))
        }

        async fn insert(
            &self,
            identity: &str,
            status: ApplicationStatus,
        ) -> Result<(), ApplicationStoreError> {
            let mut inner = self.inner.lock().await;
            if inner.fail_always {
                return Err(ApplicationStoreError::Database(
                    "injected store fault".to_string(),
                ));
            }
            if inner.fail_remaining > 0 {
                inner.fail_remaining -= 1;
                return Err(ApplicationStoreError::Database(
                    "injected store fault".to_string(),
                ));
            }
            if inner.records.contains_key(identity) {
                return Err(ApplicationStoreError::Duplicate(identity.to_string()));
            }
            inner.records.insert(
                identity.to_string(),
                ApplicationRecord {
                    identity: identity.to_string(),
                    status,
                    created_at: Utc::now(),
                },
            );
            Ok(())
        }

        async fn find(
            &self,
            identity: &str,
        ) -> Result<Option<ApplicationRecord>, ApplicationStoreError> {
            Ok(self.inner.lock().await.records.get(identity).cloned())
        }
    }

    /// Notifier that records every notified identity.
    #[derive(Default)]
    pub struct RecordingNotifier {
        notified: Mutex<Vec<String>>,
        failing: AtomicBool,
    }

    impl RecordingNotifier {
        /// Create a notifier that succeeds.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Toggle delivery failure.
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::Relaxed);
        }

        /// Identities notified so far, in order.
        pub async fn notified(&self) -> Vec<String> {
            self.notified.lock().await.clone()
        }
    }

    #[async_trait]
    impl NotificationSender for RecordingNotifier {
        async fn notify(&self, identity: &str) -> Result<(), NotifyError> {
            if self.failing.load(Ordering::Relaxed) {
                return Err(NotifyError::Delivery("injected delivery fault".to_string()));
            }
            self.notified.lock().await.push(identity.to_string());
            Ok(())
        }
    }

    /// A dead-lettered outcome with its failure metadata, as captured.
    #[derive(Debug, Clone)]
    pub struct DeadLetteredOutcome {
        /// The outcome that exhausted its retries.
        pub outcome: AdmissionOutcome,
        /// The final error message.
        pub error_message: String,
        /// Retry count at the time of dead-lettering.
        pub retry_count: u32,
    }

    /// Dead-letter sink that records every entry.
    #[derive(Default)]
    pub struct RecordingDeadLetterSink {
        entries: Mutex<Vec<DeadLetteredOutcome>>,
    }

    impl RecordingDeadLetterSink {
        /// Create an empty sink.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Entries captured so far.
        pub async fn entries(&self) -> Vec<DeadLetteredOutcome> {
            self.entries.lock().await.clone()
        }
    }

    #[async_trait]
    impl DeadLetterSink for RecordingDeadLetterSink {
        async fn add_entry(
            &self,
            outcome: &AdmissionOutcome,
            error_message: &str,
            retry_count: u32,
        ) -> Result<(), DeadLetterError> {
            self.entries.lock().await.push(DeadLetteredOutcome {
                outcome: outcome.clone(),
                error_message: error_message.to_string(),
                retry_count,
            });
            Ok(())
        }
    }
}
