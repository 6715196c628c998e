//! End-to-end pipeline tests over in-memory fakes.
//!
//! Exercises the full admission-to-confirmation flow without Redis, Kafka or
//! Postgres: the fakes preserve the exact concurrency semantics (atomic
//! decrement-with-floor, lease locks, at-least-once delivery, unique records)
//! so the pipeline invariants can be asserted deterministically.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use farewell_core::admission::{AdmissionController, AdmissionError, AdmissionPolicy};
use farewell_core::application::{ApplicationStatus, ApplicationStore};
use farewell_core::channel::{DeliveryAck, OutcomeChannel};
use farewell_core::consumer::{OutcomeProcessor, RetryPolicy};
use farewell_core::counter::CounterStore;
use farewell_core::lock::AdmissionLock;
use farewell_core::outcome::{AdmissionOutcome, Decision};
use futures::StreamExt;
use farewell_server::runtime::OutcomeWorker;
use farewell_testing::mocks::{
    InMemoryAdmissionLock, InMemoryApplicationStore, InMemoryCounterStore,
    InMemoryOutcomeChannel, RecordingDeadLetterSink, RecordingNotifier,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const STOCK_KEY: &str = "event:gift:stock";
const TOPIC: &str = "admission-outcomes";

/// All pipeline seams wired over fakes, with fast test timings.
struct Pipeline {
    counter: Arc<InMemoryCounterStore>,
    lock: Arc<InMemoryAdmissionLock>,
    channel: Arc<InMemoryOutcomeChannel>,
    store: Arc<InMemoryApplicationStore>,
    notifier: Arc<RecordingNotifier>,
    dead_letters: Arc<RecordingDeadLetterSink>,
    controller: Arc<AdmissionController>,
    processor: Arc<OutcomeProcessor>,
}

fn test_admission_policy() -> AdmissionPolicy {
    AdmissionPolicy {
        lock_wait: Duration::from_secs(5),
        lock_lease: Duration::from_secs(1),
        publish_attempts: 3,
        publish_backoff_base: Duration::from_millis(1),
        publish_backoff_multiplier: 2,
    }
}

fn test_retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        multiplier: 2,
    }
}

fn build_pipeline() -> Pipeline {
    build_pipeline_with_retry(test_retry_policy())
}

fn build_pipeline_with_retry(retry: RetryPolicy) -> Pipeline {
    let counter = Arc::new(InMemoryCounterStore::new());
    let lock = Arc::new(InMemoryAdmissionLock::new());
    let channel = Arc::new(InMemoryOutcomeChannel::new());
    let store = Arc::new(InMemoryApplicationStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let dead_letters = Arc::new(RecordingDeadLetterSink::new());

    let controller = Arc::new(AdmissionController::new(
        counter.clone(),
        lock.clone(),
        channel.clone(),
        STOCK_KEY,
        TOPIC,
        test_admission_policy(),
    ));
    let processor = Arc::new(OutcomeProcessor::new(
        store.clone(),
        notifier.clone(),
        channel.clone(),
        dead_letters.clone(),
        TOPIC,
        retry,
    ));

    Pipeline {
        counter,
        lock,
        channel,
        store,
        notifier,
        dead_letters,
        controller,
        processor,
    }
}

/// Drive every published (and republished) outcome through the processor
/// until the channel drains. Returns the number of messages handled.
async fn drain_channel(pipeline: &Pipeline) -> usize {
    let mut handled = 0;
    loop {
        let published = pipeline.channel.published().await;
        if handled < published.len() {
            let pending: Vec<AdmissionOutcome> = published[handled..]
                .iter()
                .map(|(_, outcome)| outcome.clone())
                .collect();
            handled = published.len();
            for outcome in pending {
                pipeline.processor.handle(outcome, DeliveryAck::noop()).await;
            }
            continue;
        }

        // Retries are republished from scheduled tasks; give any pending
        // redelivery a moment to land before concluding the channel drained.
        let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
        loop {
            if pipeline.channel.published().await.len() > handled {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                return handled;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[tokio::test]
async fn exactly_stock_many_claims_granted_under_contention() {
    let pipeline = build_pipeline();
    let stock = 100_i64;
    let requests = 10_000_usize;
    pipeline.counter.set(STOCK_KEY, stock).await.unwrap();

    let mut handles = Vec::with_capacity(requests);
    for i in 0..requests {
        let controller = pipeline.controller.clone();
        handles.push(tokio::spawn(async move {
            controller.admit(&format!("user{i}@example.com")).await
        }));
    }

    let mut granted = 0_usize;
    let mut rejected = 0_usize;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            Decision::Granted => granted += 1,
            Decision::Rejected => rejected += 1,
        }
    }

    // Never more grants than stock, never an unclaimed unit left behind.
    assert_eq!(granted, usize::try_from(stock).unwrap());
    assert_eq!(rejected, requests - granted);
    assert_eq!(pipeline.counter.current(STOCK_KEY).await.unwrap(), 0);

    // Every decision was durably enqueued, exactly one message per request.
    assert_eq!(pipeline.channel.published().await.len(), requests);

    // After confirmation, exactly one record per identity with the decision
    // mapped to its terminal status.
    drain_channel(&pipeline).await;
    assert_eq!(pipeline.store.len().await, requests);
    assert_eq!(pipeline.notifier.notified().await.len(), granted);
}

#[tokio::test]
async fn redelivered_outcome_is_applied_once() {
    let pipeline = build_pipeline();

    let outcome = AdmissionOutcome::new("dupe@example.com", Decision::Granted);
    pipeline
        .processor
        .handle(outcome.clone(), DeliveryAck::noop())
        .await;
    pipeline.processor.handle(outcome, DeliveryAck::noop()).await;

    assert_eq!(pipeline.store.len().await, 1);
    assert_eq!(pipeline.notifier.notified().await, vec!["dupe@example.com"]);
    assert!(pipeline.dead_letters.entries().await.is_empty());
}

#[tokio::test]
async fn same_identity_request_in_flight_is_rejected() {
    let pipeline = build_pipeline();
    pipeline.counter.set(STOCK_KEY, 10).await.unwrap();

    // Hold the identity's lock, simulating an in-flight request.
    let held = pipeline
        .lock
        .acquire(
            "lock:event:apply:busy@example.com",
            Duration::ZERO,
            Duration::from_secs(5),
        )
        .await
        .unwrap()
        .unwrap();

    // An impatient controller gives up while the lock is held.
    let impatient = AdmissionController::new(
        pipeline.counter.clone(),
        pipeline.lock.clone(),
        pipeline.channel.clone(),
        STOCK_KEY,
        TOPIC,
        AdmissionPolicy {
            lock_wait: Duration::from_millis(20),
            ..test_admission_policy()
        },
    );
    assert!(matches!(
        impatient.admit("busy@example.com").await,
        Err(AdmissionError::AlreadyProcessing)
    ));

    // No counter mutation and no message while contended.
    assert_eq!(pipeline.counter.current(STOCK_KEY).await.unwrap(), 10);
    assert!(pipeline.channel.published().await.is_empty());

    // Once released, the same identity proceeds normally.
    pipeline
        .lock
        .release("lock:event:apply:busy@example.com", &held)
        .await
        .unwrap();
    assert_eq!(
        impatient.admit("busy@example.com").await.unwrap(),
        Decision::Granted
    );
}

#[tokio::test]
async fn status_reflects_confirmed_outcomes() {
    let pipeline = build_pipeline();
    pipeline.counter.set(STOCK_KEY, 1).await.unwrap();

    // Pending or never submitted: no record.
    assert!(pipeline.store.find("a@example.com").await.unwrap().is_none());

    let first = pipeline.controller.admit("a@example.com").await.unwrap();
    let second = pipeline.controller.admit("b@example.com").await.unwrap();
    assert_eq!(first, Decision::Granted);
    assert_eq!(second, Decision::Rejected);

    drain_channel(&pipeline).await;

    let granted = pipeline.store.find("a@example.com").await.unwrap().unwrap();
    assert_eq!(granted.status, ApplicationStatus::Success);
    let rejected = pipeline.store.find("b@example.com").await.unwrap().unwrap();
    assert_eq!(rejected.status, ApplicationStatus::Failure);
}

#[tokio::test]
async fn persistent_store_fault_dead_letters_exactly_once() {
    let pipeline = build_pipeline();
    pipeline.store.fail_all_inserts(true).await;

    let outcome = AdmissionOutcome::new("unlucky@example.com", Decision::Granted);
    pipeline.channel.publish(TOPIC, &outcome).await.unwrap();
    drain_channel(&pipeline).await;

    // Three processing attempts total, then one dead-letter entry.
    let entries = pipeline.dead_letters.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome.identity, "unlucky@example.com");
    assert_eq!(entries[0].retry_count, 2);
    assert!(pipeline.store.is_empty().await);
    assert!(pipeline.notifier.notified().await.is_empty());
}

#[tokio::test]
async fn transient_store_fault_is_resolved_by_retry() {
    let pipeline = build_pipeline();
    pipeline.store.fail_next_inserts(1).await;

    let outcome = AdmissionOutcome::new("flaky@example.com", Decision::Granted);
    pipeline.channel.publish(TOPIC, &outcome).await.unwrap();
    drain_channel(&pipeline).await;

    assert_eq!(pipeline.store.len().await, 1);
    assert!(pipeline.dead_letters.entries().await.is_empty());
    assert_eq!(pipeline.notifier.notified().await, vec!["flaky@example.com"]);
}

#[tokio::test]
async fn notification_failure_does_not_retry_or_unrecord() {
    let pipeline = build_pipeline();
    pipeline.notifier.set_failing(true);

    let outcome = AdmissionOutcome::new("unreachable@example.com", Decision::Granted);
    pipeline.processor.handle(outcome, DeliveryAck::noop()).await;

    // The claim stands: record persisted, nothing redelivered or dead-lettered.
    assert_eq!(pipeline.store.len().await, 1);
    assert_eq!(pipeline.channel.published().await.len(), 0);
    assert!(pipeline.dead_letters.entries().await.is_empty());
}

#[tokio::test]
async fn reset_to_zero_rejects_subsequent_claims() {
    let pipeline = build_pipeline();
    pipeline.counter.set(STOCK_KEY, 5).await.unwrap();
    pipeline.counter.set(STOCK_KEY, 0).await.unwrap();

    assert_eq!(
        pipeline.controller.admit("late@example.com").await.unwrap(),
        Decision::Rejected
    );
    assert_eq!(pipeline.counter.current(STOCK_KEY).await.unwrap(), 0);

    // The rejection is still durably recorded.
    drain_channel(&pipeline).await;
    let record = pipeline
        .store
        .find("late@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, ApplicationStatus::Failure);
}

#[tokio::test]
async fn missing_counter_key_fails_without_publishing() {
    let pipeline = build_pipeline();

    assert!(matches!(
        pipeline.controller.admit("early@example.com").await,
        Err(AdmissionError::CounterUnavailable(_))
    ));
    assert!(pipeline.channel.published().await.is_empty());
}

#[tokio::test]
async fn publish_exhaustion_surfaces_after_bounded_retries() {
    let pipeline = build_pipeline();
    pipeline.counter.set(STOCK_KEY, 3).await.unwrap();
    pipeline.channel.fail_next_publishes(3).await;

    let result = pipeline.controller.admit("leak@example.com").await;
    assert!(matches!(
        result,
        Err(AdmissionError::Publication { attempts: 3, .. })
    ));

    // The decrement already happened; the failure is surfaced, not hidden.
    assert_eq!(pipeline.counter.current(STOCK_KEY).await.unwrap(), 2);
    assert!(pipeline.channel.published().await.is_empty());
}

#[tokio::test]
async fn transient_publish_fault_is_absorbed_by_retry() {
    let pipeline = build_pipeline();
    pipeline.counter.set(STOCK_KEY, 3).await.unwrap();
    pipeline.channel.fail_next_publishes(2).await;

    assert_eq!(
        pipeline.controller.admit("retry@example.com").await.unwrap(),
        Decision::Granted
    );
    assert_eq!(pipeline.channel.published().await.len(), 1);
}

#[tokio::test]
async fn delivery_acknowledged_only_after_processing() {
    let pipeline = build_pipeline();

    let mut stream = pipeline.channel.subscribe(TOPIC).await.unwrap();
    let outcome = AdmissionOutcome::new("acked@example.com", Decision::Granted);
    pipeline.channel.publish(TOPIC, &outcome).await.unwrap();

    let delivery = stream.next().await.unwrap().unwrap();

    // Delivered but not yet processed: the transport must not treat the
    // message as consumed, or a crash here would lose the outcome before a
    // record exists.
    assert!(pipeline.channel.acked().await.is_empty());
    assert!(pipeline.store.is_empty().await);

    let (outcome, ack) = delivery.into_parts();
    pipeline.processor.handle(outcome, ack).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while pipeline.channel.acked().await.is_empty() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "delivery was never acknowledged"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(pipeline.store.len().await, 1);
}

#[tokio::test]
async fn faulted_delivery_acknowledged_only_after_republication() {
    let pipeline = build_pipeline();
    pipeline.store.fail_next_inserts(1).await;

    let mut stream = pipeline.channel.subscribe(TOPIC).await.unwrap();
    let outcome = AdmissionOutcome::new("faulted@example.com", Decision::Granted);
    pipeline.channel.publish(TOPIC, &outcome).await.unwrap();

    let delivery = stream.next().await.unwrap().unwrap();
    let (outcome, ack) = delivery.into_parts();
    pipeline.processor.handle(outcome, ack).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while pipeline.channel.acked().await.is_empty() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "delivery was never acknowledged"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // By the time the original delivery is acknowledged, its retry is
    // already durably enqueued with the attempt counter advanced.
    let published = pipeline.channel.published().await;
    assert_eq!(published.len(), 2);
    assert_eq!(published[1].1.attempt, 1);
}

#[tokio::test]
async fn retry_backoff_does_not_block_later_outcomes() {
    let pipeline = build_pipeline_with_retry(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(500),
        multiplier: 2,
    });
    pipeline.store.fail_next_inserts(1).await;

    let faulted = AdmissionOutcome::new("faulted@example.com", Decision::Granted);
    let healthy = AdmissionOutcome::new("healthy@example.com", Decision::Granted);

    let started = tokio::time::Instant::now();
    pipeline.processor.handle(faulted, DeliveryAck::noop()).await;
    pipeline.processor.handle(healthy, DeliveryAck::noop()).await;

    // The faulted message's backoff runs off the consumer path; the healthy
    // outcome behind it is confirmed without waiting out the delay.
    assert!(
        started.elapsed() < Duration::from_millis(250),
        "retry backoff stalled the consumer"
    );
    assert!(
        pipeline
            .store
            .find("healthy@example.com")
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        pipeline
            .store
            .find("faulted@example.com")
            .await
            .unwrap()
            .is_none()
    );

    // The retry still lands after its delay.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while pipeline.channel.published().await.is_empty() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "retry was never republished"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let (_, redelivery) = pipeline.channel.published().await[0].clone();
    assert_eq!(redelivery.attempt, 1);
    pipeline
        .processor
        .handle(redelivery, DeliveryAck::noop())
        .await;
    assert!(
        pipeline
            .store
            .find("faulted@example.com")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn worker_confirms_outcomes_end_to_end() {
    let pipeline = build_pipeline();
    pipeline.counter.set(STOCK_KEY, 2).await.unwrap();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let worker = OutcomeWorker::new(
        pipeline.channel.clone(),
        pipeline.processor.clone(),
        TOPIC,
        shutdown_rx,
    );
    let worker_handle = tokio::spawn(worker.run());

    // Give the worker time to subscribe before publishing.
    tokio::time::sleep(Duration::from_millis(20)).await;

    for i in 0..3 {
        pipeline
            .controller
            .admit(&format!("worker{i}@example.com"))
            .await
            .unwrap();
    }

    // Wait for the worker to drain all three outcomes.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while pipeline.store.len().await < 3 {
        assert!(tokio::time::Instant::now() < deadline, "worker did not drain");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(pipeline.store.len().await, 3);
    assert_eq!(pipeline.notifier.notified().await.len(), 2);

    // Every processed delivery ends up acknowledged to the transport.
    while pipeline.channel.acked().await.len() < 3 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "worker did not acknowledge deliveries"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    shutdown_tx.send(()).unwrap();
    worker_handle.await.unwrap();
}
