//! Background worker driving the outcome consumer.
//!
//! Subscribes to the outcome topic and hands every delivered message to the
//! [`OutcomeProcessor`]. The subscription is re-established after transport
//! failures; shutdown is signaled over a broadcast channel so the worker can
//! stop between messages.

use farewell_core::channel::OutcomeChannel;
use farewell_core::consumer::OutcomeProcessor;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Delay before re-subscribing after a stream or subscription failure.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Long-running consumer loop over the outcome topic.
pub struct OutcomeWorker {
    channel: Arc<dyn OutcomeChannel>,
    processor: Arc<OutcomeProcessor>,
    topic: String,
    shutdown: broadcast::Receiver<()>,
}

impl OutcomeWorker {
    /// Create a worker over the given channel and processor.
    #[must_use]
    pub fn new(
        channel: Arc<dyn OutcomeChannel>,
        processor: Arc<OutcomeProcessor>,
        topic: impl Into<String>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            channel,
            processor,
            topic: topic.into(),
            shutdown,
        }
    }

    /// Run until shutdown is signaled.
    ///
    /// Each delivery's acknowledgement travels into the processor, which
    /// completes it once the outcome reached a terminal state; the transport
    /// commits only acknowledged deliveries, so a crash mid-processing means
    /// redelivery rather than loss. The processor never errors outward and
    /// schedules its retries off this loop, so one faulty message cannot
    /// stall the stream.
    pub async fn run(mut self) {
        info!(topic = %self.topic, "outcome worker started");

        loop {
            match self.channel.subscribe(&self.topic).await {
                Ok(mut stream) => {
                    info!(topic = %self.topic, "outcome worker subscribed");

                    loop {
                        tokio::select! {
                            _ = self.shutdown.recv() => {
                                info!("outcome worker shutting down");
                                return;
                            }
                            next = stream.next() => {
                                match next {
                                    Some(Ok(delivery)) => {
                                        let (outcome, ack) = delivery.into_parts();
                                        self.processor.handle(outcome, ack).await;
                                    }
                                    Some(Err(e)) => {
                                        error!(error = %e, "error receiving outcome from stream");
                                    }
                                    None => break,
                                }
                            }
                        }
                    }

                    warn!(
                        topic = %self.topic,
                        "outcome stream ended, reconnecting in {}s",
                        RECONNECT_DELAY.as_secs()
                    );
                }
                Err(e) => {
                    error!(
                        topic = %self.topic,
                        error = %e,
                        "failed to subscribe to outcome topic, retrying in {}s",
                        RECONNECT_DELAY.as_secs()
                    );
                }
            }

            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!("outcome worker shutting down");
                    return;
                }
                () = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }
    }
}
