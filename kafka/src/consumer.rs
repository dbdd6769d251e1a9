//! Intent consumer with manual commits and automatic resubscription.
//!
//! The consumer implements a subscribe-process-reconnect loop:
//!
//! ```text
//! loop {
//!     subscribe (consumer group joins, resumes at committed offset)
//!     loop {
//!         poll next delivery
//!         decode -> handler.handle(intent)
//!         Ok  -> commit offset
//!         Err -> tear down, wait, resubscribe   // delivery comes back
//!     }
//! }
//! ```
//!
//! Committing only after a successful handle is what gives the pipeline its
//! at-least-once guarantee: a crash or a handler failure before the commit
//! leaves the offset untouched, and the resubscription re-polls the same
//! delivery. Undecodable payloads are the one exception — they are logged
//! and committed, because redelivering a poison message forever helps
//! nobody.

use futures::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use seckill_core::channel::IntentHandler;
use seckill_core::intent::OrderIntent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Long-lived consumer of one intent channel.
///
/// One instance exists per channel, each with its own consumer group so
/// the main, retry, and dead-letter consumers never steal each other's
/// partitions. Spawned as a background task, it runs until the shared
/// shutdown signal fires.
pub struct IntentConsumer {
    name: String,
    brokers: String,
    topic: String,
    group: String,
    handler: Arc<dyn IntentHandler>,
    shutdown: broadcast::Receiver<()>,
    retry_delay: Duration,
}

impl IntentConsumer {
    /// Create a consumer.
    ///
    /// # Arguments
    ///
    /// * `name` - Consumer name for logging (e.g. "fulfillment", "retry")
    /// * `brokers` - Comma-separated broker addresses
    /// * `topic` - The channel to consume
    /// * `group` - Consumer group ID, unique per channel
    /// * `handler` - Processes each delivery
    /// * `shutdown` - Broadcast receiver for graceful shutdown
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        brokers: impl Into<String>,
        topic: impl Into<String>,
        group: impl Into<String>,
        handler: Arc<dyn IntentHandler>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            name: name.into(),
            brokers: brokers.into(),
            topic: topic.into(),
            group: group.into(),
            handler,
            shutdown,
            retry_delay: Duration::from_secs(5),
        }
    }

    /// Override the delay between resubscription attempts (default: 5s).
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Spawn the consumer as a background task.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the subscribe-process-reconnect loop until shutdown.
    async fn run(&mut self) {
        info!(consumer = %self.name, topic = %self.topic, group = %self.group, "Intent consumer started");

        loop {
            match self.subscribe() {
                Ok(consumer) => {
                    info!(consumer = %self.name, topic = %self.topic, "Subscribed");
                    if self.process(&consumer).await {
                        break; // shutdown requested
                    }
                    warn!(
                        consumer = %self.name,
                        "Processing interrupted, resubscribing in {:?}",
                        self.retry_delay
                    );
                }
                Err(e) => {
                    error!(
                        consumer = %self.name,
                        error = %e,
                        "Subscription failed, retrying in {:?}",
                        self.retry_delay
                    );
                }
            }

            // Interruptible backoff before the next subscription attempt.
            tokio::select! {
                _ = self.shutdown.recv() => break,
                () = tokio::time::sleep(self.retry_delay) => {}
            }
        }

        info!(consumer = %self.name, "Intent consumer stopped");
    }

    fn subscribe(&self) -> Result<StreamConsumer, rdkafka::error::KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group)
            .set("enable.auto.commit", "false") // commits happen after handling
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()?;

        consumer.subscribe(&[self.topic.as_str()])?;
        Ok(consumer)
    }

    /// Process deliveries until shutdown (returns `true`) or a condition
    /// that requires resubscription (returns `false`).
    async fn process(&mut self, consumer: &StreamConsumer) -> bool {
        let mut stream = consumer.stream();

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Shutdown signal received");
                    return true;
                }
                delivery = stream.next() => {
                    match delivery {
                        Some(Ok(message)) => {
                            let intent = match message.payload() {
                                Some(payload) => serde_json::from_slice::<OrderIntent>(payload),
                                None => {
                                    warn!(consumer = %self.name, "Delivery without payload, skipping");
                                    self.commit(consumer, &message);
                                    continue;
                                }
                            };

                            match intent {
                                Ok(intent) => {
                                    let started = std::time::Instant::now();
                                    let order_id = intent.order_id;
                                    match self.handler.handle(intent).await {
                                        Ok(()) => {
                                            metrics::counter!(
                                                "seckill.consume.total",
                                                "topic" => self.topic.clone(),
                                                "result" => "ok"
                                            )
                                            .increment(1);
                                            metrics::histogram!(
                                                "seckill.consume.duration_seconds",
                                                "topic" => self.topic.clone()
                                            )
                                            .record(started.elapsed().as_secs_f64());
                                            self.commit(consumer, &message);
                                        }
                                        Err(e) => {
                                            metrics::counter!(
                                                "seckill.consume.total",
                                                "topic" => self.topic.clone(),
                                                "result" => "error"
                                            )
                                            .increment(1);
                                            error!(
                                                consumer = %self.name,
                                                order_id = %order_id,
                                                error = %e,
                                                "Handler failed, delivery will be re-polled"
                                            );
                                            // No commit: resubscribe and resume from
                                            // the committed offset.
                                            return false;
                                        }
                                    }
                                }
                                Err(e) => {
                                    // Poison message: committing is the only way
                                    // to make progress on this partition.
                                    error!(
                                        consumer = %self.name,
                                        error = %e,
                                        "Undecodable intent payload, skipping"
                                    );
                                    metrics::counter!(
                                        "seckill.consume.total",
                                        "topic" => self.topic.clone(),
                                        "result" => "malformed"
                                    )
                                    .increment(1);
                                    self.commit(consumer, &message);
                                }
                            }
                        }
                        Some(Err(e)) => {
                            error!(consumer = %self.name, error = %e, "Transport error");
                            return false;
                        }
                        None => {
                            warn!(consumer = %self.name, "Delivery stream ended");
                            return false;
                        }
                    }
                }
            }
        }
    }

    fn commit(&self, consumer: &StreamConsumer, message: &rdkafka::message::BorrowedMessage<'_>) {
        if let Err(e) = consumer.commit_message(message, CommitMode::Async) {
            // The handler side effects are idempotent, so a redelivery after
            // a failed commit is absorbed downstream.
            warn!(
                consumer = %self.name,
                topic = message.topic(),
                partition = message.partition(),
                offset = message.offset(),
                error = %e,
                "Offset commit failed (delivery may repeat)"
            );
        } else {
            debug!(
                consumer = %self.name,
                offset = message.offset(),
                "Offset committed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use seckill_core::channel::FulfillmentError;

    struct NoopHandler;

    #[async_trait]
    impl IntentHandler for NoopHandler {
        async fn handle(&self, _intent: OrderIntent) -> Result<(), FulfillmentError> {
            Ok(())
        }
    }

    #[test]
    fn consumer_is_send() {
        fn assert_send<T: Send>() {}

        let (tx, rx) = broadcast::channel(1);
        let consumer = IntentConsumer::new(
            "fulfillment",
            "localhost:9092",
            "seckill-orders",
            "seckill-workers",
            Arc::new(NoopHandler),
            rx,
        );
        assert_send::<IntentConsumer>();
        assert_eq!(consumer.retry_delay, Duration::from_secs(5));
        drop(tx);
    }
}
