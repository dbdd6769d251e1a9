//! Topic-pinned intent producer.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use seckill_core::channel::{ChannelError, IntentPublisher};
use seckill_core::intent::OrderIntent;
use std::time::Duration;

/// Kafka producer bound to a single intent channel.
///
/// One instance exists per channel (intent, retry, dead-letter). Messages
/// are keyed by `item_id`, so every intent for one item lands in the same
/// partition and fulfillment observes per-item admission order. Headers
/// carry `order-id` and `retry-count` for correlation without decoding the
/// payload.
///
/// # Example
///
/// ```no_run
/// use seckill_kafka::KafkaIntentProducer;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let producer = KafkaIntentProducer::builder()
///     .brokers("localhost:9092")
///     .topic("seckill-orders")
///     .acks("all")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct KafkaIntentProducer {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaIntentProducer {
    /// Create a builder.
    #[must_use]
    pub fn builder() -> KafkaIntentProducerBuilder {
        KafkaIntentProducerBuilder::default()
    }

    /// The topic this producer is pinned to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Builder for [`KafkaIntentProducer`].
#[derive(Default)]
pub struct KafkaIntentProducerBuilder {
    brokers: Option<String>,
    topic: Option<String>,
    acks: Option<String>,
    timeout: Option<Duration>,
}

impl KafkaIntentProducerBuilder {
    /// Comma-separated broker addresses.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Topic to publish to.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Producer acknowledgment mode: "0", "1" or "all" (default: "1").
    #[must_use]
    pub fn acks(mut self, acks: impl Into<String>) -> Self {
        self.acks = Some(acks.into());
        self
    }

    /// Send timeout (default: 5 seconds).
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the producer.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Transport`] when brokers or topic are
    /// missing, or the underlying producer cannot be created.
    pub fn build(self) -> Result<KafkaIntentProducer, ChannelError> {
        let brokers = self
            .brokers
            .ok_or_else(|| ChannelError::Transport("brokers not configured".to_string()))?;
        let topic = self
            .topic
            .ok_or_else(|| ChannelError::Transport("topic not configured".to_string()))?;

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", self.acks.as_deref().unwrap_or("1"))
            .create()
            .map_err(|e| ChannelError::Transport(format!("failed to create producer: {e}")))?;

        tracing::info!(
            brokers = %brokers,
            topic = %topic,
            acks = self.acks.as_deref().unwrap_or("1"),
            "Kafka intent producer created"
        );

        Ok(KafkaIntentProducer {
            producer,
            topic,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
        })
    }
}

#[async_trait]
impl IntentPublisher for KafkaIntentProducer {
    async fn publish(&self, intent: &OrderIntent) -> Result<(), ChannelError> {
        let payload = serde_json::to_vec(intent)
            .map_err(|e| ChannelError::Malformed(format!("intent serialization failed: {e}")))?;

        // Partition key: all intents for one item share a partition.
        let key = intent.item_id.to_string();
        let order_id = intent.order_id.to_string();
        let retry_count = intent.retry_count.to_string();
        let headers = OwnedHeaders::new()
            .insert(Header {
                key: "order-id",
                value: Some(order_id.as_str()),
            })
            .insert(Header {
                key: "retry-count",
                value: Some(retry_count.as_str()),
            });

        let record = FutureRecord::to(&self.topic)
            .payload(&payload)
            .key(&key)
            .headers(headers);

        match self.producer.send(record, Timeout::After(self.timeout)).await {
            Ok((partition, offset)) => {
                metrics::counter!(
                    "seckill.publish.total",
                    "topic" => self.topic.clone(),
                    "result" => "ok"
                )
                .increment(1);
                tracing::debug!(
                    topic = %self.topic,
                    partition,
                    offset,
                    order_id = %intent.order_id,
                    "Intent published"
                );
                Ok(())
            }
            Err((kafka_error, _)) => {
                metrics::counter!(
                    "seckill.publish.total",
                    "topic" => self.topic.clone(),
                    "result" => "error"
                )
                .increment(1);
                tracing::error!(
                    topic = %self.topic,
                    order_id = %intent.order_id,
                    error = %kafka_error,
                    "Intent publish failed"
                );
                Err(ChannelError::PublishFailed {
                    topic: self.topic.clone(),
                    reason: kafka_error.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn builder_requires_brokers_and_topic() {
        assert!(KafkaIntentProducer::builder().build().is_err());
        assert!(
            KafkaIntentProducer::builder()
                .brokers("localhost:9092")
                .build()
                .is_err()
        );
    }

    #[test]
    fn producer_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<KafkaIntentProducer>();
        assert_sync::<KafkaIntentProducer>();
    }
}
