//! # Seckill Kafka
//!
//! Kafka-backed order intent channels: a topic-pinned producer implementing
//! [`IntentPublisher`](seckill_core::channel::IntentPublisher) and a
//! consumer that drives an
//! [`IntentHandler`](seckill_core::channel::IntentHandler) with manual
//! offset commits.
//!
//! # Channel topology
//!
//! Three topics carry the same [`OrderIntent`](seckill_core::OrderIntent)
//! JSON payload:
//!
//! ```text
//! seckill-orders          accepted intents, keyed by item id
//! seckill-orders-retry    failed intents with retry bookkeeping
//! seckill-orders-dlq      intents that exhausted retries
//! ```
//!
//! Each channel gets its own producer instance and its own consumer group
//! (`{group}`, `{group}-retry`, `{group}-dlq`) so the three consumers never
//! compete for partitions.
//!
//! # Delivery semantics
//!
//! At-least-once with manual commits, committed only AFTER the handler
//! returns `Ok`. A handler error tears the consumer down and resubscribes,
//! which resumes from the last committed offset — the failed delivery comes
//! back on the next poll. Handlers must be idempotent (the order store
//! dedups on order ID).

mod consumer;
mod producer;

pub use consumer::IntentConsumer;
pub use producer::{KafkaIntentProducer, KafkaIntentProducerBuilder};
