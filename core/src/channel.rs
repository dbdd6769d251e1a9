//! Message channel seams: publishing intents and handling deliveries.
//!
//! Three logical durable channels carry [`OrderIntent`]s — intent, retry,
//! and dead-letter. A publisher is pinned to one channel at construction
//! (the Kafka implementation wraps one producer per topic), and consumers
//! drive an [`IntentHandler`] per delivery.
//!
//! # Delivery semantics
//!
//! Channels deliver at-least-once. A consumer commits a delivery only after
//! its handler returns `Ok`; a handler error leaves the offset uncommitted
//! so the message is redelivered on the next poll. Handlers therefore
//! express "keep this message" by returning an error — and anything they do
//! must tolerate redelivery (the order store dedups on `order_id`).

use crate::intent::OrderIntent;
use crate::inventory::InventoryError;
use crate::orders::OrderStoreError;
use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by channel backends.
#[derive(Error, Debug, Clone)]
pub enum ChannelError {
    /// The event could not be handed to the channel.
    #[error("publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that refused the message.
        topic: String,
        /// Backend-reported reason.
        reason: String,
    },

    /// Could not subscribe or join the consumer group.
    #[error("subscription failed for topic '{topic}': {reason}")]
    SubscribeFailed {
        /// The topic that could not be subscribed.
        topic: String,
        /// Backend-reported reason.
        reason: String,
    },

    /// A delivered payload could not be decoded into an [`OrderIntent`].
    #[error("malformed intent payload: {0}")]
    Malformed(String),

    /// Network or broker-level failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors a fulfillment-side handler can surface to its consumer.
///
/// Returning any of these from [`IntentHandler::handle`] means "do not
/// commit this delivery" — the consumer leaves the offset where it is and
/// the channel redelivers.
#[derive(Error, Debug)]
pub enum FulfillmentError {
    /// The durable order store failed.
    #[error(transparent)]
    Store(#[from] OrderStoreError),

    /// A channel operation (typically the retry/DLQ hop publish) failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The inventory store failed during compensation.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Shutdown fired before handling completed; the delivery should be
    /// re-polled on the next start.
    #[error("interrupted by shutdown")]
    Interrupted,
}

/// Publishes intents onto the channel the instance was built for.
#[async_trait]
pub trait IntentPublisher: Send + Sync {
    /// Publish one intent, keyed so all intents for one item share a
    /// partition (per-item ordering, bounded per-item fan-out).
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::PublishFailed`] when the channel refuses or
    /// times out. Callers decide what that means: the admission engine
    /// keeps the reservation, the fulfillment worker withholds its commit.
    async fn publish(&self, intent: &OrderIntent) -> Result<(), ChannelError>;
}

/// Processes one delivered intent.
///
/// Implementations must be idempotent under redelivery: the same intent
/// (same `order_id`) may arrive any number of times.
#[async_trait]
pub trait IntentHandler: Send + Sync + 'static {
    /// Handle one delivery.
    ///
    /// # Errors
    ///
    /// An error tells the consumer NOT to commit the delivery; the message
    /// stays on the channel and is redelivered. Handlers that have fully
    /// resolved an intent — including by routing it to the retry or
    /// dead-letter channel — return `Ok` so the original is committed.
    async fn handle(&self, intent: OrderIntent) -> Result<(), FulfillmentError>;
}
