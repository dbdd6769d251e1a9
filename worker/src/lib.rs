//! # Seckill Worker
//!
//! The asynchronous half of the flash-sale pipeline: consumers that turn
//! accepted [`OrderIntent`](seckill_core::OrderIntent)s into durable
//! orders, with bounded retries, compensation, and dead-letter alerting.
//!
//! # Consumers
//!
//! Three independent background tasks, one per channel, sharing a single
//! shutdown broadcast:
//!
//! - **fulfillment** — consumes the intent channel, persists orders
//! - **retry** — the same [`FulfillmentHandler`], consuming the retry
//!   channel; each delivery carries its own scheduled attempt time
//! - **dead-letter** — consumes abandoned intents and alerts an operator
//!
//! # Failure taxonomy
//!
//! Transient storage failures hop onto the retry channel with exponential
//! backoff (1s, 2s, 4s, capped at 30s) up to 3 attempts. A durable stock
//! counter that disagrees with the fast path
//! ([`StockExhausted`](seckill_core::orders::OrderStoreError::StockExhausted))
//! is non-retryable: the reservation is compensated and the intent
//! dead-lettered immediately. Duplicate deliveries are not failures at all.

pub mod alert;
pub mod config;
pub mod dead_letter;
pub mod fulfillment;
pub mod pipeline;
pub mod retry;

pub use alert::{SmtpAlertSink, TracingAlertSink};
pub use config::Config;
pub use dead_letter::DeadLetterHandler;
pub use fulfillment::FulfillmentHandler;
pub use pipeline::Pipeline;
pub use retry::RetryPolicy;
