//! The fulfillment state machine.
//!
//! One handler serves both the intent channel and the retry channel (two
//! consumer instances, different groups, same logic). Per delivery:
//!
//! ```text
//! wait until next_retry_at (retry hops only)
//!         │
//!         ▼
//! create_order ── Created/Duplicate ──────────────► Ok (commit)
//!         │
//!         ├─ non-retryable ──► compensate ──► DLQ ─► Ok (commit)
//!         │
//!         ├─ retryable, budget left ──► retry hop ─► Ok (commit)
//!         │
//!         └─ retryable, exhausted ─► compensate ──► DLQ ─► Ok (commit)
//!
//! any hop publish failure ──► Err (no commit, delivery re-polled)
//! ```
//!
//! Once an intent is routed onto the retry channel, the hop owns it — the
//! original delivery is committed and the retry consumer picks the story
//! up after the scheduled backoff.

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use seckill_core::channel::{FulfillmentError, IntentHandler, IntentPublisher};
use seckill_core::environment::Clock;
use seckill_core::intent::OrderIntent;
use seckill_core::inventory::{InventoryStore, Released};
use seckill_core::orders::{OrderOutcome, OrderStore, OrderStoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::retry::RetryPolicy;

/// Handler that durably persists admitted intents.
pub struct FulfillmentHandler {
    orders: Arc<dyn OrderStore>,
    inventory: Arc<dyn InventoryStore>,
    retry_out: Arc<dyn IntentPublisher>,
    dead_letter_out: Arc<dyn IntentPublisher>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    shutdown: broadcast::Sender<()>,
}

impl FulfillmentHandler {
    /// Assemble a handler from its seams.
    ///
    /// `retry_out` and `dead_letter_out` must be pinned to the retry and
    /// dead-letter channels respectively; `shutdown` is the pipeline-wide
    /// signal that makes retry waits interruptible.
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderStore>,
        inventory: Arc<dyn InventoryStore>,
        retry_out: Arc<dyn IntentPublisher>,
        dead_letter_out: Arc<dyn IntentPublisher>,
        policy: RetryPolicy,
        clock: Arc<dyn Clock>,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        Self {
            orders,
            inventory,
            retry_out,
            dead_letter_out,
            policy,
            clock,
            shutdown,
        }
    }

    /// Sleep until the intent's scheduled attempt time, if any.
    ///
    /// The wait is the retry scheduling mechanism — there is no separate
    /// timer service. It is bounded by construction (backoff caps at the
    /// policy's `max_delay`) and interruptible by shutdown.
    async fn wait_until_due(&self, intent: &OrderIntent) -> Result<(), FulfillmentError> {
        let Some(due) = intent.next_retry_at else {
            return Ok(());
        };
        let now = self.clock.now();
        if due <= now {
            return Ok(());
        }

        let wait = (due - now).to_std().unwrap_or(Duration::ZERO);
        tracing::debug!(
            order_id = %intent.order_id,
            wait_ms = wait.as_millis(),
            "Delaying fulfillment until scheduled retry time"
        );

        let mut shutdown = self.shutdown.subscribe();
        tokio::select! {
            _ = shutdown.recv() => Err(FulfillmentError::Interrupted),
            () = tokio::time::sleep(wait) => Ok(()),
        }
    }

    /// Undo the fast-path reservation for a terminally-failed intent.
    ///
    /// Safe to re-run: the store only credits stock when the user was
    /// actually recorded, so a redelivered terminal failure cannot
    /// over-compensate.
    async fn compensate(&self, intent: &OrderIntent) -> Result<(), FulfillmentError> {
        match self
            .inventory
            .release(intent.item_id, intent.user_id)
            .await?
        {
            Released::Released => {
                metrics::counter!("seckill.pipeline.total", "phase" => "compensated").increment(1);
                tracing::warn!(
                    order_id = %intent.order_id,
                    item_id = %intent.item_id,
                    user_id = %intent.user_id,
                    "Reservation compensated, slot returned to pool"
                );
            }
            Released::NotReserved => {
                tracing::debug!(
                    order_id = %intent.order_id,
                    "Reservation already compensated"
                );
            }
        }
        Ok(())
    }

    /// Route a failed intent to the retry channel or, once the budget is
    /// spent, compensate and dead-letter it.
    async fn route_failure(
        &self,
        intent: &OrderIntent,
        error: &OrderStoreError,
    ) -> Result<(), FulfillmentError> {
        if error.is_retryable() && self.policy.allows_retry(intent.retry_count) {
            let retry = intent.retry_count + 1;
            let delay = self.policy.delay_for_retry(retry);
            let due = self.clock.now()
                + ChronoDuration::from_std(delay).unwrap_or(ChronoDuration::seconds(30));
            let hop = intent.for_retry(error.to_string(), due);

            // A failed hop publish is the one case that withholds the
            // commit: the original delivery must come back.
            self.retry_out.publish(&hop).await?;

            metrics::counter!("seckill.pipeline.total", "phase" => "retried").increment(1);
            tracing::warn!(
                order_id = %intent.order_id,
                retry = retry,
                delay_ms = delay.as_millis(),
                error = %error,
                "Fulfillment failed, scheduled for retry"
            );
            return Ok(());
        }

        // Terminal: either a non-retryable business failure or an
        // exhausted retry budget. Give the slot back, then hand the intent
        // to the alerting consumer.
        self.compensate(intent).await?;
        self.dead_letter_out
            .publish(&intent.for_dead_letter(error.to_string()))
            .await?;

        metrics::counter!("seckill.pipeline.total", "phase" => "dead_lettered").increment(1);
        tracing::error!(
            order_id = %intent.order_id,
            retry_count = intent.retry_count,
            retryable = error.is_retryable(),
            error = %error,
            "Fulfillment abandoned, intent dead-lettered"
        );
        Ok(())
    }
}

#[async_trait]
impl IntentHandler for FulfillmentHandler {
    async fn handle(&self, intent: OrderIntent) -> Result<(), FulfillmentError> {
        self.wait_until_due(&intent).await?;

        match self.orders.create_order(&intent).await {
            Ok(OrderOutcome::Created) => {
                metrics::counter!("seckill.pipeline.total", "phase" => "fulfilled").increment(1);
                tracing::info!(
                    order_id = %intent.order_id,
                    item_id = %intent.item_id,
                    retry_count = intent.retry_count,
                    "Order fulfilled"
                );
                Ok(())
            }
            Ok(OrderOutcome::Duplicate) => {
                // Redelivery: the earlier delivery already did the work.
                metrics::counter!("seckill.pipeline.total", "phase" => "duplicate").increment(1);
                tracing::debug!(
                    order_id = %intent.order_id,
                    "Duplicate delivery absorbed"
                );
                Ok(())
            }
            Err(error) => self.route_failure(&intent, &error).await,
        }
    }
}
