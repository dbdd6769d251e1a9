//! The synchronous admission path.
//!
//! [`AdmissionEngine::seckill`] is the one caller-facing operation of the
//! pipeline: validate the sale window, take the authoritative atomic
//! reservation, and hand the accepted intent across the async boundary. It
//! runs on the calling task and is dominated by a single round trip to the
//! inventory store.

use crate::channel::IntentPublisher;
use crate::environment::Clock;
use crate::id::IdGenerator;
use crate::intent::OrderIntent;
use crate::inventory::{InventoryStore, Reservation};
use crate::types::{ItemId, OrderId, SaleStatus, SaleWindow, UserId};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// A sale window together with the stock snapshot read alongside it.
///
/// The snapshot is a fast-path hint only — the atomic reservation remains
/// authoritative. It lets the engine reject certain-failure requests
/// without paying the inventory-store round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleSnapshot {
    /// The provisioned window.
    pub window: SaleWindow,
    /// Durable remaining stock at lookup time. Not authoritative.
    pub stock: i64,
}

/// Failure to look a sale window up (the lookup itself, not its absence).
#[derive(Error, Debug, Clone)]
#[error("sale window lookup failed: {0}")]
pub struct WindowLookupError(pub String);

/// Read-only source of sale windows.
///
/// Window provisioning is plain CRUD owned by the surrounding application;
/// this core only ever reads through this seam.
#[async_trait]
pub trait SaleWindowSource: Send + Sync {
    /// Look up the window and stock snapshot for an item, `None` when the
    /// item has no flash sale configured.
    ///
    /// # Errors
    ///
    /// Returns [`WindowLookupError`] when the lookup itself fails.
    async fn sale_window(&self, item: ItemId) -> Result<Option<SaleSnapshot>, WindowLookupError>;
}

/// Caller-facing rejection taxonomy.
///
/// Validation and fast-path rejections are authoritative and never retried;
/// `Internal` covers infrastructure failures on the synchronous path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// No flash sale is configured for the item.
    #[error("item not found")]
    ItemNotFound,
    /// The sale exists but is not published.
    #[error("item is not active")]
    ItemInactive,
    /// The sale window has not opened yet.
    #[error("sale has not started")]
    NotStarted,
    /// The sale window has closed.
    #[error("sale has ended")]
    Ended,
    /// Remaining stock is exhausted.
    #[error("out of stock")]
    NoStock,
    /// The user already holds an admission for this item.
    #[error("limit one per user")]
    DuplicatePurchase,
    /// Window lookup, ID generation, or the inventory store failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AdmissionError {
    /// Stable label for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::ItemNotFound => "item_not_found",
            Self::ItemInactive => "item_inactive",
            Self::NotStarted => "not_started",
            Self::Ended => "ended",
            Self::NoStock => "no_stock",
            Self::DuplicatePurchase => "duplicate_purchase",
            Self::Internal(_) => "internal",
        }
    }
}

/// The synchronous admission engine.
///
/// Per request the engine moves through `Validating → Reserved → Enqueued`;
/// no state outlives the call. All durable state lives behind the
/// [`InventoryStore`] and the intent channel.
///
/// # Example
///
/// ```rust,ignore
/// let engine = AdmissionEngine::new(windows, inventory, ids, intents, clock);
/// match engine.seckill(item, user).await {
///     Ok(order_id) => respond_accepted(order_id),
///     Err(reason) => respond_rejected(reason),
/// }
/// ```
pub struct AdmissionEngine {
    windows: Arc<dyn SaleWindowSource>,
    inventory: Arc<dyn InventoryStore>,
    ids: Arc<dyn IdGenerator>,
    intents: Arc<dyn IntentPublisher>,
    clock: Arc<dyn Clock>,
}

impl AdmissionEngine {
    /// Assemble an engine from its seams.
    #[must_use]
    pub fn new(
        windows: Arc<dyn SaleWindowSource>,
        inventory: Arc<dyn InventoryStore>,
        ids: Arc<dyn IdGenerator>,
        intents: Arc<dyn IntentPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            windows,
            inventory,
            ids,
            intents,
            clock,
        }
    }

    /// Attempt a flash-sale purchase for `(item, user)`.
    ///
    /// Checks run in order, first failure wins: window existence, status,
    /// time bounds, snapshot stock (fast path), then the authoritative
    /// atomic reservation. On admission an [`OrderIntent`] is published to
    /// the intent channel keyed by item.
    ///
    /// A publish failure does NOT revoke the admission: the reservation
    /// already happened, so the order ID is still returned and the durable
    /// write is reconciled out of band. That gap is logged and counted for
    /// operators; it is not a correctness violation of the decision.
    ///
    /// # Errors
    ///
    /// One of the [`AdmissionError`] rejections, or
    /// [`AdmissionError::Internal`] when the synchronous path's
    /// infrastructure fails.
    pub async fn seckill(&self, item: ItemId, user: UserId) -> Result<OrderId, AdmissionError> {
        let started = Instant::now();
        let result = self.admit(item, user).await;

        let elapsed = started.elapsed().as_secs_f64();
        match &result {
            Ok(order_id) => {
                metrics::counter!("seckill.admission.total", "result" => "admitted").increment(1);
                metrics::histogram!("seckill.admission.duration_seconds", "result" => "admitted")
                    .record(elapsed);
                tracing::info!(
                    item_id = %item,
                    user_id = %user,
                    order_id = %order_id,
                    "Admission granted"
                );
            }
            Err(e) => {
                metrics::counter!(
                    "seckill.admission.total",
                    "result" => "rejected",
                    "reason" => e.reason()
                )
                .increment(1);
                metrics::histogram!("seckill.admission.duration_seconds", "result" => "rejected")
                    .record(elapsed);
                tracing::debug!(
                    item_id = %item,
                    user_id = %user,
                    reason = e.reason(),
                    "Admission rejected"
                );
            }
        }

        result
    }

    async fn admit(&self, item: ItemId, user: UserId) -> Result<OrderId, AdmissionError> {
        let snapshot = self
            .windows
            .sale_window(item)
            .await
            .map_err(|e| AdmissionError::Internal(e.to_string()))?
            .ok_or(AdmissionError::ItemNotFound)?;

        if snapshot.window.status != SaleStatus::Active {
            return Err(AdmissionError::ItemInactive);
        }

        let now = self.clock.now();
        if now < snapshot.window.begin_time {
            return Err(AdmissionError::NotStarted);
        }
        if now > snapshot.window.end_time {
            return Err(AdmissionError::Ended);
        }

        // Fast path: a snapshot already at zero cannot be admitted, so skip
        // the inventory round trip. The atomic reserve below stays
        // authoritative for every request that passes this check.
        if snapshot.stock <= 0 {
            return Err(AdmissionError::NoStock);
        }

        let order_id = self
            .ids
            .next_id("order")
            .await
            .map_err(|e| AdmissionError::Internal(e.to_string()))?;

        match self
            .inventory
            .try_reserve(item, user)
            .await
            .map_err(|e| AdmissionError::Internal(e.to_string()))?
        {
            Reservation::OutOfStock => return Err(AdmissionError::NoStock),
            Reservation::AlreadyPurchased => return Err(AdmissionError::DuplicatePurchase),
            Reservation::Admitted => {}
        }

        let order_id = OrderId(order_id);
        let intent = OrderIntent::new(order_id, user, item, now);

        if let Err(e) = self.intents.publish(&intent).await {
            // The reservation stands; the intent never reached the channel.
            // Fulfillment for this order must be reconciled out of band.
            metrics::counter!("seckill.admission.enqueue_failures").increment(1);
            tracing::error!(
                order_id = %order_id,
                item_id = %item,
                user_id = %user,
                error = %e,
                "Intent publish failed after successful reservation"
            );
        }

        Ok(order_id)
    }
}
