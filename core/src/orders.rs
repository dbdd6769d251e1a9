//! Durable order persistence seam.

use crate::intent::OrderIntent;
use crate::types::ItemId;
use async_trait::async_trait;
use thiserror::Error;

/// Result of a successful `create_order` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOutcome {
    /// A new order row was written and durable stock decremented.
    Created,
    /// The row already existed — a redelivered intent. Nothing was written;
    /// the earlier transaction already decremented stock.
    Duplicate,
}

/// Errors surfaced by the durable order store.
#[derive(Error, Debug, Clone)]
pub enum OrderStoreError {
    /// The conditional durable stock decrement matched zero rows.
    ///
    /// The fast-path reservation succeeded, so durable stock should have
    /// been available — this indicates drift between the inventory store
    /// and the durable counter. Not retryable: resubmitting the same intent
    /// cannot make stock appear.
    #[error("durable stock exhausted for item {0}")]
    StockExhausted(ItemId),

    /// Transient database/network failure; safe to retry.
    #[error("database error: {0}")]
    Database(String),
}

impl OrderStoreError {
    /// Whether a retry could plausibly succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Database(_) => true,
            Self::StockExhausted(_) => false,
        }
    }
}

/// Transactionally persists admitted orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist one order inside a single transaction: insert the row keyed
    /// by `order_id`, then conditionally decrement the durable stock
    /// counter (`remaining > 0`).
    ///
    /// A primary-key collision on the insert means the intent was delivered
    /// before; the call reports [`OrderOutcome::Duplicate`] and changes
    /// nothing — duplicate delivery is a success, not an error.
    ///
    /// # Errors
    ///
    /// - [`OrderStoreError::StockExhausted`] when the conditional decrement
    ///   matches zero rows (transaction rolled back; non-retryable).
    /// - [`OrderStoreError::Database`] for transient failures (retryable).
    async fn create_order(&self, intent: &OrderIntent) -> Result<OrderOutcome, OrderStoreError>;

    /// Seed or reset the durable stock counter for an item.
    ///
    /// # Errors
    ///
    /// Returns [`OrderStoreError::Database`] on failure.
    async fn seed_stock(&self, item: ItemId, stock: u32) -> Result<(), OrderStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_exhaustion_is_not_retryable() {
        assert!(!OrderStoreError::StockExhausted(ItemId(1)).is_retryable());
        assert!(OrderStoreError::Database("connection reset".into()).is_retryable());
    }
}
