//! The inventory store seam: the authoritative admission decision.
//!
//! The store holds two pieces of state per item: a remaining-stock counter
//! and the set of users already admitted. [`InventoryStore::try_reserve`] is
//! the single place both are checked and mutated, and implementations MUST
//! perform it as one indivisible server-side step — the production backend
//! runs a Lua script (`seckill-redis`), the test backend holds one mutex
//! (`seckill-testing`). Callers never read-then-write across two round
//! trips; that ordering is racy under concurrent admission.

use crate::types::{ItemId, UserId};
use async_trait::async_trait;
use thiserror::Error;

/// Outcome of the atomic admission operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// Stock decremented and the user recorded; the slot is theirs.
    Admitted,
    /// Remaining stock was zero. Decrements are refused, never clamped.
    OutOfStock,
    /// The user already holds a reservation for this item.
    AlreadyPurchased,
}

/// Outcome of the compensating release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Released {
    /// The reservation existed and has been undone: stock incremented,
    /// user removed from the purchase set.
    Released,
    /// No reservation was held (already compensated, or never admitted).
    /// Stock is left untouched — this is what makes compensation idempotent.
    NotReserved,
}

/// Errors surfaced by an inventory store backend.
#[derive(Error, Debug, Clone)]
pub enum InventoryError {
    /// The backing store is unreachable or rejected the operation.
    #[error("inventory backend error: {0}")]
    Backend(String),
}

/// Atomic per-item stock counters and purchase-record sets.
///
/// # Contract
///
/// For any item seeded with stock `N`, under arbitrary concurrent callers:
///
/// - at most `N` calls to [`try_reserve`](Self::try_reserve) ever return
///   [`Reservation::Admitted`], and the counter never goes negative;
/// - at most one `Admitted` is ever produced per `(item, user)` pair;
/// - [`release`](Self::release) undoes exactly one reservation and is a
///   no-op when none is held.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// The atomic admission check-and-reserve (stock check, duplicate check,
    /// decrement + record) in one indivisible step.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Backend`] when the store is unavailable;
    /// the admission decision is then unknown and the request must fail.
    async fn try_reserve(&self, item: ItemId, user: UserId)
        -> Result<Reservation, InventoryError>;

    /// Compensating action: return the reserved slot to the pool.
    ///
    /// Removes the user from the purchase record and, only if the user was
    /// actually recorded, increments stock — re-running it cannot
    /// over-credit the counter.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Backend`] when the store is unavailable.
    async fn release(&self, item: ItemId, user: UserId) -> Result<Released, InventoryError>;

    /// Warm the counters for an item before its window opens: sets remaining
    /// stock and clears any purchase records.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Backend`] when the store is unavailable.
    async fn seed_item(&self, item: ItemId, stock: u32) -> Result<(), InventoryError>;

    /// Read-only stock snapshot; `None` when the item was never seeded.
    ///
    /// Diagnostic only — admission always goes through
    /// [`try_reserve`](Self::try_reserve).
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Backend`] when the store is unavailable.
    async fn remaining_stock(&self, item: ItemId) -> Result<Option<i64>, InventoryError>;
}
