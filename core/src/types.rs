//! Identifier newtypes and the sale window description.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a sellable item (a flash-sale voucher/SKU).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub i64);

/// Identifier of a purchasing user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Globally unique order identifier produced by the [`IdGenerator`](crate::id::IdGenerator).
///
/// The high bits carry a coarse timestamp, the low 32 bits a per-period
/// sequence, so IDs sort roughly by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub i64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Whether a sale window is open for admission at all.
///
/// Inactive windows reject every request regardless of time or stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    /// The sale is live (subject to its time bounds).
    Active,
    /// The sale has been taken down or never published.
    Inactive,
}

/// Per-item flash-sale window, externally provisioned and read-only here.
///
/// The window is immutable once the sale starts; the admission engine only
/// reads it to validate time bounds and status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleWindow {
    /// The item this window sells.
    pub item_id: ItemId,
    /// Earliest instant at which admission is allowed.
    pub begin_time: DateTime<Utc>,
    /// Latest instant at which admission is allowed.
    pub end_time: DateTime<Utc>,
    /// Whether the window is published.
    pub status: SaleStatus,
    /// Stock the window opened with.
    pub initial_stock: u32,
}

impl SaleWindow {
    /// True when `now` falls inside `[begin_time, end_time]`.
    #[must_use]
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        now >= self.begin_time && now <= self.end_time
    }
}
