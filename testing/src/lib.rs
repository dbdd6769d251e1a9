//! # Seckill Testing
//!
//! In-memory implementations of every `seckill-core` seam, for unit and
//! integration tests that exercise the pipeline without Redis, Kafka, or
//! Postgres.
//!
//! The implementations honor the same contracts as the production
//! backends — the inventory store is atomic (one mutex guards both the
//! counter and the purchase set), the order store dedups on order ID, the
//! publisher records what it was given — so tests written against them
//! verify pipeline logic, not mock quirks.
//!
//! # Example
//!
//! ```
//! use seckill_testing::{InMemoryInventoryStore, SequentialIdGenerator};
//! use seckill_core::inventory::{InventoryStore, Reservation};
//! use seckill_core::types::{ItemId, UserId};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = InMemoryInventoryStore::default();
//! store.seed_item(ItemId(1), 1).await.unwrap();
//! assert_eq!(
//!     store.try_reserve(ItemId(1), UserId(7)).await.unwrap(),
//!     Reservation::Admitted
//! );
//! assert_eq!(
//!     store.try_reserve(ItemId(1), UserId(8)).await.unwrap(),
//!     Reservation::OutOfStock
//! );
//! # }
//! ```

#![allow(clippy::unwrap_used)] // Mutex poisoning aborts tests, which is the right failure mode

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use seckill_core::admission::{SaleSnapshot, SaleWindowSource, WindowLookupError};
use seckill_core::alert::{AlertError, AlertSink};
use seckill_core::channel::{ChannelError, IntentPublisher};
use seckill_core::environment::Clock;
use seckill_core::id::{IdError, IdGenerator};
use seckill_core::intent::OrderIntent;
use seckill_core::inventory::{InventoryError, InventoryStore, Released, Reservation};
use seckill_core::orders::{OrderOutcome, OrderStore, OrderStoreError};
use seckill_core::types::{ItemId, OrderId, UserId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

/// Fixed clock for deterministic tests.
///
/// Always returns the same instant until [`set`](Self::set) is called.
#[derive(Debug)]
pub struct FixedClock {
    time: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Create a clock pinned to `time`.
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Mutex::new(time),
        }
    }

    /// Move the clock.
    pub fn set(&self, time: DateTime<Utc>) {
        *self.time.lock().unwrap() = time;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.time.lock().unwrap()
    }
}

/// Window source answering from a fixed map.
#[derive(Default)]
pub struct StaticWindowSource {
    windows: Mutex<HashMap<ItemId, SaleSnapshot>>,
}

impl StaticWindowSource {
    /// Register (or replace) a window.
    pub fn insert(&self, snapshot: SaleSnapshot) {
        self.windows
            .lock()
            .unwrap()
            .insert(snapshot.window.item_id, snapshot);
    }
}

#[async_trait]
impl SaleWindowSource for StaticWindowSource {
    async fn sale_window(&self, item: ItemId) -> Result<Option<SaleSnapshot>, WindowLookupError> {
        Ok(self.windows.lock().unwrap().get(&item).cloned())
    }
}

#[derive(Default)]
struct InventoryInner {
    stock: HashMap<ItemId, i64>,
    purchases: HashMap<ItemId, HashSet<UserId>>,
}

/// Atomic in-memory inventory store.
///
/// A single mutex guards the counter and the purchase set together, giving
/// the same indivisibility the Redis backend gets from its Lua script.
#[derive(Default)]
pub struct InMemoryInventoryStore {
    inner: Mutex<InventoryInner>,
}

impl InMemoryInventoryStore {
    /// Users currently recorded as admitted for an item.
    #[must_use]
    pub fn admitted_users(&self, item: ItemId) -> HashSet<UserId> {
        self.inner
            .lock()
            .unwrap()
            .purchases
            .get(&item)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn try_reserve(
        &self,
        item: ItemId,
        user: UserId,
    ) -> Result<Reservation, InventoryError> {
        let mut inner = self.inner.lock().unwrap();
        let remaining = inner.stock.get(&item).copied().unwrap_or(-1);
        if remaining <= 0 {
            return Ok(Reservation::OutOfStock);
        }
        if inner
            .purchases
            .get(&item)
            .is_some_and(|set| set.contains(&user))
        {
            return Ok(Reservation::AlreadyPurchased);
        }
        inner.stock.insert(item, remaining - 1);
        inner.purchases.entry(item).or_default().insert(user);
        Ok(Reservation::Admitted)
    }

    async fn release(&self, item: ItemId, user: UserId) -> Result<Released, InventoryError> {
        let mut inner = self.inner.lock().unwrap();
        let removed = inner
            .purchases
            .get_mut(&item)
            .is_some_and(|set| set.remove(&user));
        if !removed {
            return Ok(Released::NotReserved);
        }
        *inner.stock.entry(item).or_insert(0) += 1;
        Ok(Released::Released)
    }

    async fn seed_item(&self, item: ItemId, stock: u32) -> Result<(), InventoryError> {
        let mut inner = self.inner.lock().unwrap();
        inner.stock.insert(item, i64::from(stock));
        inner.purchases.remove(&item);
        Ok(())
    }

    async fn remaining_stock(&self, item: ItemId) -> Result<Option<i64>, InventoryError> {
        Ok(self.inner.lock().unwrap().stock.get(&item).copied())
    }
}

/// Monotonic ID generator starting from a seed.
pub struct SequentialIdGenerator {
    next: AtomicI64,
}

impl SequentialIdGenerator {
    /// Start the sequence at `first`.
    #[must_use]
    pub const fn new(first: i64) -> Self {
        Self {
            next: AtomicI64::new(first),
        }
    }
}

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl IdGenerator for SequentialIdGenerator {
    async fn next_id(&self, _category: &str) -> Result<i64, IdError> {
        Ok(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

/// Publisher that records every intent it is given.
///
/// Flip [`set_failing`](Self::set_failing) to make publishes fail, e.g. to
/// exercise the no-commit path of the fulfillment handler.
#[derive(Default)]
pub struct CapturingPublisher {
    published: Mutex<Vec<OrderIntent>>,
    failing: AtomicBool,
}

impl CapturingPublisher {
    /// Everything published so far.
    #[must_use]
    pub fn published(&self) -> Vec<OrderIntent> {
        self.published.lock().unwrap().clone()
    }

    /// Make subsequent publishes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl IntentPublisher for CapturingPublisher {
    async fn publish(&self, intent: &OrderIntent) -> Result<(), ChannelError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChannelError::PublishFailed {
                topic: "in-memory".to_string(),
                reason: "publisher set to fail".to_string(),
            });
        }
        self.published.lock().unwrap().push(intent.clone());
        Ok(())
    }
}

#[derive(Default)]
struct OrderStoreInner {
    orders: HashMap<OrderId, OrderIntent>,
    stock: HashMap<ItemId, i64>,
    failures: VecDeque<OrderStoreError>,
}

/// In-memory order store with scripted failure injection.
///
/// Behaves like the Postgres store: dedups on order ID, refuses the
/// decrement at zero stock, and can be told to fail the next N calls with
/// a chosen error to drive the retry and dead-letter paths.
#[derive(Default)]
pub struct InMemoryOrderStore {
    inner: Mutex<OrderStoreInner>,
}

impl InMemoryOrderStore {
    /// Queue an error to be returned by the next `create_order` call.
    ///
    /// Queued failures are consumed in order before any real work happens.
    pub fn fail_next_with(&self, error: OrderStoreError) {
        self.inner.lock().unwrap().failures.push_back(error);
    }

    /// Number of rows currently persisted.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.inner.lock().unwrap().orders.len()
    }

    /// Whether an order row exists.
    #[must_use]
    pub fn contains(&self, order_id: OrderId) -> bool {
        self.inner.lock().unwrap().orders.contains_key(&order_id)
    }

    /// Durable stock counter for an item (0 when never seeded).
    #[must_use]
    pub fn durable_stock(&self, item: ItemId) -> i64 {
        self.inner
            .lock()
            .unwrap()
            .stock
            .get(&item)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_order(&self, intent: &OrderIntent) -> Result<OrderOutcome, OrderStoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.failures.pop_front() {
            return Err(error);
        }
        if inner.orders.contains_key(&intent.order_id) {
            return Ok(OrderOutcome::Duplicate);
        }
        let remaining = inner.stock.get(&intent.item_id).copied().unwrap_or(0);
        if remaining <= 0 {
            return Err(OrderStoreError::StockExhausted(intent.item_id));
        }
        inner.stock.insert(intent.item_id, remaining - 1);
        inner.orders.insert(intent.order_id, intent.clone());
        Ok(OrderOutcome::Created)
    }

    async fn seed_stock(&self, item: ItemId, stock: u32) -> Result<(), OrderStoreError> {
        self.inner
            .lock()
            .unwrap()
            .stock
            .insert(item, i64::from(stock));
        Ok(())
    }
}

/// Alert sink that records notifications.
#[derive(Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

impl RecordingAlertSink {
    /// `(subject, body)` pairs delivered so far.
    #[must_use]
    pub fn alerts(&self) -> Vec<(String, String)> {
        self.alerts.lock().unwrap().clone()
    }

    /// Make subsequent notifications fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), AlertError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AlertError::Delivery("sink set to fail".to_string()));
        }
        self.alerts
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
        Ok(())
    }
}
