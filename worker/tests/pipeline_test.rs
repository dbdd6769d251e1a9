//! End-to-end pipeline tests against the in-memory seams.
//!
//! These tests wire the real admission engine and the real fulfillment
//! state machine to the `seckill-testing` backends, covering the
//! pipeline's contract: no oversell, no double admission, idempotent
//! persistence, the 3-retry budget with capped backoff, dead-lettering,
//! and compensation.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use seckill_core::admission::{AdmissionEngine, AdmissionError, SaleSnapshot};
use seckill_core::channel::{FulfillmentError, IntentHandler};
use seckill_core::intent::OrderIntent;
use seckill_core::inventory::InventoryStore;
use seckill_core::orders::{OrderStore, OrderStoreError};
use seckill_core::types::{ItemId, OrderId, SaleStatus, SaleWindow, UserId};
use seckill_testing::{
    CapturingPublisher, FixedClock, InMemoryInventoryStore, InMemoryOrderStore,
    RecordingAlertSink, SequentialIdGenerator, StaticWindowSource,
};
use seckill_worker::{DeadLetterHandler, FulfillmentHandler, RetryPolicy};
use std::sync::Arc;
use tokio::sync::broadcast;

const ITEM: ItemId = ItemId(7);

fn sale_open() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 11, 0, 0).single().unwrap()
}

struct Harness {
    windows: Arc<StaticWindowSource>,
    inventory: Arc<InMemoryInventoryStore>,
    intents: Arc<CapturingPublisher>,
    retry_out: Arc<CapturingPublisher>,
    dead_letter_out: Arc<CapturingPublisher>,
    orders: Arc<InMemoryOrderStore>,
    clock: Arc<FixedClock>,
    engine: Arc<AdmissionEngine>,
    handler: Arc<FulfillmentHandler>,
    _shutdown: broadcast::Sender<()>,
}

fn harness() -> Harness {
    let windows = Arc::new(StaticWindowSource::default());
    let inventory = Arc::new(InMemoryInventoryStore::default());
    let intents = Arc::new(CapturingPublisher::default());
    let retry_out = Arc::new(CapturingPublisher::default());
    let dead_letter_out = Arc::new(CapturingPublisher::default());
    let orders = Arc::new(InMemoryOrderStore::default());
    let clock = Arc::new(FixedClock::new(sale_open()));
    let (shutdown, _) = broadcast::channel(1);

    let engine = Arc::new(AdmissionEngine::new(
        Arc::clone(&windows) as _,
        Arc::clone(&inventory) as _,
        Arc::new(SequentialIdGenerator::new(5000)),
        Arc::clone(&intents) as _,
        Arc::clone(&clock) as _,
    ));
    let handler = Arc::new(FulfillmentHandler::new(
        Arc::clone(&orders) as _,
        Arc::clone(&inventory) as _,
        Arc::clone(&retry_out) as _,
        Arc::clone(&dead_letter_out) as _,
        RetryPolicy::default(),
        Arc::clone(&clock) as _,
        shutdown.clone(),
    ));

    Harness {
        windows,
        inventory,
        intents,
        retry_out,
        dead_letter_out,
        orders,
        clock,
        engine,
        handler,
        _shutdown: shutdown,
    }
}

impl Harness {
    /// Provision an open window and warm both stock counters.
    async fn open_item(&self, fast_stock: u32, durable_stock: u32) {
        self.windows.insert(SaleSnapshot {
            window: SaleWindow {
                item_id: ITEM,
                begin_time: Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).single().unwrap(),
                end_time: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().unwrap(),
                status: SaleStatus::Active,
                initial_stock: fast_stock,
            },
            stock: i64::from(fast_stock),
        });
        self.inventory.seed_item(ITEM, fast_stock).await.unwrap();
        self.orders.seed_stock(ITEM, durable_stock).await.unwrap();
    }

    /// Admit a user and return the intent that reached the channel.
    async fn admit(&self, user: UserId) -> OrderIntent {
        self.engine.seckill(ITEM, user).await.unwrap();
        self.intents.published().last().cloned().unwrap()
    }
}

#[tokio::test]
async fn admitted_order_reaches_durable_persistence() {
    let h = harness();
    h.open_item(3, 3).await;

    let intent = h.admit(UserId(42)).await;
    h.handler.handle(intent.clone()).await.unwrap();

    assert!(h.orders.contains(intent.order_id));
    assert_eq!(h.orders.durable_stock(ITEM), 2);
    assert_eq!(h.inventory.remaining_stock(ITEM).await.unwrap(), Some(2));
}

#[tokio::test]
async fn one_slot_two_buyers_admits_exactly_one() {
    let h = harness();
    h.open_item(1, 1).await;

    let a = tokio::spawn({
        let engine = Arc::clone(&h.engine);
        async move { engine.seckill(ITEM, UserId(1)).await }
    });
    let b = tokio::spawn({
        let engine = Arc::clone(&h.engine);
        async move { engine.seckill(ITEM, UserId(2)).await }
    });

    let results = [a.await.unwrap(), b.await.unwrap()];
    let admitted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(admitted, 1);
    assert!(
        results
            .iter()
            .any(|r| r.as_ref().err() == Some(&AdmissionError::NoStock))
    );
}

#[tokio::test]
async fn no_oversell_under_concurrent_load() {
    let h = harness();
    h.open_item(5, 5).await;

    let mut tasks = Vec::new();
    for user in 0..50 {
        let engine = Arc::clone(&h.engine);
        tasks.push(tokio::spawn(async move {
            engine.seckill(ITEM, UserId(user)).await
        }));
    }

    let mut admitted = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 5);
    assert_eq!(h.inventory.remaining_stock(ITEM).await.unwrap(), Some(0));
    assert_eq!(h.inventory.admitted_users(ITEM).len(), 5);
}

#[tokio::test]
async fn same_user_cannot_buy_twice() {
    let h = harness();
    h.open_item(5, 5).await;

    h.engine.seckill(ITEM, UserId(9)).await.unwrap();
    let err = h.engine.seckill(ITEM, UserId(9)).await.unwrap_err();
    assert_eq!(err, AdmissionError::DuplicatePurchase);
}

#[tokio::test]
async fn window_bounds_reject_early_and_late_buyers() {
    let h = harness();
    h.open_item(5, 5).await;

    h.clock
        .set(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).single().unwrap());
    assert_eq!(
        h.engine.seckill(ITEM, UserId(1)).await.unwrap_err(),
        AdmissionError::NotStarted
    );

    h.clock
        .set(Utc.with_ymd_and_hms(2025, 6, 1, 13, 0, 0).single().unwrap());
    assert_eq!(
        h.engine.seckill(ITEM, UserId(1)).await.unwrap_err(),
        AdmissionError::Ended
    );
}

#[tokio::test]
async fn enqueue_failure_does_not_revoke_the_admission() {
    let h = harness();
    h.open_item(5, 5).await;

    h.intents.set_failing(true);
    let order_id = h.engine.seckill(ITEM, UserId(1)).await.unwrap();
    assert!(order_id.0 >= 5000);
    assert!(h.intents.published().is_empty());
    // The reservation went through even though the intent never did.
    assert_eq!(h.inventory.remaining_stock(ITEM).await.unwrap(), Some(4));
}

#[tokio::test]
async fn redelivered_intent_persists_exactly_once() {
    let h = harness();
    h.open_item(3, 3).await;
    let intent = h.admit(UserId(42)).await;

    h.handler.handle(intent.clone()).await.unwrap();
    h.handler.handle(intent.clone()).await.unwrap();
    h.handler.handle(intent).await.unwrap();

    assert_eq!(h.orders.order_count(), 1);
    assert_eq!(h.orders.durable_stock(ITEM), 2);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_hops_to_the_retry_channel() {
    let h = harness();
    h.open_item(3, 3).await;
    let intent = h.admit(UserId(42)).await;

    h.orders
        .fail_next_with(OrderStoreError::Database("connection reset".into()));
    h.handler.handle(intent.clone()).await.unwrap();

    let hops = h.retry_out.published();
    assert_eq!(hops.len(), 1);
    assert_eq!(hops[0].retry_count, 1);
    assert_eq!(
        hops[0].next_retry_at,
        Some(sale_open() + ChronoDuration::seconds(1))
    );
    assert_eq!(hops[0].last_error.as_deref(), Some("database error: connection reset"));
    assert_eq!(h.orders.order_count(), 0);
    assert!(h.dead_letter_out.published().is_empty());

    // The scheduled attempt succeeds and persists the order.
    h.handler.handle(hops[0].clone()).await.unwrap();
    assert!(h.orders.contains(intent.order_id));
}

#[tokio::test(start_paused = true)]
async fn retry_budget_is_three_then_dead_letter_with_compensation() {
    let h = harness();
    h.open_item(1, 1).await;
    let intent = h.admit(UserId(42)).await;

    // Initial attempt plus all three retries fail.
    for _ in 0..4 {
        h.orders
            .fail_next_with(OrderStoreError::Database("db down".into()));
    }

    h.handler.handle(intent.clone()).await.unwrap();
    for _ in 0..3 {
        let hop = h.retry_out.published().last().cloned().unwrap();
        h.handler.handle(hop).await.unwrap();
    }

    let hops = h.retry_out.published();
    assert_eq!(hops.len(), 3, "exactly three retry hops");
    assert_eq!(
        hops.iter().map(|i| i.retry_count).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );

    // Backoff is non-decreasing: 1s, 2s, 4s after each failed attempt.
    let delays: Vec<_> = hops
        .iter()
        .map(|i| i.next_retry_at.unwrap())
        .collect();
    assert!(delays.windows(2).all(|w| w[1] > w[0]));

    let dead = h.dead_letter_out.published();
    assert_eq!(dead.len(), 1, "exactly one dead-letter entry");
    assert_eq!(dead[0].retry_count, 3);
    assert!(dead[0].last_error.is_some());

    // Compensation returned the slot and cleared the purchase record.
    assert_eq!(h.inventory.remaining_stock(ITEM).await.unwrap(), Some(1));
    assert!(h.inventory.admitted_users(ITEM).is_empty());
    assert_eq!(h.orders.order_count(), 0);

    // The freed slot is buyable again by someone else.
    assert!(h.engine.seckill(ITEM, UserId(43)).await.is_ok());
}

#[tokio::test]
async fn durable_stock_drift_is_terminal_without_retries() {
    let h = harness();
    // Fast path says one slot, durable layer disagrees.
    h.open_item(1, 0).await;
    let intent = h.admit(UserId(42)).await;

    h.handler.handle(intent).await.unwrap();

    assert!(h.retry_out.published().is_empty(), "no retry for drift");
    assert_eq!(h.dead_letter_out.published().len(), 1);
    // The reservation was compensated straight away.
    assert_eq!(h.inventory.remaining_stock(ITEM).await.unwrap(), Some(1));
}

#[tokio::test]
async fn compensation_survives_redelivery_without_over_crediting() {
    let h = harness();
    h.open_item(1, 0).await;
    let intent = h.admit(UserId(42)).await;

    h.handler.handle(intent.clone()).await.unwrap();
    assert_eq!(h.inventory.remaining_stock(ITEM).await.unwrap(), Some(1));

    // Redelivered terminal failure: release is a no-op the second time.
    h.handler.handle(intent).await.unwrap();
    assert_eq!(h.inventory.remaining_stock(ITEM).await.unwrap(), Some(1));
}

#[tokio::test]
async fn failed_retry_hop_publish_withholds_the_commit() {
    let h = harness();
    h.open_item(3, 3).await;
    let intent = h.admit(UserId(42)).await;

    h.orders
        .fail_next_with(OrderStoreError::Database("db down".into()));
    h.retry_out.set_failing(true);

    let result = h.handler.handle(intent).await;
    assert!(matches!(result, Err(FulfillmentError::Channel(_))));
}

#[tokio::test]
async fn failed_dead_letter_publish_withholds_the_commit() {
    let h = harness();
    h.open_item(3, 0).await;
    let intent = h.admit(UserId(42)).await;

    h.dead_letter_out.set_failing(true);
    let result = h.handler.handle(intent).await;
    assert!(matches!(result, Err(FulfillmentError::Channel(_))));
}

#[tokio::test]
async fn dead_letter_consumer_alerts_and_never_fails() {
    let sink = Arc::new(RecordingAlertSink::default());
    let handler = DeadLetterHandler::new(Arc::clone(&sink) as _);

    let intent = OrderIntent::new(OrderId(901), UserId(3), ITEM, sale_open())
        .for_retry("db down", sale_open())
        .for_dead_letter("db stayed down");

    handler.handle(intent.clone()).await.unwrap();
    let alerts = sink.alerts();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].0.contains("901"));
    assert!(alerts[0].1.contains("db stayed down"));

    // Alert delivery failures are swallowed, never propagated.
    sink.set_failing(true);
    handler.handle(intent).await.unwrap();
}
