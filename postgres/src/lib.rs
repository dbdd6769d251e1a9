//! # Seckill Postgres
//!
//! Durable order persistence: the
//! [`OrderStore`](seckill_core::orders::OrderStore) implementation that
//! makes an admitted intent permanent.
//!
//! # Transaction shape
//!
//! Each intent is persisted in one transaction:
//!
//! 1. `INSERT` the order row keyed by `order_id`. A primary-key collision
//!    means the intent was delivered before — the transaction is abandoned
//!    and the call reports [`OrderOutcome::Duplicate`], which callers treat
//!    as success. The primary key IS the dedup mechanism for at-least-once
//!    delivery.
//! 2. `UPDATE seckill_stock SET stock = stock - 1 WHERE item_id = $1 AND
//!    stock > 0`. Zero rows affected rolls the insert back and surfaces
//!    [`OrderStoreError::StockExhausted`]: the durable counter disagrees
//!    with the fast-path reservation, which is an invariant violation to
//!    alert on, not to retry.
//!
//! The conditional update is the only concurrency guard the durable layer
//! needs: concurrent workers on the same item serialize on the row lock,
//! and the `stock > 0` predicate refuses the decrement that would go
//! negative.

use async_trait::async_trait;
use seckill_core::intent::OrderIntent;
use seckill_core::orders::{OrderOutcome, OrderStore, OrderStoreError};
use seckill_core::types::ItemId;
use sqlx::PgPool;

/// Create the pipeline's two tables if they do not exist.
///
/// # Errors
///
/// Returns [`OrderStoreError::Database`] when DDL execution fails.
pub async fn run_migrations(pool: &PgPool) -> Result<(), OrderStoreError> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS seckill_orders (
            id BIGINT PRIMARY KEY,
            user_id BIGINT NOT NULL,
            item_id BIGINT NOT NULL,
            pay_type SMALLINT NOT NULL DEFAULT 1,
            status SMALLINT NOT NULL DEFAULT 1,
            create_time TIMESTAMPTZ NOT NULL DEFAULT now(),
            update_time TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        ",
    )
    .execute(pool)
    .await
    .map_err(|e| OrderStoreError::Database(e.to_string()))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_seckill_orders_item ON seckill_orders(item_id)")
        .execute(pool)
        .await
        .map_err(|e| OrderStoreError::Database(e.to_string()))?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS seckill_stock (
            item_id BIGINT PRIMARY KEY,
            stock INTEGER NOT NULL CHECK (stock >= 0),
            update_time TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        ",
    )
    .execute(pool)
    .await
    .map_err(|e| OrderStoreError::Database(e.to_string()))?;

    tracing::info!("Seckill schema ready");
    Ok(())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation),
        _ => false,
    }
}

/// `PostgreSQL`-backed order store.
///
/// # Example
///
/// ```no_run
/// use seckill_postgres::{run_migrations, PgOrderStore};
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// run_migrations(&pool).await?;
/// let store = PgOrderStore::new(pool);
/// # Ok(())
/// # }
/// ```
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Cheap liveness probe.
    ///
    /// # Errors
    ///
    /// Returns [`OrderStoreError::Database`] when the server does not answer.
    pub async fn ping(&self) -> Result<(), OrderStoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| OrderStoreError::Database(e.to_string()))?;
        Ok(())
    }

    /// Durable stock snapshot, `None` for an unseeded item.
    ///
    /// # Errors
    ///
    /// Returns [`OrderStoreError::Database`] when the query fails.
    pub async fn durable_stock(&self, item: ItemId) -> Result<Option<i32>, OrderStoreError> {
        let row: Option<(i32,)> =
            sqlx::query_as("SELECT stock FROM seckill_stock WHERE item_id = $1")
                .bind(item.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| OrderStoreError::Database(e.to_string()))?;
        Ok(row.map(|(stock,)| stock))
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create_order(&self, intent: &OrderIntent) -> Result<OrderOutcome, OrderStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OrderStoreError::Database(e.to_string()))?;

        let inserted = sqlx::query(
            r"
            INSERT INTO seckill_orders (id, user_id, item_id, create_time, update_time)
            VALUES ($1, $2, $3, $4, $4)
            ",
        )
        .bind(intent.order_id.0)
        .bind(intent.user_id.0)
        .bind(intent.item_id.0)
        .bind(intent.created_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                // Redelivered intent: the first delivery already wrote the
                // row and took the stock. Nothing to do.
                metrics::counter!("seckill.orders.duplicates").increment(1);
                tracing::debug!(
                    order_id = %intent.order_id,
                    "Order already persisted, treating redelivery as success"
                );
                let _ = tx.rollback().await;
                return Ok(OrderOutcome::Duplicate);
            }
            return Err(OrderStoreError::Database(e.to_string()));
        }

        let affected = sqlx::query(
            r"
            UPDATE seckill_stock
            SET stock = stock - 1, update_time = now()
            WHERE item_id = $1 AND stock > 0
            ",
        )
        .bind(intent.item_id.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| OrderStoreError::Database(e.to_string()))?;

        if affected.rows_affected() == 0 {
            let _ = tx.rollback().await;
            metrics::counter!("seckill.orders.stock_exhausted").increment(1);
            tracing::error!(
                order_id = %intent.order_id,
                item_id = %intent.item_id,
                "Durable stock exhausted despite fast-path reservation"
            );
            return Err(OrderStoreError::StockExhausted(intent.item_id));
        }

        tx.commit()
            .await
            .map_err(|e| OrderStoreError::Database(e.to_string()))?;

        metrics::counter!("seckill.orders.created").increment(1);
        tracing::info!(
            order_id = %intent.order_id,
            user_id = %intent.user_id,
            item_id = %intent.item_id,
            "Order persisted"
        );
        Ok(OrderOutcome::Created)
    }

    async fn seed_stock(&self, item: ItemId, stock: u32) -> Result<(), OrderStoreError> {
        sqlx::query(
            r"
            INSERT INTO seckill_stock (item_id, stock, update_time)
            VALUES ($1, $2, now())
            ON CONFLICT (item_id)
            DO UPDATE SET stock = EXCLUDED.stock, update_time = now()
            ",
        )
        .bind(item.0)
        .bind(i64::from(stock))
        .execute(&self.pool)
        .await
        .map_err(|e| OrderStoreError::Database(e.to_string()))?;

        tracing::info!(item_id = %item, stock, "Durable stock seeded");
        Ok(())
    }
}
