//! Redis-backed inventory store.
//!
//! Stock counters and purchase-record sets live in Redis under
//! `seckill:stock:{item}` and `seckill:orders:{item}`. Both compound
//! operations — admission and release — execute as server-side Lua scripts,
//! so concurrent callers serialize inside Redis and the caller never
//! read-then-writes across two round trips.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use seckill_core::inventory::{InventoryError, InventoryStore, Released, Reservation};
use seckill_core::types::{ItemId, UserId};

const ADMISSION_SCRIPT: &str = include_str!("admission.lua");
const RELEASE_SCRIPT: &str = include_str!("release.lua");

/// Return codes of the admission script.
pub(crate) fn reservation_from_code(code: i64) -> Result<Reservation, InventoryError> {
    match code {
        0 => Ok(Reservation::Admitted),
        1 => Ok(Reservation::OutOfStock),
        2 => Ok(Reservation::AlreadyPurchased),
        other => Err(InventoryError::Backend(format!(
            "unexpected admission script result: {other}"
        ))),
    }
}

/// [`InventoryStore`] implementation on Redis.
///
/// Clones of [`ConnectionManager`] share one multiplexed connection with
/// automatic reconnection, so the store itself is cheap to clone and share.
///
/// # Example
///
/// ```no_run
/// use seckill_redis::RedisInventoryStore;
/// use seckill_core::inventory::InventoryStore;
/// use seckill_core::types::{ItemId, UserId};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = RedisInventoryStore::connect("redis://localhost:6379").await?;
/// store.seed_item(ItemId(7), 100).await?;
/// let decision = store.try_reserve(ItemId(7), UserId(42)).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisInventoryStore {
    conn: ConnectionManager,
    admission: Script,
    release: Script,
}

impl RedisInventoryStore {
    /// Wrap an existing connection manager.
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            admission: Script::new(ADMISSION_SCRIPT),
            release: Script::new(RELEASE_SCRIPT),
        }
    }

    /// Connect to Redis and build a store.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Backend`] when the URL is invalid or the
    /// server is unreachable.
    pub async fn connect(url: &str) -> Result<Self, InventoryError> {
        let client = redis::Client::open(url)
            .map_err(|e| InventoryError::Backend(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| InventoryError::Backend(format!("redis connect failed: {e}")))?;
        Ok(Self::new(conn))
    }

    /// Cheap liveness probe.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Backend`] when the server does not answer.
    pub async fn ping(&self) -> Result<(), InventoryError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| InventoryError::Backend(format!("redis ping failed: {e}")))
    }

    fn stock_key(item: ItemId) -> String {
        format!("seckill:stock:{item}")
    }

    fn orders_key(item: ItemId) -> String {
        format!("seckill:orders:{item}")
    }
}

#[async_trait]
impl InventoryStore for RedisInventoryStore {
    async fn try_reserve(
        &self,
        item: ItemId,
        user: UserId,
    ) -> Result<Reservation, InventoryError> {
        let mut conn = self.conn.clone();
        let code: i64 = self
            .admission
            .key(Self::stock_key(item))
            .key(Self::orders_key(item))
            .arg(user.0)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| InventoryError::Backend(format!("admission script failed: {e}")))?;

        let decision = reservation_from_code(code)?;
        tracing::trace!(item_id = %item, user_id = %user, ?decision, "Atomic admission evaluated");
        Ok(decision)
    }

    async fn release(&self, item: ItemId, user: UserId) -> Result<Released, InventoryError> {
        let mut conn = self.conn.clone();
        let code: i64 = self
            .release
            .key(Self::stock_key(item))
            .key(Self::orders_key(item))
            .arg(user.0)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| InventoryError::Backend(format!("release script failed: {e}")))?;

        if code == 1 {
            tracing::info!(item_id = %item, user_id = %user, "Reservation released back to pool");
            Ok(Released::Released)
        } else {
            tracing::debug!(item_id = %item, user_id = %user, "No reservation to release");
            Ok(Released::NotReserved)
        }
    }

    async fn seed_item(&self, item: ItemId, stock: u32) -> Result<(), InventoryError> {
        let mut conn = self.conn.clone();
        // MULTI/EXEC so a half-applied warm-up is never observable.
        redis::pipe()
            .atomic()
            .set(Self::stock_key(item), stock)
            .del(Self::orders_key(item))
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| InventoryError::Backend(format!("seed failed: {e}")))?;

        tracing::info!(item_id = %item, stock, "Inventory warmed");
        Ok(())
    }

    async fn remaining_stock(&self, item: ItemId) -> Result<Option<i64>, InventoryError> {
        let mut conn = self.conn.clone();
        conn.get(Self::stock_key(item))
            .await
            .map_err(|e| InventoryError::Backend(format!("stock read failed: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn script_codes_map_to_decisions() {
        assert_eq!(reservation_from_code(0).unwrap(), Reservation::Admitted);
        assert_eq!(reservation_from_code(1).unwrap(), Reservation::OutOfStock);
        assert_eq!(
            reservation_from_code(2).unwrap(),
            Reservation::AlreadyPurchased
        );
        assert!(reservation_from_code(3).is_err());
    }

    #[test]
    fn key_layout_matches_the_warmed_namespace() {
        assert_eq!(
            RedisInventoryStore::stock_key(ItemId(12)),
            "seckill:stock:12"
        );
        assert_eq!(
            RedisInventoryStore::orders_key(ItemId(12)),
            "seckill:orders:12"
        );
    }
}
