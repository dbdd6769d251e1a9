//! Redis-backed order ID worker.

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use seckill_core::id::{IdError, IdGenerator};

/// Seconds of 2022-01-01T00:00:00Z, the generator's epoch.
const BEGIN_TIMESTAMP: i64 = 1_640_995_200;

/// Low bits reserved for the per-period sequence.
const COUNT_BITS: u32 = 32;

/// Compose the final ID from its two segments.
pub(crate) const fn compose_id(elapsed_seconds: i64, sequence: i64) -> i64 {
    (elapsed_seconds << COUNT_BITS) | sequence
}

/// ID generator backed by a shared Redis sequence.
///
/// Layout: `[ seconds since 2022-01-01 | 32-bit daily sequence ]`. The
/// sequence comes from `INCR icr:{category}:{yyyymmdd}` — one atomic
/// increment shared by every process instance, so two calls can never mint
/// the same ID. The per-day key keeps any single counter from growing
/// without bound.
#[derive(Clone)]
pub struct RedisIdWorker {
    conn: ConnectionManager,
}

impl RedisIdWorker {
    /// Wrap an existing connection manager.
    #[must_use]
    pub const fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl IdGenerator for RedisIdWorker {
    async fn next_id(&self, category: &str) -> Result<i64, IdError> {
        let now = Utc::now();
        let elapsed = now.timestamp() - BEGIN_TIMESTAMP;
        let key = format!("icr:{category}:{}", now.format("%Y%m%d"));

        let mut conn = self.conn.clone();
        let sequence: i64 = conn
            .incr(&key, 1)
            .await
            .map_err(|e| IdError::Backend(format!("sequence increment failed: {e}")))?;

        Ok(compose_id(elapsed, sequence))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn timestamp_occupies_the_high_bits() {
        let id = compose_id(5, 3);
        assert_eq!(id >> COUNT_BITS, 5);
        assert_eq!(id & 0xFFFF_FFFF, 3);
    }

    #[test]
    fn ids_order_by_time_segment() {
        // A later second always wins over any earlier sequence value.
        assert!(compose_id(10, 1) > compose_id(9, 0xFFFF_FFFF));
    }
}
