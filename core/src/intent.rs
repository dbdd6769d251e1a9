//! The order intent message carried across the async boundary.

use crate::types::{ItemId, OrderId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An accepted-but-not-yet-durably-persisted order.
///
/// Created by the admission engine immediately after a successful atomic
/// reservation and carried through the intent, retry, and dead-letter
/// channels. The identity fields are immutable; only the retry bookkeeping
/// changes, and only when the intent hops onto the retry channel.
///
/// The JSON field names (`orderId`, `userId`, `itemId`, ...) are the wire
/// format consumed by every channel; do not rename them casually.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderIntent {
    /// Globally unique order ID — also the dedup key for at-least-once delivery.
    pub order_id: OrderId,
    /// The admitted user.
    pub user_id: UserId,
    /// The item the reservation was taken against.
    pub item_id: ItemId,
    /// When the admission decision was made.
    pub created_at: DateTime<Utc>,
    /// How many fulfillment attempts have already failed.
    #[serde(default)]
    pub retry_count: u32,
    /// Earliest instant the next attempt may run (set on retry hops).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Message of the most recent failure (set on retry and DLQ hops).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl OrderIntent {
    /// Build a fresh intent straight out of a successful reservation.
    #[must_use]
    pub const fn new(
        order_id: OrderId,
        user_id: UserId,
        item_id: ItemId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id,
            user_id,
            item_id,
            created_at,
            retry_count: 0,
            next_retry_at: None,
            last_error: None,
        }
    }

    /// The intent as it should appear on the retry channel: retry count
    /// bumped, failure recorded, next attempt scheduled.
    #[must_use]
    pub fn for_retry(&self, error: impl Into<String>, next_retry_at: DateTime<Utc>) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            next_retry_at: Some(next_retry_at),
            last_error: Some(error.into()),
            ..self.clone()
        }
    }

    /// The intent as it should appear on the dead-letter channel.
    ///
    /// Retry bookkeeping is frozen; only the terminal error is recorded.
    #[must_use]
    pub fn for_dead_letter(&self, error: impl Into<String>) -> Self {
        Self {
            next_retry_at: None,
            last_error: Some(error.into()),
            ..self.clone()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn intent() -> OrderIntent {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).single().unwrap();
        OrderIntent::new(OrderId(77), UserId(5), ItemId(12), at)
    }

    #[test]
    fn wire_format_uses_camel_case_keys() {
        let json = serde_json::to_value(intent()).unwrap();
        assert_eq!(json["orderId"], 77);
        assert_eq!(json["userId"], 5);
        assert_eq!(json["itemId"], 12);
        assert!(json.get("nextRetryAt").is_none());
    }

    #[test]
    fn retry_fields_default_when_absent_on_the_wire() {
        let parsed: OrderIntent = serde_json::from_str(
            r#"{"orderId":1,"userId":2,"itemId":3,"createdAt":"2025-06-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(parsed.retry_count, 0);
        assert!(parsed.next_retry_at.is_none());
        assert!(parsed.last_error.is_none());
    }

    #[test]
    fn for_retry_bumps_count_and_records_error() {
        let due = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 2).single().unwrap();
        let hop = intent().for_retry("db timeout", due);
        assert_eq!(hop.retry_count, 1);
        assert_eq!(hop.next_retry_at, Some(due));
        assert_eq!(hop.last_error.as_deref(), Some("db timeout"));
        // Identity is untouched.
        assert_eq!(hop.order_id, OrderId(77));

        let second = hop.for_retry("still down", due);
        assert_eq!(second.retry_count, 2);
    }

    #[test]
    fn for_dead_letter_clears_schedule() {
        let due = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 2).single().unwrap();
        let dead = intent().for_retry("x", due).for_dead_letter("gave up");
        assert_eq!(dead.retry_count, 1);
        assert!(dead.next_retry_at.is_none());
        assert_eq!(dead.last_error.as_deref(), Some("gave up"));
    }
}
