//! Dead-letter channel consumer.

use async_trait::async_trait;
use seckill_core::alert::AlertSink;
use seckill_core::channel::{FulfillmentError, IntentHandler};
use seckill_core::intent::OrderIntent;
use std::sync::Arc;

/// Handler for intents that exhausted their retries or failed terminally.
///
/// Emits an operator-facing notification for manual remediation and
/// nothing else — no retries, and alert failures are logged and swallowed
/// so the dead-letter channel can never wedge the pipeline.
pub struct DeadLetterHandler {
    alerts: Arc<dyn AlertSink>,
}

impl DeadLetterHandler {
    /// Create a handler delivering through the given sink.
    #[must_use]
    pub fn new(alerts: Arc<dyn AlertSink>) -> Self {
        Self { alerts }
    }

    fn render(intent: &OrderIntent) -> (String, String) {
        let subject = format!("[seckill] order {} dead-lettered", intent.order_id);
        let body = format!(
            "A flash-sale order could not be fulfilled and was abandoned.\n\
             \n\
             order id:    {}\n\
             user id:     {}\n\
             item id:     {}\n\
             created at:  {}\n\
             retries:     {}\n\
             last error:  {}\n\
             \n\
             The fast-path reservation has been compensated; the durable\n\
             order row does not exist. Manual remediation may be required.",
            intent.order_id,
            intent.user_id,
            intent.item_id,
            intent.created_at.to_rfc3339(),
            intent.retry_count,
            intent.last_error.as_deref().unwrap_or("unknown"),
        );
        (subject, body)
    }
}

#[async_trait]
impl IntentHandler for DeadLetterHandler {
    async fn handle(&self, intent: OrderIntent) -> Result<(), FulfillmentError> {
        metrics::counter!("seckill.pipeline.total", "phase" => "alerted").increment(1);
        tracing::error!(
            order_id = %intent.order_id,
            user_id = %intent.user_id,
            item_id = %intent.item_id,
            retry_count = intent.retry_count,
            last_error = intent.last_error.as_deref().unwrap_or("unknown"),
            "Dead-lettered intent received"
        );

        let (subject, body) = Self::render(&intent);
        if let Err(e) = self.alerts.notify(&subject, &body).await {
            // Best-effort only: the tracing line above already carries the
            // full context for operators tailing logs.
            tracing::warn!(
                order_id = %intent.order_id,
                error = %e,
                "Alert delivery failed, continuing"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use seckill_core::types::{ItemId, OrderId, UserId};

    #[test]
    fn rendered_alert_names_the_order() {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).single().unwrap();
        let intent = OrderIntent::new(OrderId(99), UserId(3), ItemId(7), at)
            .for_retry("db down", at)
            .for_dead_letter("db still down");

        let (subject, body) = DeadLetterHandler::render(&intent);
        assert!(subject.contains("99"));
        assert!(body.contains("db still down"));
        assert!(body.contains("retries:     1"));
    }
}
