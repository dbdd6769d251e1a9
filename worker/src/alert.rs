//! Operator alert sinks.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use seckill_core::alert::{AlertError, AlertSink};

use crate::config::AlertConfig;

/// SMTP-backed alert sink.
///
/// Dead-lettered intents end in a human mailbox; everything about delivery
/// stays best-effort — the dead-letter consumer logs a failed send and
/// moves on.
pub struct SmtpAlertSink {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpAlertSink {
    /// Build a sink from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::Delivery`] when the relay host or mailbox
    /// addresses are invalid.
    pub fn new(config: &AlertConfig) -> Result<Self, AlertError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| AlertError::Delivery(format!("invalid smtp relay: {e}")))?
            .port(config.smtp_port);
        if !config.smtp_user.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_user.clone(),
                config.smtp_pass.clone(),
            ));
        }

        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| AlertError::Delivery(format!("invalid from address: {e}")))?;
        let to = config
            .to
            .parse::<Mailbox>()
            .map_err(|e| AlertError::Delivery(format!("invalid to address: {e}")))?;

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }
}

#[async_trait]
impl AlertSink for SmtpAlertSink {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), AlertError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| AlertError::Delivery(format!("message build failed: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AlertError::Delivery(format!("smtp send failed: {e}")))?;

        tracing::info!(subject, "Operator alert delivered");
        Ok(())
    }
}

/// Development sink that logs alerts instead of delivering them.
///
/// Used whenever no SMTP relay is configured, so the dead-letter consumer
/// still surfaces every terminal failure somewhere visible.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), AlertError> {
        tracing::warn!(subject, body, "Operator alert (no SMTP relay configured)");
        Ok(())
    }
}
