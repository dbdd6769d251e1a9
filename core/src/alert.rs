//! Operator alerting seam.

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by an alert sink.
#[derive(Error, Debug, Clone)]
pub enum AlertError {
    /// The notification could not be delivered.
    #[error("alert delivery failed: {0}")]
    Delivery(String),
}

/// Delivers a subject + body notification to an operator.
///
/// Alerting is best-effort everywhere it is used: callers log a failed
/// delivery and move on, never letting it block the pipeline.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Send one notification.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::Delivery`] when the sink could not deliver.
    async fn notify(&self, subject: &str, body: &str) -> Result<(), AlertError>;
}
