//! Pipeline lifecycle and graceful shutdown.
//!
//! The pipeline owns one consumer per channel (fulfillment, retry,
//! dead-letter), all coordinated by a single broadcast shutdown signal:
//!
//! 1. **Startup**: spawn each consumer as a background task
//! 2. **Runtime**: consumers poll independently, never blocking each other
//! 3. **Shutdown**: SIGINT/SIGTERM broadcasts the signal; each task gets a
//!    bounded window to finish its current delivery before being abandoned

use seckill_kafka::IntentConsumer;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Running fulfillment pipeline.
pub struct Pipeline {
    consumers: Vec<IntentConsumer>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_timeout: Duration,
}

impl Pipeline {
    /// Assemble a pipeline from pre-built consumers.
    ///
    /// `shutdown_tx` must be the same sender the consumers (and the
    /// fulfillment handler's retry waits) subscribe to.
    #[must_use]
    pub fn new(
        consumers: Vec<IntentConsumer>,
        shutdown_tx: broadcast::Sender<()>,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            consumers,
            shutdown_tx,
            shutdown_timeout,
        }
    }

    /// Run until a termination signal arrives, then shut down gracefully.
    pub async fn run(self) {
        info!(consumer_count = self.consumers.len(), "Starting pipeline consumers");
        let handles: Vec<_> = self
            .consumers
            .into_iter()
            .map(IntentConsumer::spawn)
            .collect();

        shutdown_signal().await;
        info!("Termination signal received, shutting down pipeline");

        let _ = self.shutdown_tx.send(());

        for (idx, handle) in handles.into_iter().enumerate() {
            match tokio::time::timeout(self.shutdown_timeout, handle).await {
                Ok(Ok(())) => info!(consumer = idx, "Consumer stopped gracefully"),
                Ok(Err(e)) => warn!(consumer = idx, error = %e, "Consumer task failed"),
                Err(_) => warn!(consumer = idx, "Consumer shutdown timed out"),
            }
        }

        info!("Pipeline shutdown complete");
    }
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }
}
