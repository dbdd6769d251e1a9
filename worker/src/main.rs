//! Fulfillment daemon: wires the pipeline's backends together and runs the
//! three channel consumers until terminated.

use anyhow::Context;
use seckill_core::alert::AlertSink;
use seckill_core::channel::IntentHandler;
use seckill_core::environment::SystemClock;
use seckill_core::inventory::InventoryStore;
use seckill_kafka::{IntentConsumer, KafkaIntentProducer};
use seckill_postgres::{PgOrderStore, run_migrations};
use seckill_redis::RedisInventoryStore;
use seckill_worker::{
    Config, DeadLetterHandler, FulfillmentHandler, Pipeline, RetryPolicy, SmtpAlertSink,
    TracingAlertSink,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.runtime.log_level)),
        )
        .init();

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.runtime.metrics_port))
        .install()
        .context("failed to install Prometheus exporter")?;
    info!(port = config.runtime.metrics_port, "Metrics exporter listening");

    // Inventory store (compensation path).
    let inventory = RedisInventoryStore::connect(&config.redis.url)
        .await
        .context("failed to connect to Redis")?;
    inventory.ping().await.context("Redis ping failed")?;
    info!(url = %config.redis.url, "Connected to Redis");

    // Durable order store.
    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .connect(&config.postgres.url)
        .await
        .context("failed to connect to Postgres")?;
    run_migrations(&pool).await.context("migrations failed")?;
    let orders = PgOrderStore::new(pool);
    orders.ping().await.context("Postgres ping failed")?;
    info!("Connected to Postgres");

    // One producer per outbound channel.
    let retry_out = KafkaIntentProducer::builder()
        .brokers(&config.kafka.brokers)
        .topic(&config.kafka.retry_topic)
        .acks(&config.kafka.acks)
        .build()
        .context("failed to create retry producer")?;
    let dead_letter_out = KafkaIntentProducer::builder()
        .brokers(&config.kafka.brokers)
        .topic(&config.kafka.dlq_topic)
        .acks(&config.kafka.acks)
        .build()
        .context("failed to create dead-letter producer")?;

    let alerts: Arc<dyn AlertSink> = if config.alert.smtp_host.is_empty() {
        info!("No SMTP relay configured, alerts go to the log");
        Arc::new(TracingAlertSink)
    } else {
        info!(host = %config.alert.smtp_host, "SMTP alerting enabled");
        Arc::new(SmtpAlertSink::new(&config.alert).context("invalid SMTP configuration")?)
    };

    let (shutdown_tx, _) = broadcast::channel(1);

    let fulfillment: Arc<dyn IntentHandler> = Arc::new(FulfillmentHandler::new(
        Arc::new(orders),
        Arc::new(inventory) as Arc<dyn InventoryStore>,
        Arc::new(retry_out),
        Arc::new(dead_letter_out),
        RetryPolicy::default(),
        Arc::new(SystemClock),
        shutdown_tx.clone(),
    ));
    let dead_letter: Arc<dyn IntentHandler> = Arc::new(DeadLetterHandler::new(alerts));

    // The fulfillment handler serves both the intent and the retry channel;
    // the channels only differ in topic and consumer group.
    let consumers = vec![
        IntentConsumer::new(
            "fulfillment",
            &config.kafka.brokers,
            &config.kafka.topic,
            &config.kafka.group_id,
            Arc::clone(&fulfillment),
            shutdown_tx.subscribe(),
        ),
        IntentConsumer::new(
            "retry",
            &config.kafka.brokers,
            &config.kafka.retry_topic,
            config.kafka.retry_group(),
            fulfillment,
            shutdown_tx.subscribe(),
        ),
        IntentConsumer::new(
            "dead-letter",
            &config.kafka.brokers,
            &config.kafka.dlq_topic,
            config.kafka.dlq_group(),
            dead_letter,
            shutdown_tx.subscribe(),
        ),
    ];

    Pipeline::new(
        consumers,
        shutdown_tx,
        Duration::from_secs(config.runtime.shutdown_timeout),
    )
    .run()
    .await;

    Ok(())
}
