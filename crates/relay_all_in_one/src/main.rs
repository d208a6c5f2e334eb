mod config;
mod context;

use crate::config::ServiceConfig;
use crate::context::RelayContext;
use common::domain::RecordSink;
use common::kafka::KafkaRecordSink;
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryProviders};
use ingest_worker::ingest_worker::IngestWorker;
use relay_runner::Runner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Upper bound for flushing buffered Kafka records on shutdown
const PRODUCER_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {:#}", e);
        std::process::exit(1);
    }

    let telemetry_providers: Option<TelemetryProviders> =
        match init_telemetry(&config.telemetry_config()) {
            Ok(providers) => providers,
            Err(e) => {
                eprintln!("Failed to initialize telemetry: {}", e);
                std::process::exit(1);
            }
        };

    info!(
        otel_enabled = config.otel_enabled,
        base_topic = %config.base_topic_name,
        stream = %config.nats_notifications_stream,
        "Starting relay-all-in-one service"
    );
    debug!("Configuration: {:?}", config);

    let context = match RelayContext::initialize(&config).await {
        Ok(context) => context,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Failed to initialize relay context");
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let ingest_worker = match IngestWorker::new(
        Arc::clone(&context.nats_client),
        context.object_store.clone(),
        context.record_sink.clone(),
        config.ingest_worker_config(),
    )
    .await
    {
        Ok(worker) => worker,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Failed to initialize ingest worker");
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let runner = Runner::new()
        .with_boxed_app_process("ingest_worker", ingest_worker.into_runner_process())
        .with_closer("kafka_producer", {
            let sink = Arc::clone(&context.record_sink);
            move || flush_producer(sink)
        })
        .with_closer("nats", {
            let nats_client = Arc::clone(&context.nats_client);
            move || async move { nats_client.close().await }
        })
        .with_closer_timeout(Duration::from_secs(10));

    let result = runner.run().await;

    // After the closers so their logs are still exported
    shutdown_telemetry(telemetry_providers);

    match result {
        Ok(()) => info!("Application exiting normally"),
        Err(e) => {
            eprintln!("Application exiting with error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// librdkafka's flush blocks, so it runs off the async workers
async fn flush_producer(sink: Arc<KafkaRecordSink>) -> anyhow::Result<()> {
    info!("Flushing Kafka producer");
    tokio::task::spawn_blocking(move || sink.flush(PRODUCER_FLUSH_TIMEOUT)).await??;
    Ok(())
}
