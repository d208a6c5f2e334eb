use anyhow::{bail, Result};
use common::kafka::KafkaProducerConfig;
use common::nats::ConsumerSettings;
use common::secrets::RetryPolicy;
use common::telemetry::TelemetryConfig;
use config::{Config, ConfigError, Environment};
use ingest_worker::domain::{IngestionServiceConfig, RoutingFailurePolicy};
use ingest_worker::ingest_worker::IngestWorkerConfig;
use serde::Deserialize;
use std::time::Duration;

/// Time an ack deadline must leave for S3 reads on top of the drain timeout
const FETCH_BUDGET_SECS: u64 = 30;

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // OpenTelemetry configuration
    #[serde(default)]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,

    // NATS configuration
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// JetStream stream carrying storage notifications
    #[serde(default = "default_nats_notifications_stream")]
    pub nats_notifications_stream: String,

    /// Subject filter for the notification consumer; defaults to `{stream}.>`
    #[serde(default)]
    pub nats_notifications_subject: Option<String>,

    /// Durable consumer name
    #[serde(default = "default_nats_consumer_name")]
    pub nats_consumer_name: String,

    /// Batch size for consumer
    #[serde(default = "default_nats_batch_size")]
    pub nats_batch_size: usize,

    /// Max wait time for batches in seconds
    #[serde(default = "default_nats_batch_wait_secs")]
    pub nats_batch_wait_secs: u64,

    /// Deliveries before JetStream gives up on a message (-1 for unlimited)
    #[serde(default = "default_nats_max_deliver")]
    pub nats_max_deliver: i64,

    /// Seconds a delivered notification may stay unsettled before redelivery
    #[serde(default = "default_nats_ack_wait_secs")]
    pub nats_ack_wait_secs: u64,

    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // AWS configuration
    /// Overrides the region from the default provider chain
    #[serde(default)]
    pub aws_region: Option<String>,

    // Kafka configuration
    #[serde(default = "default_kafka_bootstrap_servers")]
    pub kafka_bootstrap_servers: String,

    /// PLAINTEXT, SSL, SASL_PLAINTEXT or SASL_SSL
    #[serde(default = "default_kafka_security_protocol")]
    pub kafka_security_protocol: String,

    /// e.g. SCRAM-SHA-512
    #[serde(default)]
    pub kafka_sasl_mechanism: Option<String>,

    #[serde(default = "default_kafka_compression")]
    pub kafka_compression: String,

    #[serde(default = "default_kafka_message_timeout_ms")]
    pub kafka_message_timeout_ms: u64,

    #[serde(default = "default_kafka_linger_ms")]
    pub kafka_linger_ms: u64,

    /// Secrets Manager secret holding `{"username", "password"}` for SASL
    #[serde(default)]
    pub kafka_sasl_credentials_secret: Option<String>,

    /// Prefix of every destination topic
    pub base_topic_name: String,

    // Ingestion behaviour
    /// How long a batch waits for broker acknowledgments
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,

    #[serde(default)]
    pub routing_failure_policy: RoutingFailurePolicy,

    // Credential retrieval
    #[serde(default = "default_credential_retry_max_attempts")]
    pub credential_retry_max_attempts: u32,

    #[serde(default = "default_credential_retry_initial_delay_ms")]
    pub credential_retry_initial_delay_ms: u64,

    #[serde(default = "default_credential_retry_max_delay_ms")]
    pub credential_retry_max_delay_ms: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "relay-all-in-one".to_string()
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_nats_notifications_stream() -> String {
    "storage_notifications".to_string()
}


fn default_nats_consumer_name() -> String {
    "relay-ingest".to_string()
}

fn default_nats_batch_size() -> usize {
    10
}

fn default_nats_batch_wait_secs() -> u64 {
    5
}

fn default_nats_max_deliver() -> i64 {
    5
}

fn default_nats_ack_wait_secs() -> u64 {
    90
}

fn default_startup_timeout_secs() -> u64 {
    10
}

fn default_kafka_bootstrap_servers() -> String {
    "localhost:9092".to_string()
}

fn default_kafka_security_protocol() -> String {
    "PLAINTEXT".to_string()
}

fn default_kafka_compression() -> String {
    "none".to_string()
}

fn default_kafka_message_timeout_ms() -> u64 {
    30_000
}

fn default_kafka_linger_ms() -> u64 {
    5
}

fn default_drain_timeout_secs() -> u64 {
    30
}

fn default_credential_retry_max_attempts() -> u32 {
    5
}

fn default_credential_retry_initial_delay_ms() -> u64 {
    200
}

fn default_credential_retry_max_delay_ms() -> u64 {
    5_000
}

impl ServiceConfig {
    /// Load configuration from `RELAY_`-prefixed environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("RELAY"))
            .build()?
            .try_deserialize()
    }

    /// Reject settings that would start a worker unable to deliver
    pub fn validate(&self) -> Result<()> {
        if self.base_topic_name.trim().is_empty() {
            bail!("RELAY_BASE_TOPIC_NAME must not be empty");
        }
        if self.nats_batch_size == 0 {
            bail!("RELAY_NATS_BATCH_SIZE must be at least 1");
        }
        let stream_prefix = format!("{}.", self.nats_notifications_stream);
        let subject = self.notifications_subject();
        if !subject.starts_with(&stream_prefix) {
            bail!(
                "subject filter {} is outside stream {} (subjects {}>)",
                subject,
                self.nats_notifications_stream,
                stream_prefix
            );
        }
        let min_ack_wait = self.drain_timeout_secs + FETCH_BUDGET_SECS;
        if self.nats_ack_wait_secs < min_ack_wait {
            bail!(
                "RELAY_NATS_ACK_WAIT_SECS is {} but must be at least {} (drain timeout {}s + {}s for fetches)",
                self.nats_ack_wait_secs,
                min_ack_wait,
                self.drain_timeout_secs,
                FETCH_BUDGET_SECS
            );
        }
        if self.kafka_producer_config().requires_credentials()
            && self.kafka_sasl_credentials_secret.is_none()
        {
            bail!(
                "security protocol {} requires RELAY_KAFKA_SASL_CREDENTIALS_SECRET",
                self.kafka_security_protocol
            );
        }
        Ok(())
    }

    /// Configured subject filter, or every subject of the notification stream
    pub fn notifications_subject(&self) -> String {
        self.nats_notifications_subject
            .clone()
            .unwrap_or_else(|| format!("{}.>", self.nats_notifications_stream))
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
        }
    }

    pub fn kafka_producer_config(&self) -> KafkaProducerConfig {
        KafkaProducerConfig {
            bootstrap_servers: self.kafka_bootstrap_servers.clone(),
            security_protocol: self.kafka_security_protocol.clone(),
            sasl_mechanism: self.kafka_sasl_mechanism.clone(),
            compression: self.kafka_compression.clone(),
            message_timeout_ms: self.kafka_message_timeout_ms,
            linger_ms: self.kafka_linger_ms,
        }
    }

    pub fn credential_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.credential_retry_max_attempts,
            initial_delay: Duration::from_millis(self.credential_retry_initial_delay_ms),
            max_delay: Duration::from_millis(self.credential_retry_max_delay_ms),
        }
    }

    pub fn ingest_worker_config(&self) -> IngestWorkerConfig {
        IngestWorkerConfig {
            consumer: ConsumerSettings {
                stream_name: self.nats_notifications_stream.clone(),
                consumer_name: self.nats_consumer_name.clone(),
                subject_filter: self.notifications_subject(),
                batch_size: self.nats_batch_size,
                max_wait: Duration::from_secs(self.nats_batch_wait_secs),
                max_deliver: self.nats_max_deliver,
                ack_wait: Duration::from_secs(self.nats_ack_wait_secs),
            },
            base_topic_name: self.base_topic_name.clone(),
            service: IngestionServiceConfig {
                drain_timeout: Duration::from_secs(self.drain_timeout_secs),
                routing_failure_policy: self.routing_failure_policy,
            },
        }
    }
}
