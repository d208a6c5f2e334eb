use crate::config::ServiceConfig;
use anyhow::{Context, Result};
use common::aws::load_aws_config;
use common::domain::{BrokerCredentials, CredentialSource};
use common::kafka::KafkaRecordSink;
use common::nats::NatsClient;
use common::s3::S3ObjectStore;
use common::secrets::{fetch_credentials_with_retry, SecretsManagerCredentialSource};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Long-lived clients shared by every batch, built once at startup
pub struct RelayContext {
    pub nats_client: Arc<NatsClient>,
    pub object_store: Arc<S3ObjectStore>,
    pub record_sink: Arc<KafkaRecordSink>,
}

impl RelayContext {
    /// Load credentials, then connect to NATS and create the S3 and Kafka clients
    ///
    /// Fails when SASL credentials cannot be obtained; no producer is built
    /// without them.
    pub async fn initialize(config: &ServiceConfig) -> Result<Self> {
        let sdk_config = load_aws_config(config.aws_region.clone()).await;

        let credential_source = SecretsManagerCredentialSource::new(&sdk_config);
        let credentials = load_broker_credentials(&credential_source, config).await?;

        info!("Initializing Kafka producer...");
        let record_sink = Arc::new(KafkaRecordSink::new(
            &config.kafka_producer_config(),
            credentials.as_ref(),
        )?);

        info!("Initializing NATS...");
        let nats_client = Arc::new(
            NatsClient::connect(
                &config.nats_url,
                Duration::from_secs(config.startup_timeout_secs),
            )
            .await?,
        );

        let object_store = Arc::new(S3ObjectStore::new(&sdk_config));

        Ok(Self {
            nats_client,
            object_store,
            record_sink,
        })
    }
}

/// Fetch SASL credentials when the security protocol needs them
pub async fn load_broker_credentials(
    source: &dyn CredentialSource,
    config: &ServiceConfig,
) -> Result<Option<BrokerCredentials>> {
    if !config.kafka_producer_config().requires_credentials() {
        return Ok(None);
    }

    let secret_name = config
        .kafka_sasl_credentials_secret
        .as_deref()
        .context("SASL security protocol configured without a credentials secret")?;

    info!(secret = %secret_name, "Loading Kafka credentials");
    let credentials =
        fetch_credentials_with_retry(source, secret_name, &config.credential_retry_policy())
            .await
            .context("Failed to load Kafka credentials")?;

    Ok(Some(credentials))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{CredentialError, MockCredentialSource};
    use ingest_worker::domain::RoutingFailurePolicy;
    use secrecy::{ExposeSecret, SecretString};

    fn config(security_protocol: &str, secret: Option<&str>) -> ServiceConfig {
        ServiceConfig {
            log_level: "info".to_string(),
            otel_enabled: false,
            otel_endpoint: "http://localhost:4317".to_string(),
            otel_service_name: "relay-all-in-one".to_string(),
            nats_url: "nats://localhost:4222".to_string(),
            nats_notifications_stream: "storage_notifications".to_string(),
            nats_notifications_subject: None,
            nats_consumer_name: "relay-ingest".to_string(),
            nats_batch_size: 10,
            nats_batch_wait_secs: 5,
            nats_max_deliver: 5,
            nats_ack_wait_secs: 90,
            startup_timeout_secs: 10,
            aws_region: None,
            kafka_bootstrap_servers: "localhost:9092".to_string(),
            kafka_security_protocol: security_protocol.to_string(),
            kafka_sasl_mechanism: Some("SCRAM-SHA-512".to_string()),
            kafka_compression: "none".to_string(),
            kafka_message_timeout_ms: 30_000,
            kafka_linger_ms: 5,
            kafka_sasl_credentials_secret: secret.map(str::to_string),
            base_topic_name: "cdl".to_string(),
            drain_timeout_secs: 30,
            routing_failure_policy: RoutingFailurePolicy::Skip,
            credential_retry_max_attempts: 3,
            credential_retry_initial_delay_ms: 1,
            credential_retry_max_delay_ms: 2,
        }
    }

    #[tokio::test]
    async fn test_plaintext_skips_credential_lookup() {
        let mut source = MockCredentialSource::new();
        source.expect_fetch_broker_credentials().never();

        let credentials = load_broker_credentials(&source, &config("PLAINTEXT", None))
            .await
            .unwrap();

        assert!(credentials.is_none());
    }

    #[tokio::test]
    async fn test_sasl_loads_credentials_from_secret() {
        let mut source = MockCredentialSource::new();
        source
            .expect_fetch_broker_credentials()
            .withf(|name: &str| name == "relay/kafka")
            .times(1)
            .returning(|_| {
                Ok(BrokerCredentials {
                    username: "relay".to_string(),
                    password: SecretString::from("s3cr3t"),
                })
            });

        let credentials = load_broker_credentials(&source, &config("SASL_SSL", Some("relay/kafka")))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(credentials.username, "relay");
        assert_eq!(credentials.password.expose_secret(), "s3cr3t");
    }

    #[tokio::test]
    async fn test_unavailable_credentials_fail_startup() {
        let mut source = MockCredentialSource::new();
        source
            .expect_fetch_broker_credentials()
            .times(3)
            .returning(|name| {
                Err(CredentialError::Unavailable {
                    name: name.to_string(),
                    message: "endpoint unreachable".to_string(),
                })
            });

        let result = load_broker_credentials(&source, &config("SASL_SSL", Some("relay/kafka"))).await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to load Kafka credentials"));
    }

    #[tokio::test]
    async fn test_sasl_without_secret_name_fails() {
        let source = MockCredentialSource::new();

        let result = load_broker_credentials(&source, &config("SASL_PLAINTEXT", None)).await;

        assert!(result.is_err());
    }
}
