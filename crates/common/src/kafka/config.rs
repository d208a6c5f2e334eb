use crate::domain::BrokerCredentials;
use rdkafka::ClientConfig;
use secrecy::ExposeSecret;

/// Connection and producer settings for the Kafka cluster
#[derive(Debug, Clone)]
pub struct KafkaProducerConfig {
    pub bootstrap_servers: String,
    pub security_protocol: String,
    pub sasl_mechanism: Option<String>,
    pub compression: String,
    pub message_timeout_ms: u64,
    pub linger_ms: u64,
}

impl KafkaProducerConfig {
    /// Whether the security protocol authenticates with SASL
    pub fn requires_credentials(&self) -> bool {
        self.security_protocol.to_ascii_uppercase().starts_with("SASL")
    }

    /// Build the librdkafka client configuration
    pub fn client_config(&self, credentials: Option<&BrokerCredentials>) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("security.protocol", &self.security_protocol)
            .set("compression.type", &self.compression)
            .set("message.timeout.ms", self.message_timeout_ms.to_string())
            .set("linger.ms", self.linger_ms.to_string());

        if let Some(mechanism) = &self.sasl_mechanism {
            client_config.set("sasl.mechanism", mechanism);
        }

        if let Some(credentials) = credentials {
            client_config
                .set("sasl.username", &credentials.username)
                .set("sasl.password", credentials.password.expose_secret());
        }

        client_config
    }
}
