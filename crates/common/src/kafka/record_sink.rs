use crate::domain::{
    BrokerCredentials, DeliveryError, DeliveryFuture, DeliveryReceipt, OutboundRecord, RecordSink,
};
use crate::kafka::KafkaProducerConfig;
use anyhow::{Context, Result};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{debug, info};

/// `RecordSink` backed by a long-lived librdkafka producer
///
/// `FutureProducer` polls on its own background thread, so delivery futures
/// resolve without the caller driving the client.
#[derive(Clone)]
pub struct KafkaRecordSink {
    producer: FutureProducer,
}

impl KafkaRecordSink {
    pub fn new(
        config: &KafkaProducerConfig,
        credentials: Option<&BrokerCredentials>,
    ) -> Result<Self> {
        info!(
            bootstrap_servers = %config.bootstrap_servers,
            security_protocol = %config.security_protocol,
            compression = %config.compression,
            "creating Kafka producer"
        );

        let producer: FutureProducer = config
            .client_config(credentials)
            .create()
            .context("Failed to create Kafka producer")?;

        Ok(Self { producer })
    }
}

impl RecordSink for KafkaRecordSink {
    fn enqueue(&self, record: &OutboundRecord) -> Result<DeliveryFuture, DeliveryError> {
        let future_record = FutureRecord::to(&record.topic)
            .key(record.key_bytes())
            .payload(record.value_bytes());

        let delivery = self
            .producer
            .send_result(future_record)
            .map_err(|(err, _record)| DeliveryError::Rejected(err.to_string()))?;

        Ok(Box::pin(async move {
            match delivery.await {
                Ok(Ok((partition, offset))) => Ok(DeliveryReceipt { partition, offset }),
                Ok(Err((err, _message))) => Err(DeliveryError::Broker(err.to_string())),
                Err(_canceled) => Err(DeliveryError::Cancelled),
            }
        }))
    }

    fn flush(&self, timeout: Duration) -> Result<(), DeliveryError> {
        debug!(timeout_ms = timeout.as_millis() as u64, "flushing Kafka producer");
        self.producer
            .flush(Timeout::After(timeout))
            .map_err(|err| DeliveryError::Broker(err.to_string()))
    }
}
