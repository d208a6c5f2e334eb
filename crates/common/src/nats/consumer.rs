use crate::nats::{JetStreamConsumer, PullConsumer};
use anyhow::{Context, Result};
use async_nats::jetstream::{self, Message};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of processing a batch of messages
/// Provides fine-grained control over which messages to acknowledge vs reject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingResult {
    /// Messages that were successfully processed and should be acknowledged (Ack)
    pub ack: Vec<usize>,
    /// Messages that failed processing and should be redelivered (Nak) with optional error details
    pub nak: Vec<(usize, Option<String>)>,
}

impl ProcessingResult {
    /// Create a result where all messages should be acknowledged
    pub fn ack_all(count: usize) -> Self {
        Self {
            ack: (0..count).collect(),
            nak: Vec::new(),
        }
    }

    /// Create a result where all messages should be rejected
    pub fn nak_all(count: usize, error: Option<String>) -> Self {
        Self {
            ack: Vec::new(),
            nak: (0..count).map(|i| (i, error.clone())).collect(),
        }
    }

    /// Create a result with specific ack/nak indices
    pub fn new(ack: Vec<usize>, nak: Vec<(usize, Option<String>)>) -> Self {
        Self { ack, nak }
    }
}

/// Type alias for the batch processor function
/// Takes a slice of raw NATS messages and returns a ProcessingResult
/// The processor is responsible for deserializing and processing the messages
pub type BatchProcessor =
    Box<dyn Fn(&[Message]) -> BoxFuture<'static, Result<ProcessingResult>> + Send + Sync>;

/// Durable pull consumer settings
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub stream_name: String,
    pub consumer_name: String,
    pub subject_filter: String,
    pub batch_size: usize,
    pub max_wait: Duration,
    /// Delivery attempts before JetStream stops redelivering a message; -1 is unlimited
    pub max_deliver: i64,
    /// Time a delivered message may stay unsettled before JetStream redelivers it;
    /// must cover a whole batch including its drain
    pub ack_wait: Duration,
}

impl ConsumerSettings {
    fn pull_config(&self) -> jetstream::consumer::pull::Config {
        jetstream::consumer::pull::Config {
            name: Some(self.consumer_name.clone()),
            durable_name: Some(self.consumer_name.clone()),
            filter_subject: self.subject_filter.clone(),
            ack_policy: jetstream::consumer::AckPolicy::Explicit,
            max_deliver: self.max_deliver,
            ack_wait: self.ack_wait,
            ..Default::default()
        }
    }
}

/// Generic NATS JetStream consumer that processes batches of messages
/// The consumer handles fetching messages, acknowledgments, and error handling
/// Message deserialization and business logic are delegated to the processor function
pub struct NatsConsumer {
    consumer: Box<dyn PullConsumer>,
    settings: ConsumerSettings,
    processor: BatchProcessor,
}

impl NatsConsumer {
    pub async fn new(
        jetstream: Arc<dyn JetStreamConsumer>,
        settings: ConsumerSettings,
        processor: BatchProcessor,
    ) -> Result<Self> {
        debug!(
            stream = %settings.stream_name,
            consumer = %settings.consumer_name,
            filter_subject = %settings.subject_filter,
            max_deliver = settings.max_deliver,
            ack_wait_secs = settings.ack_wait.as_secs(),
            "creating JetStream consumer"
        );

        let consumer = jetstream
            .create_consumer(settings.pull_config(), &settings.stream_name)
            .await
            .context("failed to create consumer")?;

        info!(
            stream = %settings.stream_name,
            consumer = %settings.consumer_name,
            "consumer created successfully"
        );

        Ok(Self {
            consumer,
            settings,
            processor,
        })
    }

    /// Run the consumer loop until cancellation
    pub async fn run(&self, ctx: CancellationToken) -> Result<()> {
        info!(
            stream = %self.settings.stream_name,
            consumer = %self.settings.consumer_name,
            "starting consumer loop"
        );

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!(
                        consumer = %self.settings.consumer_name,
                        "received shutdown signal, stopping consumer"
                    );
                    break;
                }
                result = self.fetch_and_process_batch() => {
                    if let Err(e) = result {
                        error!(
                            consumer = %self.settings.consumer_name,
                            error = %e,
                            "error processing batch"
                        );
                        // Continue processing despite errors
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }

        info!(consumer = %self.settings.consumer_name, "consumer stopped gracefully");
        Ok(())
    }

    async fn fetch_and_process_batch(&self) -> Result<()> {
        debug!(
            batch_size = self.settings.batch_size,
            max_wait_ms = self.settings.max_wait.as_millis() as u64,
            "fetching message batch"
        );

        let raw_messages = self
            .consumer
            .fetch_messages(self.settings.batch_size, self.settings.max_wait)
            .await?;

        if raw_messages.is_empty() {
            debug!("no messages in batch");
            return Ok(());
        }

        debug!(message_count = raw_messages.len(), "received message batch");

        let processing_result = match (self.processor)(&raw_messages).await {
            Ok(result) => result,
            Err(e) => {
                // If the processor returns an error, Nak all messages
                error!(error = %e, "processor returned error, rejecting all messages");
                ProcessingResult::nak_all(raw_messages.len(), Some(e.to_string()))
            }
        };

        settle_batch(&raw_messages, processing_result).await;
        Ok(())
    }
}

/// Ack or nak each message of a batch according to the processor's decision
async fn settle_batch(messages: &[Message], result: ProcessingResult) {
    let ack_count = result.ack.len();
    for idx in result.ack {
        match messages.get(idx) {
            Some(msg) => {
                if let Err(e) = msg.ack().await {
                    error!(error = %e, message_index = idx, "failed to acknowledge message");
                }
            }
            None => warn!(
                message_index = idx,
                batch_size = messages.len(),
                "invalid ack index in ProcessingResult"
            ),
        }
    }

    if ack_count > 0 {
        debug!(ack_count, "acknowledged messages");
    }

    let nak_count = result.nak.len();
    for (idx, reason) in result.nak {
        let Some(msg) = messages.get(idx) else {
            warn!(
                message_index = idx,
                batch_size = messages.len(),
                "invalid nak index in ProcessingResult"
            );
            continue;
        };

        match reason {
            Some(reason) => warn!(
                message_index = idx,
                subject = %msg.subject,
                reason = %reason,
                "rejecting message for redelivery"
            ),
            None => warn!(
                message_index = idx,
                subject = %msg.subject,
                "rejecting message for redelivery"
            ),
        }

        if let Err(e) = msg.ack_with(jetstream::AckKind::Nak(None)).await {
            error!(error = %e, message_index = idx, "failed to reject message");
        }
    }

    if nak_count > 0 {
        debug!(nak_count, "rejected messages for redelivery");
    }
}
