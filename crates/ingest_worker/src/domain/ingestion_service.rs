use crate::domain::{
    decode_lines, unwrap_notification, BatchPublisher, BatchResult, BatchStats, IngestError,
    IngestResult, ItemOutcome, ObjectFetcher, RoutingFailurePolicy, TopicRouter,
};
use bytes::Bytes;
use common::domain::{ObjectStore, OutboundRecord, RecordSink, StorageEventRecord};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// One message of a delivered batch
#[derive(Debug, Clone)]
pub struct NotificationItem {
    pub message_id: String,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct IngestionServiceConfig {
    /// How long the end-of-batch drain waits for broker acknowledgments
    pub drain_timeout: Duration,
    pub routing_failure_policy: RoutingFailurePolicy,
}

/// Drives a batch of notifications through to broker delivery
///
/// Flow per batch:
/// 1. Unwrap each notification into storage-event records
/// 2. Fetch each referenced object and decode it line by line
/// 3. Route every valid line and publish it without waiting
/// 4. Drain all deliveries once and attribute failures to their items
pub struct IngestionService {
    fetcher: ObjectFetcher,
    sink: Arc<dyn RecordSink>,
    router: TopicRouter,
    config: IngestionServiceConfig,
}

impl IngestionService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        sink: Arc<dyn RecordSink>,
        router: TopicRouter,
        config: IngestionServiceConfig,
    ) -> Self {
        Self {
            fetcher: ObjectFetcher::new(store),
            sink,
            router,
            config,
        }
    }

    /// Process a batch and report the outcome of each item in order
    ///
    /// A failing item never stops the ones after it. Records already published
    /// for an item that later fails stay published.
    #[instrument(skip_all, fields(batch_size = items.len()))]
    pub async fn handle_batch(&self, items: Vec<NotificationItem>) -> BatchResult {
        let mut stats = BatchStats {
            items: items.len(),
            ..Default::default()
        };
        let mut publisher = BatchPublisher::new(Arc::clone(&self.sink));
        // Submission index -> owning item index
        let mut owners: Vec<usize> = Vec::new();
        let mut outcomes = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            let outcome = match self.process_item(item, &mut publisher, &mut stats).await {
                Ok(()) => ItemOutcome::Succeeded,
                Err(e) => {
                    warn!(message_id = %item.message_id, error = %e, "notification item failed");
                    ItemOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            owners.resize(publisher.submitted(), index);
            outcomes.push(outcome);
        }

        stats.records_submitted = publisher.submitted();
        let report = publisher.drain(self.config.drain_timeout).await;
        stats.records_delivered = report.delivered;
        stats.delivery_failures = report.failures.len();

        for failure in &report.failures {
            let Some(&owner) = owners.get(failure.submission.index()) else {
                continue;
            };
            warn!(
                message_id = %items[owner].message_id,
                topic = %failure.topic,
                key = %failure.key,
                error = %failure.error,
                "record delivery failed"
            );
            if let Some(outcome) = outcomes.get_mut(owner) {
                if outcome.is_success() {
                    *outcome = ItemOutcome::Failed {
                        reason: failure.to_string(),
                    };
                }
            }
        }

        let result = BatchResult { outcomes, stats };
        info!(
            items = stats.items,
            failed_items = result.failed_items().count(),
            storage_events = stats.storage_events,
            lines_read = stats.lines_read,
            records_submitted = stats.records_submitted,
            records_delivered = stats.records_delivered,
            invalid_lines = stats.invalid_lines,
            routing_failures = stats.routing_failures,
            delivery_failures = stats.delivery_failures,
            "batch processed"
        );
        result
    }

    async fn process_item(
        &self,
        item: &NotificationItem,
        publisher: &mut BatchPublisher,
        stats: &mut BatchStats,
    ) -> IngestResult<()> {
        let body = std::str::from_utf8(&item.body).map_err(|_| IngestError::NonUtf8Body)?;
        let records = unwrap_notification(body)?;

        debug!(
            message_id = %item.message_id,
            storage_events = records.len(),
            "unwrapped notification"
        );
        stats.storage_events += records.len();

        for record in &records {
            self.process_storage_event(record, publisher, stats).await?;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(bucket = %record.bucket, key = %record.key))]
    async fn process_storage_event(
        &self,
        record: &StorageEventRecord,
        publisher: &mut BatchPublisher,
        stats: &mut BatchStats,
    ) -> IngestResult<()> {
        let object = self.fetcher.fetch(&record.bucket, &record.key).await?;

        for line in decode_lines(&object.text) {
            stats.lines_read += 1;

            let value = match line.parsed {
                Ok(value) => value,
                Err(e) => {
                    stats.invalid_lines += 1;
                    warn!(
                        bucket = %object.bucket,
                        key = %object.key,
                        line_number = line.line_number,
                        error = %e,
                        "skipping line that is not valid JSON"
                    );
                    continue;
                }
            };

            let route = match self.router.route(&value) {
                Ok(route) => route,
                Err(source) => {
                    stats.routing_failures += 1;
                    match self.config.routing_failure_policy {
                        RoutingFailurePolicy::Skip => {
                            warn!(
                                bucket = %object.bucket,
                                key = %object.key,
                                line_number = line.line_number,
                                error = %source,
                                "skipping line with unroutable record"
                            );
                            continue;
                        }
                        RoutingFailurePolicy::FailItem => {
                            return Err(IngestError::Routing {
                                bucket: object.bucket,
                                key: object.key,
                                line_number: line.line_number,
                                source,
                            });
                        }
                    }
                }
            };

            publisher.publish(OutboundRecord {
                topic: route.topic,
                key: route.key,
                value: line.raw.to_string(),
            });
        }

        Ok(())
    }
}
