use common::domain::{DeliveryError, DeliveryFuture, OutboundRecord, RecordSink};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Position of a record in the order it was published within a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubmissionId(usize);

impl SubmissionId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A record that was not confirmed by the broker
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("delivery of record {} to {topic} failed: {error}", .submission.index())]
pub struct DeliveryFailure {
    pub submission: SubmissionId,
    pub topic: String,
    pub key: String,
    pub error: DeliveryError,
}

#[derive(Debug, Default)]
pub struct DrainReport {
    pub delivered: usize,
    /// Ordered by submission
    pub failures: Vec<DeliveryFailure>,
}

impl DrainReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

struct PendingDelivery {
    submission: SubmissionId,
    topic: String,
    key: String,
    delivery: DeliveryFuture,
}

/// Collects the deliveries of one batch and waits for them once at the end
pub struct BatchPublisher {
    sink: Arc<dyn RecordSink>,
    pending: Vec<PendingDelivery>,
    rejected: Vec<DeliveryFailure>,
    submitted: usize,
}

impl BatchPublisher {
    pub fn new(sink: Arc<dyn RecordSink>) -> Self {
        Self {
            sink,
            pending: Vec::new(),
            rejected: Vec::new(),
            submitted: 0,
        }
    }

    /// Hand a record to the sink without waiting for the broker
    ///
    /// A record the sink refuses outright is remembered and reported by `drain`.
    pub fn publish(&mut self, record: OutboundRecord) -> SubmissionId {
        let submission = SubmissionId(self.submitted);
        self.submitted += 1;

        match self.sink.enqueue(&record) {
            Ok(delivery) => self.pending.push(PendingDelivery {
                submission,
                topic: record.topic,
                key: record.key,
                delivery,
            }),
            Err(error) => {
                warn!(topic = %record.topic, key = %record.key, error = %error, "record rejected by producer");
                self.rejected.push(DeliveryFailure {
                    submission,
                    topic: record.topic,
                    key: record.key,
                    error,
                });
            }
        }

        submission
    }

    /// Number of records published so far, rejected ones included
    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Wait for every outstanding delivery, giving up at `timeout`
    ///
    /// Deliveries still unresolved at the deadline are reported as
    /// `DeliveryError::TimedOut` and never awaited again.
    #[instrument(skip(self), fields(submitted = self.submitted))]
    pub async fn drain(self, timeout: Duration) -> DrainReport {
        let deadline = Instant::now() + timeout;
        let mut failures = self.rejected;
        let mut delivered = 0;

        let mut outstanding = BTreeMap::new();
        let mut in_flight = FuturesUnordered::new();
        for pending in self.pending {
            outstanding.insert(pending.submission, (pending.topic, pending.key));
            let submission = pending.submission;
            let delivery = pending.delivery;
            in_flight.push(async move { (submission, delivery.await) });
        }

        loop {
            match tokio::time::timeout_at(deadline, in_flight.next()).await {
                Ok(Some((submission, result))) => {
                    let Some((topic, key)) = outstanding.remove(&submission) else {
                        continue;
                    };
                    match result {
                        Ok(receipt) => {
                            debug!(
                                topic = %topic,
                                partition = receipt.partition,
                                offset = receipt.offset,
                                "record delivered"
                            );
                            delivered += 1;
                        }
                        Err(error) => failures.push(DeliveryFailure {
                            submission,
                            topic,
                            key,
                            error,
                        }),
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        unresolved = outstanding.len(),
                        timeout_ms = timeout.as_millis() as u64,
                        "drain deadline reached with deliveries outstanding"
                    );
                    failures.extend(outstanding.into_iter().map(|(submission, (topic, key))| {
                        DeliveryFailure {
                            submission,
                            topic,
                            key,
                            error: DeliveryError::TimedOut(timeout),
                        }
                    }));
                    break;
                }
            }
        }

        failures.sort_by_key(|failure| failure.submission);
        DrainReport {
            delivered,
            failures,
        }
    }
}
