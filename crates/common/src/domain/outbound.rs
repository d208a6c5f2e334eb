use futures::future::BoxFuture;
use std::time::Duration;
use thiserror::Error;

/// A record ready to be appended to a broker topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    pub topic: String,
    /// Partition key
    pub key: String,
    /// The source line, unmodified
    pub value: String,
}

impl OutboundRecord {
    pub fn key_bytes(&self) -> &[u8] {
        self.key.as_bytes()
    }

    pub fn value_bytes(&self) -> &[u8] {
        self.value.as_bytes()
    }
}

/// Broker confirmation for one delivered record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub partition: i32,
    pub offset: i64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("record rejected by producer: {0}")]
    Rejected(String),

    #[error("broker reported delivery failure: {0}")]
    Broker(String),

    #[error("delivery cancelled before the broker responded")]
    Cancelled,

    #[error("delivery not confirmed within {0:?}")]
    TimedOut(Duration),
}

/// Resolves once the broker has acknowledged or failed a single record
pub type DeliveryFuture = BoxFuture<'static, Result<DeliveryReceipt, DeliveryError>>;

/// Buffered, non-blocking handoff of records to a messaging broker
///
/// Implementations:
/// - must not wait on network I/O inside `enqueue`
/// - return a future per record that resolves on broker acknowledgment
/// - handle batching and compression internally
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait RecordSink: Send + Sync {
    /// Place a record in the producer's outbound buffer
    fn enqueue(&self, record: &OutboundRecord) -> Result<DeliveryFuture, DeliveryError>;

    /// Block until buffered records are sent or `timeout` elapses
    fn flush(&self, timeout: Duration) -> Result<(), DeliveryError>;
}
