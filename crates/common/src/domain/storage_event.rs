use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// One object write described by a storage-event notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEventRecord {
    pub bucket: String,
    /// Object key exactly as it appeared in the notification (still percent-encoded)
    pub key: String,
    pub event_name: Option<String>,
    pub size: Option<u64>,
}

/// Errors from reading an object out of storage
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("access denied reading s3://{bucket}/{key}")]
    AccessDenied { bucket: String, key: String },

    #[error("failed to read s3://{bucket}/{key}: {message}")]
    Transient {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("object s3://{bucket}/{key} is not valid UTF-8 text")]
    InvalidEncoding { bucket: String, key: String },

    #[error("object key is not valid percent-encoded UTF-8: {key}")]
    InvalidKey { key: String },
}

impl FetchError {
    /// Whether retrying the same read later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }
}

/// Read access to object storage
///
/// Implementations receive an already-decoded key and return the raw body.
/// They must not retry internally; redelivery of the triggering notification
/// is the retry mechanism.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, FetchError>;
}
