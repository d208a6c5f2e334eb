use crate::domain::RoutingError;
use common::domain::FetchError;
use thiserror::Error;

/// Failures that abort processing of a single notification item
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("notification body is not valid UTF-8")]
    NonUtf8Body,

    #[error("malformed notification envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    #[error("notification envelope is not a JSON object")]
    EnvelopeNotObject,

    #[error("envelope Message field is not a string")]
    MessageNotText,

    #[error("malformed embedded message: {0}")]
    MalformedEmbeddedMessage(#[source] serde_json::Error),

    #[error("Records field is not a list")]
    RecordsNotList,

    #[error("storage event record {index} is malformed: {source}")]
    MalformedStorageEvent {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("routing failed at line {line_number} of s3://{bucket}/{key}: {source}")]
    Routing {
        bucket: String,
        key: String,
        line_number: usize,
        #[source]
        source: RoutingError,
    },
}

pub type IngestResult<T> = Result<T, IngestError>;
