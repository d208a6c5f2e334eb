use common::domain::{FetchError, ObjectStore};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Decode an object key as it appears in storage-event notifications
///
/// Keys are form-encoded: `+` stands for a space and everything else is
/// percent-encoded, so a literal plus arrives as `%2B`.
pub fn decode_object_key(encoded: &str) -> Result<String, FetchError> {
    let spaced = encoded.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| FetchError::InvalidKey {
            key: encoded.to_string(),
        })
}

/// The text body of one object, with its decoded location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedObject {
    pub bucket: String,
    pub key: String,
    pub text: String,
}

/// Resolves storage-event references into object text
pub struct ObjectFetcher {
    store: Arc<dyn ObjectStore>,
}

impl ObjectFetcher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Fetch the object named by a notification; `encoded_key` is decoded first
    #[instrument(skip(self))]
    pub async fn fetch(&self, bucket: &str, encoded_key: &str) -> Result<FetchedObject, FetchError> {
        let key = decode_object_key(encoded_key)?;
        let body = self.store.get_object(bucket, &key).await?;

        debug!(bucket = %bucket, key = %key, size = body.len(), "fetched object");

        let text = String::from_utf8(Vec::from(body)).map_err(|_| FetchError::InvalidEncoding {
            bucket: bucket.to_string(),
            key: key.clone(),
        })?;

        Ok(FetchedObject {
            bucket: bucket.to_string(),
            key,
            text,
        })
    }
}
