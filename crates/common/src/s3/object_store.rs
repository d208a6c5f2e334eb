use crate::domain::{FetchError, ObjectStore};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use bytes::Bytes;
use tracing::{debug, instrument};

/// `ObjectStore` backed by Amazon S3
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(sdk_config),
        }
    }

    pub fn from_client(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self), fields(bucket = %bucket, key = %key))]
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, FetchError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| classify_get_object_error(bucket, key, err))?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|err| FetchError::Transient {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: format!("failed to read object body: {}", err),
            })?
            .into_bytes();

        debug!(size = body.len(), "read object from S3");
        Ok(body)
    }
}

fn classify_get_object_error(bucket: &str, key: &str, err: SdkError<GetObjectError>) -> FetchError {
    let bucket = bucket.to_string();
    let key = key.to_string();

    if let SdkError::ServiceError(service_err) = &err {
        let inner = service_err.err();
        if inner.is_no_such_key() {
            return FetchError::NotFound { bucket, key };
        }
        match inner.code() {
            Some("NoSuchKey") | Some("NoSuchBucket") => {
                return FetchError::NotFound { bucket, key };
            }
            Some("AccessDenied") | Some("AllAccessDisabled") => {
                return FetchError::AccessDenied { bucket, key };
            }
            _ => {}
        }
    }

    FetchError::Transient {
        bucket,
        key,
        message: DisplayErrorContext(&err).to_string(),
    }
}
