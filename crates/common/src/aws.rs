use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use tracing::debug;

/// Load the shared AWS SDK configuration
///
/// SDK-level retries are disabled: object reads are retried by redelivery of the
/// triggering notification, and credential reads by `fetch_credentials_with_retry`.
pub async fn load_aws_config(region: Option<String>) -> SdkConfig {
    debug!(region = ?region, "loading AWS SDK configuration");

    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).retry_config(RetryConfig::disabled());
    if let Some(region) = region {
        loader = loader.region(Region::new(region));
    }

    loader.load().await
}
