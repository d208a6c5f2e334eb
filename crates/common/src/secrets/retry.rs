use crate::domain::{BrokerCredentials, CredentialError, CredentialSource};
use std::time::Duration;
use tracing::{error, info, warn};

/// Exponential backoff settings for credential retrieval
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Fetch broker credentials, retrying transient failures with backoff
///
/// Permanent failures (missing secret, denied access, malformed value) are
/// returned on the first attempt. After `max_attempts` transient failures the
/// last error is returned.
pub async fn fetch_credentials_with_retry(
    source: &dyn CredentialSource,
    secret_name: &str,
    policy: &RetryPolicy,
) -> Result<BrokerCredentials, CredentialError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match source.fetch_broker_credentials(secret_name).await {
            Ok(credentials) => {
                info!(secret = %secret_name, attempt, "loaded broker credentials");
                return Ok(credentials);
            }
            Err(e) if !e.is_transient() => {
                error!(secret = %secret_name, error = %e, "credential secret cannot be used");
                return Err(e);
            }
            Err(e) if attempt >= max_attempts => {
                error!(
                    secret = %secret_name,
                    error = %e,
                    max_attempts,
                    "max retry attempts reached loading broker credentials"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    secret = %secret_name,
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "retrying broker credential retrieval"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
