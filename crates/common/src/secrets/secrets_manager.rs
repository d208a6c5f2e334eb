use crate::domain::{BrokerCredentials, CredentialError, CredentialSource};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_secretsmanager::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_secretsmanager::operation::get_secret_value::GetSecretValueError;
use tracing::{debug, instrument};

/// Service error codes that will not change on retry
const PERMANENT_ERROR_CODES: [&str; 4] = [
    "ResourceNotFoundException",
    "AccessDeniedException",
    "DecryptionFailure",
    "InvalidRequestException",
];

/// `CredentialSource` backed by AWS Secrets Manager
pub struct SecretsManagerCredentialSource {
    client: aws_sdk_secretsmanager::Client,
}

impl SecretsManagerCredentialSource {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_secretsmanager::Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl CredentialSource for SecretsManagerCredentialSource {
    #[instrument(skip(self), fields(secret = %secret_name))]
    async fn fetch_broker_credentials(
        &self,
        secret_name: &str,
    ) -> Result<BrokerCredentials, CredentialError> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(secret_name)
            .send()
            .await
            .map_err(|err| classify_secret_error(secret_name, err))?;

        let secret = output
            .secret_string()
            .ok_or_else(|| CredentialError::Malformed {
                name: secret_name.to_string(),
                message: "secret has no string value".to_string(),
            })?;

        debug!("retrieved broker credentials");
        BrokerCredentials::from_secret_json(secret_name, secret)
    }
}

fn classify_secret_error(secret_name: &str, err: SdkError<GetSecretValueError>) -> CredentialError {
    let name = secret_name.to_string();
    let message = DisplayErrorContext(&err).to_string();

    let permanent = matches!(
        &err,
        SdkError::ServiceError(service_err)
            if service_err
                .err()
                .code()
                .is_some_and(|code| PERMANENT_ERROR_CODES.contains(&code))
    );

    if permanent {
        CredentialError::Rejected { name, message }
    } else {
        CredentialError::Unavailable { name, message }
    }
}
