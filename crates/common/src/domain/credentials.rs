use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

/// SASL credentials used to authenticate to the messaging broker
#[derive(Debug)]
pub struct BrokerCredentials {
    pub username: String,
    pub password: SecretString,
}

#[derive(Deserialize)]
struct SecretPayload {
    username: String,
    password: String,
}

impl BrokerCredentials {
    /// Parse a secret value of the form `{"username": "...", "password": "..."}`
    pub fn from_secret_json(secret_name: &str, raw: &str) -> Result<Self, CredentialError> {
        let payload: SecretPayload =
            serde_json::from_str(raw).map_err(|e| CredentialError::Malformed {
                name: secret_name.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            username: payload.username,
            password: SecretString::from(payload.password),
        })
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential secret {name} is temporarily unavailable: {message}")]
    Unavailable { name: String, message: String },

    #[error("credential secret {name} cannot be read: {message}")]
    Rejected { name: String, message: String },

    #[error("credential secret {name} is malformed: {message}")]
    Malformed { name: String, message: String },
}

impl CredentialError {
    /// Only unavailability is worth retrying; a missing or malformed secret stays that way
    pub fn is_transient(&self) -> bool {
        matches!(self, CredentialError::Unavailable { .. })
    }
}

/// Source of broker credentials (a secret store)
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch_broker_credentials(
        &self,
        secret_name: &str,
    ) -> Result<BrokerCredentials, CredentialError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_from_secret_json_success() {
        let creds =
            BrokerCredentials::from_secret_json("msk", r#"{"username":"svc","password":"p4ss"}"#)
                .unwrap();

        assert_eq!(creds.username, "svc");
        assert_eq!(creds.password.expose_secret(), "p4ss");
    }

    #[test]
    fn test_from_secret_json_missing_password() {
        let result = BrokerCredentials::from_secret_json("msk", r#"{"username":"svc"}"#);

        let err = result.unwrap_err();
        assert!(matches!(err, CredentialError::Malformed { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_debug_output_redacts_password() {
        let creds =
            BrokerCredentials::from_secret_json("msk", r#"{"username":"svc","password":"p4ss"}"#)
                .unwrap();

        assert!(!format!("{:?}", creds).contains("p4ss"));
    }
}
