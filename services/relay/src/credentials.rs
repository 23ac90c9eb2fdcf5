//! Upstream credentials and how they are attached to the connection request.

use crate::config::Config;
use async_trait::async_trait;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest,
    handshake::client::Request,
    http::{HeaderValue, header::AUTHORIZATION},
};

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("No upstream credential configured (set GEMINI_API_KEY or GEMINI_BEARER_TOKEN)")]
    Missing,
    #[error("Invalid upstream endpoint '{0}': {1}")]
    InvalidEndpoint(String, String),
}

/// A resolved credential for one upstream connection.
#[derive(Clone, Debug)]
pub enum Credential {
    /// Sent as the `key` query parameter.
    ApiKey(SecretString),
    /// Sent as an `Authorization: Bearer` header.
    Bearer(SecretString),
}

impl Credential {
    /// Builds the WebSocket handshake request for `endpoint`.
    pub fn authorize(&self, endpoint: &str) -> Result<Request, CredentialError> {
        let invalid = |e: String| CredentialError::InvalidEndpoint(endpoint.to_string(), e);
        match self {
            Credential::ApiKey(key) => {
                let mut url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
                url.query_pairs_mut().append_pair("key", key.expose_secret());
                url.as_str()
                    .into_client_request()
                    .map_err(|e| invalid(e.to_string()))
            }
            Credential::Bearer(token) => {
                let mut request = endpoint
                    .into_client_request()
                    .map_err(|e| invalid(e.to_string()))?;
                let value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                    .map_err(|e| invalid(e.to_string()))?;
                request.headers_mut().insert(AUTHORIZATION, value);
                Ok(request)
            }
        }
    }
}

/// Supplies the credential for each new upstream connection.
///
/// Resolution happens once per session, before the upstream is dialed.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn resolve(&self) -> Result<Credential, CredentialError>;
}

/// Credentials read once from the environment. An API key wins over a token.
pub struct StaticCredentials {
    api_key: Option<SecretString>,
    bearer_token: Option<SecretString>,
}

impl StaticCredentials {
    pub fn new(api_key: Option<SecretString>, bearer_token: Option<SecretString>) -> Self {
        Self {
            api_key,
            bearer_token,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.gemini_api_key.clone(),
            config.gemini_bearer_token.clone(),
        )
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn resolve(&self) -> Result<Credential, CredentialError> {
        if let Some(key) = &self.api_key {
            return Ok(Credential::ApiKey(key.clone()));
        }
        if let Some(token) = &self.bearer_token {
            return Ok(Credential::Bearer(token.clone()));
        }
        Err(CredentialError::Missing)
    }
}
