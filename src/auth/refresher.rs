//! Token refresher implementations.

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::Config;
use crate::error::{Result, SyncError};

use super::TokenRefresher;

/// Fixed credentials that cannot be renewed. A rejection expires the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticToken;

impl TokenRefresher for StaticToken {
    async fn refresh(&self) -> Result<SecretString> {
        Err(SyncError::Auth(
            "static credentials cannot be refreshed".to_string(),
        ))
    }
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
}

/// Exchanges a refresh token at `{base_url}/auth/refresh`.
pub struct HttpTokenRefresher {
    client: Client,
    endpoint: Url,
    refresh_token: SecretString,
}

impl HttpTokenRefresher {
    pub fn new(client: Client, base_url: &Url, refresh_token: SecretString) -> Result<Self> {
        let endpoint = base_url
            .join("auth/refresh")
            .map_err(|e| SyncError::Config(format!("invalid refresh endpoint: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            refresh_token,
        })
    }

    /// Build from configuration, or `None` when no refresh token is configured
    pub fn from_config(client: Client, config: &Config) -> Result<Option<Self>> {
        let Some(refresh_token) = config.refresh_token() else {
            return Ok(None);
        };
        let base_url = config.base_url()?;
        Self::new(client, &base_url, SecretString::from(refresh_token)).map(Some)
    }
}

impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self) -> Result<SecretString> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&RefreshRequest {
                refresh_token: self.refresh_token.expose_secret(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::from_status(status, "token refresh rejected"));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| SyncError::MalformedResponse(format!("refresh response: {e}")))?;
        if body.access_token.is_empty() {
            return Err(SyncError::MalformedResponse(
                "refresh response has an empty access_token".to_string(),
            ));
        }
        Ok(SecretString::from(body.access_token))
    }
}

impl std::fmt::Debug for HttpTokenRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTokenRefresher")
            .field("endpoint", &self.endpoint.as_str())
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}
