//! HTTP ticket query backend.

use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::auth::{AuthSession, Credential, TokenRefresher};
use crate::config::Config;
use crate::error::{ErrorKind, Result, SyncError};

use super::{FetchRequest, TicketPage, TicketQuery};

/// HTTP client shared by the ticket query and token refresh. The timeout
/// covers the whole request; hitting it is a network error.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("civic-sync/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(SyncError::from)
}

/// Queries `GET {base_url}/tickets` with bearer auth.
///
/// A 401/403 triggers one shared token refresh and one retry. A second
/// rejection expires the session.
pub struct HttpTicketQuery<R> {
    client: Client,
    endpoint: Url,
    session: AuthSession<R>,
}

impl<R: TokenRefresher> HttpTicketQuery<R> {
    pub fn new(client: Client, base_url: &Url, session: AuthSession<R>) -> Result<Self> {
        let endpoint = base_url
            .join("tickets")
            .map_err(|e| SyncError::Config(format!("invalid tickets endpoint: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            session,
        })
    }

    pub fn from_config(client: Client, config: &Config, refresher: R) -> Result<Self> {
        let token = config.token().ok_or_else(|| {
            SyncError::Config(format!(
                "no API token configured; set auth.token or {}",
                crate::config::TOKEN_ENV_VAR
            ))
        })?;
        let session = AuthSession::new(SecretString::from(token), refresher);
        Self::new(client, &config.base_url()?, session)
    }

    pub fn session(&self) -> &AuthSession<R> {
        &self.session
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn send(&self, request: &FetchRequest, credential: &Credential) -> Result<TicketPage> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .bearer_auth(credential.token.expose_secret())
            .query(&request.query_pairs())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = if body.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body
            };
            return Err(SyncError::from_status(status, message));
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| SyncError::MalformedResponse(e.to_string()))
    }
}

impl<R: TokenRefresher> TicketQuery for HttpTicketQuery<R> {
    async fn fetch(&self, request: &FetchRequest) -> Result<TicketPage> {
        let credential = self.session.current();
        match self.send(request, &credential).await {
            Err(e) if e.kind() == ErrorKind::Auth => {
                tracing::debug!(seq = request.seq, error = %e, "request rejected; refreshing token");
                let renewed = self.session.refresh_after(&credential).await?;
                match self.send(request, &renewed).await {
                    Err(e) if e.kind() == ErrorKind::Auth => {
                        let reason = format!("rejected after refresh: {e}");
                        self.session.expire(&reason);
                        Err(SyncError::SessionExpired(reason))
                    }
                    other => other,
                }
            }
            other => other,
        }
    }
}

impl<R> std::fmt::Debug for HttpTicketQuery<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTicketQuery")
            .field("endpoint", &self.endpoint.as_str())
            .field("session", &self.session)
            .finish()
    }
}
