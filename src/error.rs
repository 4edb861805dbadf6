use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Coarse classification used by the synchronizer to pick a recovery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No response from the backend (connect failure, timeout, reset).
    Network,
    /// 401/403. Handled by the auth session's refresh, never by backoff.
    Auth,
    /// 5xx or a payload that could not be decoded.
    Server,
    /// The backend answered successfully with zero records.
    EmptyResult,
}

crate::enum_display!(ErrorKind, {
    Network => "network",
    Auth => "auth",
    Server => "server",
    EmptyResult => "empty result",
});

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("invalid status '{0}'")]
    InvalidStatus(String),

    #[error("invalid category '{0}'")]
    InvalidCategory(String),

    #[error("invalid priority '{0}'")]
    InvalidPriority(String),

    #[error("invalid sort field '{0}'")]
    InvalidSortField(String),

    #[error("invalid sort direction '{0}'")]
    InvalidSortDirection(String),

    #[error("invalid filter key '{0}'")]
    InvalidFilterKey(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("synchronizer has shut down")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// Classify this error for the retry/fallback decision.
    ///
    /// Anything that is not clearly a transport or auth problem is treated
    /// as a server error so it goes through backoff and, eventually, fallback.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Network(_) => ErrorKind::Network,
            SyncError::Auth(_) | SyncError::SessionExpired(_) => ErrorKind::Auth,
            SyncError::Http(e) => classify_reqwest(e),
            _ => ErrorKind::Server,
        }
    }

    /// True when the session owner has to step in (forced sign-out).
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, SyncError::SessionExpired(_))
    }

    pub fn from_status(status: reqwest::StatusCode, message: impl fmt::Display) -> Self {
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return SyncError::Auth(format!("HTTP {}: {}", status.as_u16(), message));
        }
        SyncError::Server {
            status: status.as_u16(),
            message: message.to_string(),
        }
    }
}

fn classify_reqwest(error: &reqwest::Error) -> ErrorKind {
    if let Some(status) = error.status() {
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return ErrorKind::Auth;
        }
        return ErrorKind::Server;
    }
    if error.is_decode() {
        return ErrorKind::Server;
    }
    ErrorKind::Network
}

pub type Result<T> = std::result::Result<T, SyncError>;
