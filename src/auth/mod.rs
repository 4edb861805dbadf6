//! Bearer credentials with single-flight refresh.
//!
//! Every outgoing request reads the current token together with its
//! generation number. When a request is rejected with 401/403 it asks the
//! session for a token newer than the one it used. If another request has
//! already refreshed in the meantime, the newer token is returned at once;
//! otherwise the first caller starts the refresh and every concurrent
//! caller awaits that same future. A failed refresh expires the session and
//! is broadcast to the session owner; nothing in this crate retries it.

pub mod refresher;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::{Mutex, RwLock};
use secrecy::SecretString;
use tokio::sync::watch;

use crate::error::{Result, SyncError};

pub use refresher::{HttpTokenRefresher, StaticToken};

/// Supplies a fresh bearer token.
pub trait TokenRefresher: Send + Sync + 'static {
    fn refresh(&self) -> impl std::future::Future<Output = Result<SecretString>> + Send;
}

/// Current token and the generation it belongs to.
#[derive(Clone)]
pub struct Credential {
    pub generation: u64,
    pub token: Arc<SecretString>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("generation", &self.generation)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

type RefreshOutcome = std::result::Result<Credential, Arc<String>>;
type InFlightRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

struct SessionInner<R> {
    token: RwLock<Arc<SecretString>>,
    generation: AtomicU64,
    refresher: R,
    in_flight: Mutex<Option<InFlightRefresh>>,
    refresh_count: AtomicU64,
    expired: watch::Sender<bool>,
}

/// Shared auth session. Clones share state.
pub struct AuthSession<R> {
    inner: Arc<SessionInner<R>>,
}

impl<R> Clone for AuthSession<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: TokenRefresher> AuthSession<R> {
    pub fn new(token: SecretString, refresher: R) -> Self {
        let (expired, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(SessionInner {
                token: RwLock::new(Arc::new(token)),
                generation: AtomicU64::new(0),
                refresher,
                in_flight: Mutex::new(None),
                refresh_count: AtomicU64::new(0),
                expired,
            }),
        }
    }

    pub fn current(&self) -> Credential {
        // Read the token under the lock so generation and token agree
        let token = self.inner.token.read();
        Credential {
            generation: self.inner.generation.load(Ordering::SeqCst),
            token: Arc::clone(&token),
        }
    }

    pub fn is_expired(&self) -> bool {
        *self.inner.expired.borrow()
    }

    /// Notified with `true` when the session can no longer be refreshed.
    pub fn on_session_expired(&self) -> watch::Receiver<bool> {
        self.inner.expired.subscribe()
    }

    /// Number of refreshes actually started.
    pub fn refresh_count(&self) -> u64 {
        self.inner.refresh_count.load(Ordering::SeqCst)
    }

    /// Get a token newer than `rejected`, refreshing at most once across
    /// all concurrent callers.
    pub async fn refresh_after(&self, rejected: &Credential) -> Result<Credential> {
        if self.is_expired() {
            return Err(SyncError::SessionExpired(
                "session already expired".to_string(),
            ));
        }

        let shared = {
            let mut slot = self.inner.in_flight.lock();

            let current = self.current();
            if current.generation > rejected.generation {
                // Someone else already refreshed past the rejected token
                return Ok(current);
            }

            match slot.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let fut = Self::run_refresh(Arc::clone(&self.inner)).boxed().shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };

        shared
            .await
            .map_err(|message| SyncError::SessionExpired(message.to_string()))
    }

    /// Mark the session as unusable and tell the owner.
    pub fn expire(&self, reason: &str) {
        Self::mark_expired(&self.inner, reason);
    }

    async fn run_refresh(inner: Arc<SessionInner<R>>) -> RefreshOutcome {
        inner.refresh_count.fetch_add(1, Ordering::SeqCst);
        tracing::info!("refreshing bearer token");

        let outcome = match inner.refresher.refresh().await {
            Ok(token) => {
                let mut slot = inner.token.write();
                *slot = Arc::new(token);
                let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(Credential {
                    generation,
                    token: Arc::clone(&slot),
                })
            }
            Err(e) => {
                let message = e.to_string();
                Self::mark_expired(&inner, &message);
                Err(Arc::new(message))
            }
        };

        inner.in_flight.lock().take();
        outcome
    }

    fn mark_expired(inner: &SessionInner<R>, reason: &str) {
        let newly = inner.expired.send_if_modified(|expired| {
            let changed = !*expired;
            *expired = true;
            changed
        });
        if newly {
            tracing::error!(reason, "auth session expired; sign-in required");
        }
    }
}

impl<R> std::fmt::Debug for AuthSession<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("generation", &self.inner.generation.load(Ordering::SeqCst))
            .field("expired", &*self.inner.expired.borrow())
            .finish()
    }
}
