//! The list synchronizer.
//!
//! `ListSynchronizer` keeps one page of tickets in step with the backend.
//! It reacts to filter changes, push notifications, a periodic timer and
//! host visibility, retries failed fetches with exponential backoff, and
//! degrades to a fallback dataset when live data is unavailable.
//!
//! All mutable state lives in a single background task (see `worker`).
//! Callers talk to it through a `SyncHandle`: filter mutations go through
//! the shared `FilterStore`, results and status come back over `watch`
//! channels. Dropping the handle tears the task down.

mod worker;

use std::sync::Arc;
use std::time::Duration;

use jiff::Timestamp;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::backoff::BackoffScheduler;
use crate::config::SyncConfig;
use crate::error::{ErrorKind, Result, SyncError};
use crate::fallback::FallbackPolicy;
use crate::filter::{FilterStore, FilterUpdate, SortDirection, SortField};
use crate::push::PushChannel;
use crate::query::{FetchRequest, TicketQuery};
use crate::types::Ticket;
use crate::visibility::VisibilityMonitor;

use worker::Worker;

/// Default periodic refresh interval while visible.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Where a published page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncSource {
    Live,
    Fallback,
}

crate::enum_display!(SyncSource, {
    Live => "live",
    Fallback => "fallback",
});

/// A published page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncResult {
    pub records: Vec<Ticket>,
    pub page_count: u32,
    pub total_count: Option<u64>,
    pub source: SyncSource,
    pub as_of: Timestamp,
    /// The request this page answers.
    pub request: FetchRequest,
}

impl SyncResult {
    pub fn is_fallback(&self) -> bool {
        self.source == SyncSource::Fallback
    }
}

/// Where the synchronizer is in its fetch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    Fetching,
    RetryPending,
    Fallback,
}

crate::enum_display!(SyncPhase, {
    Idle => "idle",
    Fetching => "fetching",
    RetryPending => "retry_pending",
    Fallback => "fallback",
});

/// Consecutive-failure bookkeeping.
///
/// Reset on success, on any filter change and after falling back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RetryState {
    pub attempt: u32,
    pub last_error: Option<ErrorKind>,
    pub next_delay_ms: u64,
}

/// Push channel health, independent of fetch outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub last_updated: Option<Timestamp>,
}

/// Everything a view needs to render the sync indicator.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SyncStatus {
    pub connected: bool,
    pub last_updated: Option<Timestamp>,
    /// "Retrying in Ns…" while a retry is scheduled.
    pub retry_message: Option<String>,
    pub retry_deadline: Option<Timestamp>,
    pub phase: SyncPhase,
    pub retry: RetryState,
    /// The auth session could not be refreshed; sign-in is required.
    pub session_expired: bool,
}

impl SyncStatus {
    pub fn connection(&self) -> ConnectionStatus {
        ConnectionStatus {
            connected: self.connected,
            last_updated: self.last_updated,
        }
    }
}

#[derive(Debug)]
enum SyncCommand {
    RetryNow,
    Shutdown,
}

/// Builder for a running synchronizer.
pub struct ListSynchronizer<Q, F> {
    query: Arc<Q>,
    fallback: F,
    filters: FilterStore,
    push: Arc<dyn PushChannel>,
    visibility: Arc<dyn VisibilityMonitor>,
    backoff: BackoffScheduler,
    poll_interval: Duration,
}

impl<Q: TicketQuery, F: FallbackPolicy> ListSynchronizer<Q, F> {
    pub fn new(
        query: Q,
        fallback: F,
        filters: FilterStore,
        push: Arc<dyn PushChannel>,
        visibility: Arc<dyn VisibilityMonitor>,
    ) -> Self {
        Self {
            query: Arc::new(query),
            fallback,
            filters,
            push,
            visibility,
            backoff: BackoffScheduler::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Apply retry and polling settings from configuration.
    pub fn with_config(self, config: &SyncConfig) -> Self {
        self.with_backoff(BackoffScheduler::from_config(config))
            .with_poll_interval(config.poll_interval())
    }

    pub fn with_backoff(mut self, backoff: BackoffScheduler) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        // A zero period would make the interval panic
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Start the background task and issue the initial fetch.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> SyncHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (page_tx, page_rx) = watch::channel(None);
        let (status_tx, status_rx) = watch::channel(SyncStatus::default());

        let filters = self.filters.clone();
        let worker = Worker::new(self, command_rx, page_tx, status_tx);
        let task = tokio::spawn(worker.run());

        SyncHandle {
            filters,
            commands: command_tx,
            page_rx,
            status_rx,
            task: Some(task),
        }
    }
}

/// Caller side of a running synchronizer.
pub struct SyncHandle {
    filters: FilterStore,
    commands: mpsc::UnboundedSender<SyncCommand>,
    page_rx: watch::Receiver<Option<SyncResult>>,
    status_rx: watch::Receiver<SyncStatus>,
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Most recently published page, if any.
    pub fn current_page(&self) -> Option<SyncResult> {
        self.page_rx.borrow().clone()
    }

    pub fn status(&self) -> SyncStatus {
        self.status_rx.borrow().clone()
    }

    /// Receiver notified on every published page.
    pub fn subscribe(&self) -> watch::Receiver<Option<SyncResult>> {
        self.page_rx.clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status_rx.clone()
    }

    pub fn filters(&self) -> &FilterStore {
        &self.filters
    }

    pub fn update_filter(&self, update: FilterUpdate) -> bool {
        self.filters.update_filter(update)
    }

    pub fn reset_filters(&self) -> bool {
        self.filters.reset_filters()
    }

    pub fn change_page(&self, page_index: u32) -> bool {
        self.filters.change_page(page_index)
    }

    pub fn change_sort(&self, field: SortField, direction: Option<SortDirection>) -> bool {
        self.filters.change_sort(field, direction)
    }

    /// Fetch now, skipping any scheduled retry delay.
    pub fn retry_now(&self) -> Result<()> {
        self.commands
            .send(SyncCommand::RetryNow)
            .map_err(|_| SyncError::Closed)
    }

    /// Stop the synchronizer and wait until its resources are released.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(SyncCommand::Shutdown);
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
            && e.is_panic()
        {
            tracing::error!("synchronizer task panicked: {e}");
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for SyncHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHandle")
            .field("status", &*self.status_rx.borrow())
            .field("running", &self.task.is_some())
            .finish()
    }
}
