//! Synchronizer event loop.
//!
//! One task owns every piece of mutable sync state. Each trigger is a
//! branch of a single `select!`, so a transition always runs to completion
//! before the next one starts and no locks are needed. The only suspended
//! work is the fetch itself (a spawned task, aborted when superseded) and
//! the retry deadline (a `sleep_until` that is simply not polled once
//! cleared).

use std::sync::Arc;
use std::time::Duration;

use jiff::{SignedDuration, Timestamp};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::backoff::{Backoff, BackoffScheduler};
use crate::error::{Result, SyncError};
use crate::fallback::{FallbackPolicy, FallbackTrigger};
use crate::filter::FilterState;
use crate::push::{PushChannel, PushEvent, PushSubscription};
use crate::query::{FetchRequest, TicketPage, TicketQuery};

use super::{ListSynchronizer, SyncCommand, SyncPhase, SyncResult, SyncSource, SyncStatus};

/// What asked for a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Initial,
    FilterChange,
    Push,
    Tick,
    BecameVisible,
    RetryNow,
    RetryTimer,
    FollowUp,
}

crate::enum_display!(Trigger, {
    Initial => "initial",
    FilterChange => "filter_change",
    Push => "push",
    Tick => "tick",
    BecameVisible => "became_visible",
    RetryNow => "retry_now",
    RetryTimer => "retry_timer",
    FollowUp => "follow_up",
});

/// The fetch currently in flight. Dropping it aborts the request.
struct InFlight {
    request: FetchRequest,
    handle: JoinHandle<Result<TicketPage>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub(super) struct Worker<Q, F> {
    query: Arc<Q>,
    fallback: F,
    backoff: BackoffScheduler,

    filters: watch::Receiver<FilterState>,
    commands: mpsc::UnboundedReceiver<SyncCommand>,

    push: Arc<dyn PushChannel>,
    push_tx: mpsc::UnboundedSender<PushEvent>,
    push_rx: mpsc::UnboundedReceiver<PushEvent>,
    subscription: Option<PushSubscription>,

    visibility: watch::Receiver<bool>,
    /// False once the visibility source has gone away.
    visibility_live: bool,
    visible: bool,
    poll: Interval,

    seq: u64,
    in_flight: Option<InFlight>,
    /// A trigger arrived while the current snapshot was already being fetched.
    follow_up: bool,
    retry_at: Option<Instant>,

    status: SyncStatus,
    page_tx: watch::Sender<Option<SyncResult>>,
    status_tx: watch::Sender<SyncStatus>,
}

impl<Q: TicketQuery, F: FallbackPolicy> Worker<Q, F> {
    pub(super) fn new(
        parts: ListSynchronizer<Q, F>,
        commands: mpsc::UnboundedReceiver<SyncCommand>,
        page_tx: watch::Sender<Option<SyncResult>>,
        status_tx: watch::Sender<SyncStatus>,
    ) -> Self {
        let mut visibility = parts.visibility.on_visibility_change();
        let visible = *visibility.borrow_and_update();

        // First tick one full period after start; the initial fetch covers now
        let period = parts.poll_interval;
        let mut poll = time::interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let (push_tx, push_rx) = mpsc::unbounded_channel();

        Self {
            query: parts.query,
            fallback: parts.fallback,
            backoff: parts.backoff,
            filters: parts.filters.subscribe(),
            commands,
            push: parts.push,
            push_tx,
            push_rx,
            subscription: None,
            visibility,
            visibility_live: true,
            visible,
            poll,
            seq: 0,
            in_flight: None,
            follow_up: false,
            retry_at: None,
            status: SyncStatus::default(),
            page_tx,
            status_tx,
        }
    }

    pub(super) async fn run(mut self) {
        self.status.connected = self.push.is_connected();
        if self.visible {
            self.open_subscription();
        }
        self.filters.borrow_and_update();
        self.start_fetch(Trigger::Initial);

        loop {
            let retry_at = self.retry_at;
            let fetching = self.in_flight.is_some();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SyncCommand::RetryNow) => self.on_trigger(Trigger::RetryNow),
                    Some(SyncCommand::Shutdown) | None => break,
                },
                changed = self.filters.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.filters.borrow_and_update();
                    self.on_trigger(Trigger::FilterChange);
                }
                Some(event) = self.push_rx.recv() => self.on_push(event),
                changed = self.visibility.changed(), if self.visibility_live => match changed {
                    Ok(()) => {
                        let visible = *self.visibility.borrow_and_update();
                        self.on_visibility(visible);
                    }
                    Err(_) => {
                        tracing::debug!("visibility source closed; keeping last state");
                        self.visibility_live = false;
                    }
                },
                _ = self.poll.tick(), if self.visible => self.on_trigger(Trigger::Tick),
                _ = time::sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    self.retry_at = None;
                    self.on_trigger(Trigger::RetryTimer);
                }
                joined = join(&mut self.in_flight), if fetching => self.on_settled(joined),
            }
        }

        self.teardown();
    }

    fn on_trigger(&mut self, trigger: Trigger) {
        if self.status.session_expired {
            tracing::debug!(%trigger, "session expired; ignoring trigger");
            return;
        }

        match trigger {
            Trigger::FilterChange => {
                self.reset_retry();
                self.follow_up = false;
                self.start_fetch(trigger);
            }
            Trigger::RetryNow | Trigger::RetryTimer => {
                self.clear_retry_schedule();
                if self.in_flight.is_some() {
                    self.follow_up = true;
                } else {
                    self.start_fetch(trigger);
                }
            }
            Trigger::Initial
            | Trigger::Push
            | Trigger::Tick
            | Trigger::BecameVisible
            | Trigger::FollowUp => {
                if self.retry_at.is_some() {
                    tracing::debug!(%trigger, "retry pending; trigger absorbed");
                } else if self.in_flight.is_some() {
                    tracing::debug!(%trigger, "fetch in flight; coalescing");
                    self.follow_up = true;
                } else {
                    self.start_fetch(trigger);
                }
            }
        }
    }

    fn start_fetch(&mut self, trigger: Trigger) {
        let filters = self.filters.borrow().clone();
        self.seq += 1;
        let request = FetchRequest::new(self.seq, filters);

        if let Some(previous) = self.in_flight.take() {
            tracing::debug!(
                superseded = previous.request.seq,
                seq = request.seq,
                "aborting superseded fetch"
            );
        }
        self.clear_retry_schedule();

        let query = Arc::clone(&self.query);
        let owned = request.clone();
        let handle = tokio::spawn(async move { query.fetch(&owned).await });

        tracing::debug!(seq = request.seq, %trigger, "fetch started");
        self.in_flight = Some(InFlight { request, handle });
        self.status.phase = SyncPhase::Fetching;
        self.publish_status();
    }

    fn on_settled(&mut self, joined: std::result::Result<Result<TicketPage>, JoinError>) {
        let Some(fetch) = self.in_flight.take() else {
            return;
        };

        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => return,
            Err(e) => Err(SyncError::Other(format!("fetch task failed: {e}"))),
        };

        if !fetch.request.matches(&self.filters.borrow()) {
            // The pending filter notification starts the replacement fetch
            tracing::debug!(seq = fetch.request.seq, "discarding stale response");
            return;
        }

        match outcome {
            Ok(page) if !page.records.is_empty() => self.publish_live(&fetch.request, page),
            Ok(_) => self.publish_fallback(&fetch.request, FallbackTrigger::EmptyResult),
            Err(e) if e.is_session_fatal() => {
                self.on_session_expired(&e);
                return;
            }
            Err(e) => {
                if self.schedule_retry(&fetch.request, &e) {
                    return;
                }
                self.publish_fallback(&fetch.request, FallbackTrigger::Exhausted(e.kind()));
            }
        }

        if std::mem::take(&mut self.follow_up) {
            self.on_trigger(Trigger::FollowUp);
        }
    }

    /// Returns true when a retry was scheduled, false when retries are spent.
    fn schedule_retry(&mut self, request: &FetchRequest, error: &SyncError) -> bool {
        let retry = &mut self.status.retry;
        retry.attempt += 1;
        retry.last_error = Some(error.kind());
        let attempt = retry.attempt;

        match self.backoff.delay_for(attempt - 1) {
            Backoff::Retry(delay) => {
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                retry.next_delay_ms = delay_ms;

                tracing::warn!(
                    seq = request.seq,
                    attempt,
                    delay_ms,
                    kind = %error.kind(),
                    "fetch failed: {error}; retrying"
                );

                self.retry_at = Some(Instant::now() + delay);
                // Pending triggers are answered by the retry
                self.follow_up = false;
                self.status.retry_message = Some(retry_message(delay));
                self.status.retry_deadline = SignedDuration::try_from(delay)
                    .ok()
                    .and_then(|d| Timestamp::now().checked_add(d).ok());
                self.status.phase = SyncPhase::RetryPending;
                self.publish_status();
                true
            }
            Backoff::Stop => {
                tracing::warn!(
                    seq = request.seq,
                    attempts = attempt,
                    kind = %error.kind(),
                    "fetch failed: {error}; retries exhausted"
                );
                false
            }
        }
    }

    fn publish_live(&mut self, request: &FetchRequest, page: TicketPage) {
        let now = Timestamp::now();
        tracing::debug!(
            seq = request.seq,
            records = page.records.len(),
            "publishing live page"
        );

        self.page_tx.send_replace(Some(SyncResult {
            records: page.records,
            page_count: page.page_count,
            total_count: page.total_count,
            source: SyncSource::Live,
            as_of: now,
            request: request.clone(),
        }));

        self.reset_retry();
        self.status.last_updated = Some(now);
        self.status.phase = SyncPhase::Idle;
        self.publish_status();
    }

    fn publish_fallback(&mut self, request: &FetchRequest, trigger: FallbackTrigger) {
        match trigger {
            FallbackTrigger::EmptyResult => {
                tracing::info!(seq = request.seq, "empty result; showing fallback data")
            }
            FallbackTrigger::Exhausted(kind) => {
                tracing::warn!(seq = request.seq, %kind, "live data unavailable; showing fallback data")
            }
        }

        let page = self.fallback.fallback(request, trigger);
        self.page_tx.send_replace(Some(SyncResult {
            records: page.records,
            page_count: page.page_count,
            total_count: page.total_count,
            source: SyncSource::Fallback,
            as_of: Timestamp::now(),
            request: request.clone(),
        }));

        self.reset_retry();
        self.status.phase = SyncPhase::Fallback;
        self.publish_status();
    }

    fn on_session_expired(&mut self, error: &SyncError) {
        tracing::error!("{error}; stopping fetches until sign-in");
        self.reset_retry();
        self.follow_up = false;
        self.status.session_expired = true;
        self.status.phase = SyncPhase::Idle;
        self.publish_status();
    }

    fn on_push(&mut self, event: PushEvent) {
        self.status.last_updated = Some(Timestamp::now());
        match event {
            PushEvent::Changed => {
                if self.visible {
                    self.on_trigger(Trigger::Push);
                } else {
                    tracing::debug!("hidden; ignoring push notification");
                }
            }
            PushEvent::ConnectionChanged(connected) => {
                tracing::info!(connected, "push connection changed");
                self.status.connected = connected;
            }
        }
        self.publish_status();
    }

    fn on_visibility(&mut self, visible: bool) {
        if visible == self.visible {
            return;
        }
        self.visible = visible;

        if visible {
            tracing::debug!("visible; resuming refresh");
            self.open_subscription();
            // Restart the period from now so missed ticks are not replayed
            self.poll.reset();
            self.on_trigger(Trigger::BecameVisible);
        } else {
            tracing::debug!("hidden; pausing refresh");
            if let Some(subscription) = self.subscription.take() {
                subscription.release();
            }
        }
    }

    fn open_subscription(&mut self) {
        if self.subscription.is_none() {
            self.subscription = Some(PushSubscription::open(
                Arc::clone(&self.push),
                self.push_tx.clone(),
            ));
            self.status.connected = self.push.is_connected();
        }
        self.publish_status();
    }

    fn clear_retry_schedule(&mut self) {
        self.retry_at = None;
        self.status.retry_message = None;
        self.status.retry_deadline = None;
    }

    fn reset_retry(&mut self) {
        self.clear_retry_schedule();
        self.status.retry = Default::default();
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(self.status.clone());
    }

    fn teardown(&mut self) {
        if let Some(fetch) = self.in_flight.take() {
            tracing::debug!(seq = fetch.request.seq, "aborting fetch on shutdown");
        }
        if let Some(subscription) = self.subscription.take() {
            subscription.release();
        }
        self.retry_at = None;
        tracing::debug!("synchronizer stopped");
    }
}

async fn join(
    in_flight: &mut Option<InFlight>,
) -> std::result::Result<Result<TicketPage>, JoinError> {
    match in_flight {
        Some(fetch) => (&mut fetch.handle).await,
        None => std::future::pending().await,
    }
}

fn retry_message(delay: Duration) -> String {
    let secs = delay.as_millis().div_ceil(1000);
    format!("Retrying in {secs}s…")
}
