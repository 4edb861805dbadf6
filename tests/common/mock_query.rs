//! Scriptable `TicketQuery` for driving the synchronizer in tests.
//!
//! Each call records the request and the (paused) tokio time it arrived,
//! asks the responder for a delay and an outcome, sleeps, then returns.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use civic_sync::error::{Result, SyncError};
use civic_sync::query::{FetchRequest, TicketPage, TicketQuery};
use civic_sync::types::{Ticket, TicketCategory, TicketPriority, TicketStatus};

type Responder = dyn Fn(&FetchRequest, usize) -> (Duration, Result<TicketPage>) + Send + Sync;

#[derive(Debug, Clone)]
pub struct Call {
    pub at: Instant,
    pub request: FetchRequest,
}

struct MockInner {
    calls: Mutex<Vec<Call>>,
    completed: AtomicUsize,
    respond: Box<Responder>,
}

/// Clones share the call log.
#[derive(Clone)]
pub struct MockQuery {
    inner: Arc<MockInner>,
}

impl MockQuery {
    /// `respond(request, call_index)` decides the delay and outcome of each call.
    pub fn new(
        respond: impl Fn(&FetchRequest, usize) -> (Duration, Result<TicketPage>)
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(MockInner {
                calls: Mutex::new(Vec::new()),
                completed: AtomicUsize::new(0),
                respond: Box::new(respond),
            }),
        }
    }

    /// Always answers immediately with `count` tickets.
    pub fn pages(count: usize) -> Self {
        Self::new(move |req, _| (Duration::ZERO, Ok(page_for(req, count))))
    }

    /// Always fails immediately with a network error.
    pub fn failing() -> Self {
        Self::new(|_, _| (Duration::ZERO, Err(network_error())))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.calls.lock().len()
    }

    /// Calls that ran to completion (not aborted).
    pub fn completed(&self) -> usize {
        self.inner.completed.load(Ordering::SeqCst)
    }
}

impl TicketQuery for MockQuery {
    async fn fetch(&self, request: &FetchRequest) -> Result<TicketPage> {
        let index = {
            let mut calls = self.inner.calls.lock();
            calls.push(Call {
                at: Instant::now(),
                request: request.clone(),
            });
            calls.len() - 1
        };

        let (delay, outcome) = (self.inner.respond)(request, index);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.inner.completed.fetch_add(1, Ordering::SeqCst);
        outcome
    }
}

pub fn network_error() -> SyncError {
    SyncError::Network("connection reset".to_string())
}

/// Tag identifying which filter snapshot a page was built for.
pub fn tag_for(request: &FetchRequest) -> String {
    request
        .filters
        .status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "all".to_string())
}

/// A page whose ticket ids carry the request's tag, e.g. `open-0`.
pub fn page_for(request: &FetchRequest, count: usize) -> TicketPage {
    let tag = tag_for(request);
    TicketPage {
        records: (0..count).map(|i| ticket(&format!("{tag}-{i}"))).collect(),
        page_count: 1,
        total_count: Some(count as u64),
    }
}

pub fn empty_page() -> TicketPage {
    TicketPage {
        records: Vec::new(),
        page_count: 0,
        total_count: Some(0),
    }
}

pub fn ticket(id: &str) -> Ticket {
    let ts: jiff::Timestamp = "2026-03-02T08:00:00Z".parse().unwrap();
    Ticket {
        id: id.to_string(),
        title: format!("Ticket {id}"),
        description: String::new(),
        status: TicketStatus::Open,
        category: TicketCategory::Roads,
        priority: TicketPriority::Medium,
        ward_id: Some(1),
        reporter: None,
        assignee: None,
        created_at: ts,
        updated_at: ts,
    }
}
