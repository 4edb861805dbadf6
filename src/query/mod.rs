//! Ticket query service contract.
//!
//! The synchronizer turns a `FilterState` snapshot into a `FetchRequest`
//! and hands it to a `TicketQuery`. The request is immutable once issued
//! and is what a completed fetch is correlated against.

pub mod http;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::filter::FilterState;
use crate::types::Ticket;

pub use http::{HttpTicketQuery, build_client};

/// Snapshot of the filter state at the moment a fetch was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchRequest {
    /// Monotonic per-synchronizer sequence number, for logging.
    pub seq: u64,
    pub filters: FilterState,
}

impl FetchRequest {
    pub fn new(seq: u64, filters: FilterState) -> Self {
        Self { seq, filters }
    }

    /// Whether this request still answers the given filter state.
    /// Compared by value; the sequence number plays no part.
    pub fn matches(&self, current: &FilterState) -> bool {
        self.filters == *current
    }

    /// Query-string pairs for this request. Absent filters are omitted.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let f = &self.filters;
        let mut pairs = Vec::with_capacity(8);

        if let Some(status) = f.status {
            pairs.push(("status", status.to_string()));
        }
        if let Some(category) = f.category {
            pairs.push(("category", category.to_string()));
        }
        if let Some(search) = f.search.as_deref()
            && !search.is_empty()
        {
            pairs.push(("search", search.to_string()));
        }
        if let Some(ward) = f.ward_id {
            pairs.push(("ward_id", ward.to_string()));
        }
        if let Some(field) = f.sort_field {
            pairs.push(("sort", field.to_string()));
            pairs.push(("order", f.sort_direction.to_string()));
        }
        pairs.push(("page", f.page_index.to_string()));
        pairs.push(("page_size", f.page_size.to_string()));
        pairs
    }
}

/// One page of tickets as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketPage {
    pub records: Vec<Ticket>,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

/// Common interface for ticket query backends
pub trait TicketQuery: Send + Sync + 'static {
    /// Fetch the page described by `request`
    fn fetch(
        &self,
        request: &FetchRequest,
    ) -> impl std::future::Future<Output = Result<TicketPage>> + Send;
}
