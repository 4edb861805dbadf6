//! Filter, sort and page selection for the ticket list.
//!
//! `FilterState` is the single source of truth for "what the user asked to
//! see". It is owned by a `FilterStore`, which is the only place it can be
//! mutated. Every mutation goes through `FilterStore::update_filter`, which
//! enforces the page reset rule: changing anything other than the page
//! index returns the view to the first page.

pub mod sort;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::error::{Result, SyncError};
use crate::types::{TicketCategory, TicketStatus};

pub use sort::{SortDirection, SortField, sort_tickets_by};

/// Default page size when none is configured
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// The user-controlled query parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FilterState {
    pub status: Option<TicketStatus>,
    pub category: Option<TicketCategory>,
    pub search: Option<String>,
    pub ward_id: Option<u32>,
    pub sort_field: Option<SortField>,
    pub sort_direction: SortDirection,
    pub page_index: u32,
    pub page_size: u32,
}

impl FilterState {
    /// The reset state: first page, newest first, no filters.
    pub fn defaults(page_size: u32, ward_scope: Option<u32>) -> Self {
        Self {
            status: None,
            category: None,
            search: None,
            ward_id: ward_scope,
            sort_field: Some(SortField::CreatedAt),
            sort_direction: SortDirection::Desc,
            page_index: 0,
            page_size: page_size.max(1),
        }
    }

    /// Apply one update, returning whether anything changed.
    ///
    /// Any key other than `page_index` resets `page_index` to 0, even when
    /// the key's own value is unchanged or ignored.
    fn apply(&mut self, update: FilterUpdate, ward_scope: Option<u32>) -> bool {
        let before = self.clone();
        let key = update.key();

        match update {
            FilterUpdate::Status(v) => self.status = v,
            FilterUpdate::Category(v) => self.category = v,
            FilterUpdate::Search(v) => {
                self.search = v.filter(|s| !s.trim().is_empty());
            }
            FilterUpdate::WardId(v) => {
                // A fixed scope cannot be changed by the user
                if ward_scope.is_none() {
                    self.ward_id = v;
                }
            }
            FilterUpdate::SortField(v) => self.sort_field = v,
            FilterUpdate::SortDirection(v) => self.sort_direction = v,
            FilterUpdate::PageIndex(v) => self.page_index = v,
            FilterUpdate::PageSize(v) => self.page_size = v.max(1),
        }

        if key != FilterKey::PageIndex {
            self.page_index = 0;
        }

        *self != before
    }
}

impl Default for FilterState {
    fn default() -> Self {
        Self::defaults(DEFAULT_PAGE_SIZE, None)
    }
}

/// Names of the mutable fields of `FilterState`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKey {
    Status,
    Category,
    Search,
    WardId,
    SortField,
    SortDirection,
    PageIndex,
    PageSize,
}

crate::enum_display_fromstr!(FilterKey, SyncError::InvalidFilterKey, {
    Status => "status",
    Category => "category",
    Search => "search",
    WardId => "ward_id",
    SortField => "sort_field",
    SortDirection => "sort_direction",
    PageIndex => "page_index",
    PageSize => "page_size",
});

/// A typed `(key, value)` pair for `FilterStore::update_filter`.
///
/// `None` (or an empty search string) clears the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterUpdate {
    Status(Option<TicketStatus>),
    Category(Option<TicketCategory>),
    Search(Option<String>),
    WardId(Option<u32>),
    SortField(Option<SortField>),
    SortDirection(SortDirection),
    PageIndex(u32),
    PageSize(u32),
}

impl FilterUpdate {
    pub fn key(&self) -> FilterKey {
        match self {
            FilterUpdate::Status(_) => FilterKey::Status,
            FilterUpdate::Category(_) => FilterKey::Category,
            FilterUpdate::Search(_) => FilterKey::Search,
            FilterUpdate::WardId(_) => FilterKey::WardId,
            FilterUpdate::SortField(_) => FilterKey::SortField,
            FilterUpdate::SortDirection(_) => FilterKey::SortDirection,
            FilterUpdate::PageIndex(_) => FilterKey::PageIndex,
            FilterUpdate::PageSize(_) => FilterKey::PageSize,
        }
    }

    /// Build an update from string key and value, as typed on a command line
    /// or received from a query string. An empty value clears optional keys.
    pub fn parse(key: &str, value: &str) -> Result<Self> {
        let key: FilterKey = key.parse()?;
        let value = value.trim();
        let opt = |v: &str| (!v.is_empty()).then(|| v.to_string());
        let number = |v: &str| {
            v.parse::<u32>()
                .map_err(|e| SyncError::Other(format!("invalid number '{v}' for {key}: {e}")))
        };

        Ok(match key {
            FilterKey::Status => FilterUpdate::Status(opt(value).map(|v| v.parse()).transpose()?),
            FilterKey::Category => {
                FilterUpdate::Category(opt(value).map(|v| v.parse()).transpose()?)
            }
            FilterKey::Search => FilterUpdate::Search(opt(value)),
            FilterKey::WardId => FilterUpdate::WardId(opt(value).map(|v| number(&v)).transpose()?),
            FilterKey::SortField => {
                FilterUpdate::SortField(opt(value).map(|v| v.parse()).transpose()?)
            }
            FilterKey::SortDirection => FilterUpdate::SortDirection(value.parse()?),
            FilterKey::PageIndex => FilterUpdate::PageIndex(number(value)?),
            FilterKey::PageSize => FilterUpdate::PageSize(number(value)?),
        })
    }
}

struct FilterInner {
    tx: watch::Sender<FilterState>,
    page_size: u32,
    ward_scope: Option<u32>,
}

/// Owner of the `FilterState`.
///
/// Cheap to clone; all clones share the same state. Subscribers receive a
/// notification only when a mutation actually changes the state.
#[derive(Clone)]
pub struct FilterStore {
    inner: Arc<FilterInner>,
}

impl FilterStore {
    pub fn new(page_size: u32, ward_scope: Option<u32>) -> Self {
        let (tx, _rx) = watch::channel(FilterState::defaults(page_size, ward_scope));
        Self {
            inner: Arc::new(FilterInner {
                tx,
                page_size: page_size.max(1),
                ward_scope,
            }),
        }
    }

    /// Build a store from the synchronizer configuration
    pub fn from_config(config: &crate::config::SyncConfig) -> Self {
        Self::new(config.page_size, config.ward_scope)
    }

    /// Current state by value
    pub fn snapshot(&self) -> FilterState {
        self.inner.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FilterState> {
        self.inner.tx.subscribe()
    }

    pub fn ward_scope(&self) -> Option<u32> {
        self.inner.ward_scope
    }

    /// Set one field. Returns whether the state changed.
    pub fn update_filter(&self, update: FilterUpdate) -> bool {
        self.update_many([update])
    }

    /// Apply several updates as one change, notifying subscribers once.
    pub fn update_many(&self, updates: impl IntoIterator<Item = FilterUpdate>) -> bool {
        let scope = self.inner.ward_scope;
        let updates: Vec<FilterUpdate> = updates.into_iter().collect();
        self.inner.tx.send_if_modified(|state| {
            let mut changed = false;
            for update in updates {
                changed |= state.apply(update, scope);
            }
            changed
        })
    }

    /// Restore defaults, keeping the fixed ward scope.
    pub fn reset_filters(&self) -> bool {
        let defaults = FilterState::defaults(self.inner.page_size, self.inner.ward_scope);
        self.inner.tx.send_if_modified(|state| {
            if *state == defaults {
                return false;
            }
            *state = defaults;
            true
        })
    }

    pub fn change_page(&self, page_index: u32) -> bool {
        self.update_filter(FilterUpdate::PageIndex(page_index))
    }

    /// Sort by `field`. With no explicit direction, re-selecting the current
    /// field flips the direction and a new field starts descending.
    pub fn change_sort(&self, field: SortField, direction: Option<SortDirection>) -> bool {
        let current = self.snapshot();
        let direction = direction.unwrap_or_else(|| {
            if current.sort_field == Some(field) {
                current.sort_direction.toggle()
            } else {
                SortDirection::Desc
            }
        });
        self.update_many([
            FilterUpdate::SortField(Some(field)),
            FilterUpdate::SortDirection(direction),
        ])
    }
}

impl Default for FilterStore {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE, None)
    }
}

impl std::fmt::Debug for FilterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterStore")
            .field("state", &*self.inner.tx.borrow())
            .field("ward_scope", &self.inner.ward_scope)
            .finish()
    }
}
