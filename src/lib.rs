#[macro_use]
mod macros;

pub mod auth;
pub mod backoff;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod fallback;
pub mod filter;
pub mod push;
pub mod query;
pub mod sync;
pub mod types;
pub mod visibility;

#[cfg(test)]
mod test_guards;

pub use auth::{AuthSession, HttpTokenRefresher, StaticToken, TokenRefresher};
pub use backoff::{Backoff, BackoffScheduler, MAX_RETRIES};
pub use config::{Config, SyncConfig};
pub use error::{ErrorKind, Result, SyncError};
pub use fallback::{CannedFallback, FallbackPolicy, FallbackTrigger};
pub use filter::{FilterState, FilterStore, FilterUpdate, SortDirection, SortField};
pub use push::{BroadcastPushChannel, PushChannel, PushEvent, PushSubscription};
pub use query::{FetchRequest, HttpTicketQuery, TicketPage, TicketQuery};
pub use sync::{
    ConnectionStatus, ListSynchronizer, RetryState, SyncHandle, SyncPhase, SyncResult, SyncSource,
    SyncStatus,
};
pub use types::{Ticket, TicketCategory, TicketPriority, TicketStatus};
pub use visibility::{AlwaysVisible, ManualVisibility, VisibilityMonitor};
