//! Sort fields and ordering for ticket lists.
//!
//! The backend applies sorting for live pages; these functions sort the
//! fallback dataset the same way so a degraded page still honors the
//! user's sort selection.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::types::Ticket;

/// Sort field for ticket listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Priority,
    Status,
    Title,
}

impl SortField {
    /// All valid string representations of this enum.
    pub const ALL_STRINGS: &[&str] = &["created_at", "updated_at", "priority", "status", "title"];
}

crate::enum_display_fromstr!(SortField, SyncError::InvalidSortField, {
    CreatedAt => "created_at",
    UpdatedAt => "updated_at",
    Priority => "priority",
    Status => "status",
    Title => "title",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn toggle(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

crate::enum_display_fromstr!(SortDirection, SyncError::InvalidSortDirection, {
    Asc => "asc",
    Desc => "desc",
});

fn compare(a: &Ticket, b: &Ticket, field: SortField) -> Ordering {
    match field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::Priority => a.priority.rank().cmp(&b.priority.rank()),
        SortField::Status => a.status.to_string().cmp(&b.status.to_string()),
        SortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
    }
}

/// Sort tickets by the given field and direction, breaking ties by ID so
/// the order is deterministic.
pub fn sort_tickets_by(tickets: &mut [Ticket], field: SortField, direction: SortDirection) {
    tickets.sort_by(|a, b| {
        let ord = compare(a, b, field).then_with(|| a.id.cmp(&b.id));
        match direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });
}
