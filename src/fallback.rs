//! Degraded-mode dataset.
//!
//! When live data cannot be had (retries exhausted) or the backend answers
//! with nothing, the synchronizer shows a small fixed set of representative
//! tickets instead of an empty list. The set is narrowed by the request's
//! filters where it can be, but the fallback view is never empty: if the
//! filters exclude every canned ticket, the unfiltered set is shown.

use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use jiff::Timestamp;

use crate::error::ErrorKind;
use crate::filter::{FilterState, sort_tickets_by};
use crate::query::{FetchRequest, TicketPage};
use crate::types::{Ticket, TicketCategory, TicketPriority, TicketStatus};

/// Why the synchronizer fell back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackTrigger {
    /// Every retry failed; carries the kind of the last error.
    Exhausted(ErrorKind),
    /// The backend succeeded with zero records.
    EmptyResult,
}

impl std::fmt::Display for FallbackTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackTrigger::Exhausted(kind) => write!(f, "retries exhausted ({kind})"),
            FallbackTrigger::EmptyResult => write!(f, "empty result"),
        }
    }
}

pub trait FallbackPolicy: Send + Sync + 'static {
    /// Produce a page to show for `request`. Must be deterministic and must
    /// not be empty unless the policy itself holds no records.
    fn fallback(&self, request: &FetchRequest, trigger: FallbackTrigger) -> TicketPage;
}

/// Fixed set of municipal tickets.
#[derive(Debug, Clone)]
pub struct CannedFallback {
    tickets: Vec<Ticket>,
}

impl CannedFallback {
    pub fn new() -> Self {
        Self {
            tickets: canned_tickets(),
        }
    }

    /// Use a custom record set (tests, localized deployments).
    pub fn with_tickets(tickets: Vec<Ticket>) -> Self {
        Self { tickets }
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    fn select(&self, filters: &FilterState) -> Vec<Ticket> {
        let matcher = SkimMatcherV2::default().smart_case();
        let search = filters.search.as_deref().map(str::trim).unwrap_or("");

        self.tickets
            .iter()
            .filter(|t| filters.status.is_none_or(|s| t.status == s))
            .filter(|t| filters.category.is_none_or(|c| t.category == c))
            .filter(|t| filters.ward_id.is_none_or(|w| t.ward_id == Some(w)))
            .filter(|t| {
                search.is_empty() || {
                    let haystack = format!("{} {}", t.id, t.title);
                    matcher.fuzzy_match(&haystack, search).is_some()
                }
            })
            .cloned()
            .collect()
    }
}

impl Default for CannedFallback {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackPolicy for CannedFallback {
    fn fallback(&self, request: &FetchRequest, trigger: FallbackTrigger) -> TicketPage {
        let filters = &request.filters;
        let mut selected = self.select(filters);
        if selected.is_empty() {
            tracing::debug!(seq = request.seq, "filters exclude all canned tickets; showing full set");
            selected = self.tickets.clone();
        }

        if let Some(field) = filters.sort_field {
            sort_tickets_by(&mut selected, field, filters.sort_direction);
        }

        let page_size = filters.page_size.max(1) as usize;
        let total = selected.len();
        let page_count = total.div_ceil(page_size).max(1);
        // Past the end, show the last page rather than nothing
        let page_index = (filters.page_index as usize).min(page_count - 1);

        let records: Vec<Ticket> = selected
            .into_iter()
            .skip(page_index * page_size)
            .take(page_size)
            .collect();

        tracing::debug!(
            seq = request.seq,
            %trigger,
            records = records.len(),
            "serving fallback page"
        );

        TicketPage {
            records,
            page_count: page_count as u32,
            total_count: Some(total as u64),
        }
    }
}

/// 2026-03-02T08:00:00Z
const CANNED_EPOCH: i64 = 1_772_438_400;
const HOUR: i64 = 3600;

struct Canned {
    id: &'static str,
    title: &'static str,
    description: &'static str,
    status: TicketStatus,
    category: TicketCategory,
    priority: TicketPriority,
    ward_id: u32,
    assignee: Option<&'static str>,
    created_hours: i64,
    updated_hours: i64,
}

const CANNED: &[Canned] = &[
    Canned {
        id: "CS-1001",
        title: "Pothole on Main St near 5th Ave",
        description: "Deep pothole in the eastbound lane, damaging tires.",
        status: TicketStatus::Open,
        category: TicketCategory::Roads,
        priority: TicketPriority::High,
        ward_id: 1,
        assignee: None,
        created_hours: 0,
        updated_hours: 0,
    },
    Canned {
        id: "CS-1002",
        title: "Streetlight out on Elm Court",
        description: "Light pole 14 has been dark for three nights.",
        status: TicketStatus::InProgress,
        category: TicketCategory::Lighting,
        priority: TicketPriority::Medium,
        ward_id: 2,
        assignee: Some("public-works"),
        created_hours: 3,
        updated_hours: 20,
    },
    Canned {
        id: "CS-1003",
        title: "Missed recycling pickup",
        description: "Blue bins on Oak Row were not collected on Tuesday.",
        status: TicketStatus::Resolved,
        category: TicketCategory::Waste,
        priority: TicketPriority::Low,
        ward_id: 3,
        assignee: Some("sanitation"),
        created_hours: 6,
        updated_hours: 30,
    },
    Canned {
        id: "CS-1004",
        title: "Water main leak at Harbor Rd",
        description: "Water pooling across the sidewalk and bubbling from the curb.",
        status: TicketStatus::Open,
        category: TicketCategory::Water,
        priority: TicketPriority::Urgent,
        ward_id: 1,
        assignee: None,
        created_hours: 9,
        updated_hours: 9,
    },
    Canned {
        id: "CS-1005",
        title: "Broken swing in Riverside Park",
        description: "Chain snapped on the west playground swing set.",
        status: TicketStatus::InProgress,
        category: TicketCategory::Parks,
        priority: TicketPriority::Medium,
        ward_id: 4,
        assignee: Some("parks-dept"),
        created_hours: 12,
        updated_hours: 40,
    },
    Canned {
        id: "CS-1006",
        title: "Late-night construction noise",
        description: "Jackhammering after 11pm on Birch Lane.",
        status: TicketStatus::Closed,
        category: TicketCategory::Noise,
        priority: TicketPriority::Low,
        ward_id: 2,
        assignee: Some("code-enforcement"),
        created_hours: 15,
        updated_hours: 50,
    },
    Canned {
        id: "CS-1007",
        title: "Faded crosswalk at school zone",
        description: "Paint on the Lincoln Elementary crosswalk is barely visible.",
        status: TicketStatus::Open,
        category: TicketCategory::Roads,
        priority: TicketPriority::High,
        ward_id: 3,
        assignee: None,
        created_hours: 18,
        updated_hours: 18,
    },
    Canned {
        id: "CS-1008",
        title: "Overflowing litter bin at bus stop",
        description: "Bin at the Central Station stop overflows every weekend.",
        status: TicketStatus::Open,
        category: TicketCategory::Waste,
        priority: TicketPriority::Medium,
        ward_id: 4,
        assignee: None,
        created_hours: 21,
        updated_hours: 21,
    },
    Canned {
        id: "CS-1009",
        title: "Flickering lights in Maple tunnel",
        description: "Pedestrian tunnel lighting flickers and is partly dark.",
        status: TicketStatus::Open,
        category: TicketCategory::Lighting,
        priority: TicketPriority::High,
        ward_id: 1,
        assignee: None,
        created_hours: 24,
        updated_hours: 26,
    },
    Canned {
        id: "CS-1010",
        title: "Low water pressure on Cedar Hill",
        description: "Several households report weak pressure since Monday.",
        status: TicketStatus::InProgress,
        category: TicketCategory::Water,
        priority: TicketPriority::Medium,
        ward_id: 2,
        assignee: Some("water-utility"),
        created_hours: 27,
        updated_hours: 33,
    },
    Canned {
        id: "CS-1011",
        title: "Fallen tree blocking path",
        description: "Storm-felled oak across the greenway trail near the footbridge.",
        status: TicketStatus::Resolved,
        category: TicketCategory::Parks,
        priority: TicketPriority::Urgent,
        ward_id: 3,
        assignee: Some("parks-dept"),
        created_hours: 30,
        updated_hours: 36,
    },
    Canned {
        id: "CS-1012",
        title: "Abandoned shopping carts",
        description: "Five carts left in the alley behind Grove Street shops.",
        status: TicketStatus::Open,
        category: TicketCategory::Other,
        priority: TicketPriority::Low,
        ward_id: 4,
        assignee: None,
        created_hours: 33,
        updated_hours: 33,
    },
];

fn canned_tickets() -> Vec<Ticket> {
    CANNED
        .iter()
        .map(|c| Ticket {
            id: c.id.to_string(),
            title: c.title.to_string(),
            description: c.description.to_string(),
            status: c.status,
            category: c.category,
            priority: c.priority,
            ward_id: Some(c.ward_id),
            reporter: Some("311 hotline".to_string()),
            assignee: c.assignee.map(str::to_string),
            created_at: Timestamp::constant(CANNED_EPOCH + c.created_hours * HOUR, 0),
            updated_at: Timestamp::constant(CANNED_EPOCH + c.updated_hours * HOUR, 0),
        })
        .collect()
}
