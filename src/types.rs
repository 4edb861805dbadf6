use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

pub const CONFIG_DIR: &str = ".civic-sync";

/// Environment variable that overrides the configuration root directory.
pub const ROOT_ENV_VAR: &str = "CIVIC_SYNC_ROOT";

/// Get the configuration root, honoring `CIVIC_SYNC_ROOT` when set.
pub fn config_root() -> std::path::PathBuf {
    match std::env::var_os(ROOT_ENV_VAR) {
        Some(root) if !root.is_empty() => std::path::PathBuf::from(root),
        _ => std::path::PathBuf::from(CONFIG_DIR),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
    Closed,
}

crate::enum_display_fromstr!(TicketStatus, SyncError::InvalidStatus, {
    Open => "open",
    InProgress => "in_progress",
    Resolved => "resolved",
    Closed => "closed",
});

pub const VALID_STATUSES: &[&str] = &["open", "in_progress", "resolved", "closed"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
    Roads,
    Lighting,
    Waste,
    Water,
    Parks,
    Noise,
    #[default]
    Other,
}

crate::enum_display_fromstr!(TicketCategory, SyncError::InvalidCategory, {
    Roads => "roads",
    Lighting => "lighting",
    Waste => "waste",
    Water => "water",
    Parks => "parks",
    Noise => "noise",
    Other => "other",
});

pub const VALID_CATEGORIES: &[&str] = &[
    "roads", "lighting", "waste", "water", "parks", "noise", "other",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TicketPriority {
    /// Numeric rank used for sorting (higher is more urgent)
    pub fn rank(&self) -> u8 {
        match self {
            TicketPriority::Low => 0,
            TicketPriority::Medium => 1,
            TicketPriority::High => 2,
            TicketPriority::Urgent => 3,
        }
    }
}

crate::enum_display_fromstr!(TicketPriority, SyncError::InvalidPriority, {
    Low => "low",
    Medium => "medium",
    High => "high",
    Urgent => "urgent",
});

/// A citizen-reported service ticket as returned by the ticket query service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TicketStatus,
    #[serde(default)]
    pub category: TicketCategory,
    #[serde(default)]
    pub priority: TicketPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ward_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_guards::EnvGuard;
    use serial_test::serial;

    #[test]
    fn test_status_roundtrip_strings() {
        for s in VALID_STATUSES {
            let status: TicketStatus = s.parse().unwrap();
            assert_eq!(status.to_string(), *s);
        }
        assert_eq!(
            "In-Progress".parse::<TicketStatus>().unwrap(),
            TicketStatus::InProgress
        );
        assert!(matches!(
            "pending".parse::<TicketStatus>(),
            Err(SyncError::InvalidStatus(_))
        ));
    }

    #[test]
    fn test_category_parse() {
        for s in VALID_CATEGORIES {
            assert!(s.parse::<TicketCategory>().is_ok());
        }
        assert!(matches!(
            "graffiti".parse::<TicketCategory>(),
            Err(SyncError::InvalidCategory(_))
        ));
    }

    #[test]
    fn test_priority_rank_orders_by_urgency() {
        assert!(TicketPriority::Urgent.rank() > TicketPriority::High.rank());
        assert!(TicketPriority::High.rank() > TicketPriority::Medium.rank());
        assert!(TicketPriority::Medium.rank() > TicketPriority::Low.rank());
    }

    #[test]
    fn test_ticket_deserializes_with_defaults() {
        let json = r#"{
            "id": "TKT-1",
            "title": "Pothole on Elm St",
            "created_at": "2024-03-01T09:00:00Z",
            "updated_at": "2024-03-02T09:00:00Z"
        }"#;
        let ticket: Ticket = serde_json::from_str(json).unwrap();
        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(ticket.category, TicketCategory::Other);
        assert_eq!(ticket.priority, TicketPriority::Medium);
        assert!(ticket.ward_id.is_none());
    }

    #[test]
    #[serial]
    fn test_config_root_honors_env() {
        let _guard = unsafe { EnvGuard::set(ROOT_ENV_VAR, "/tmp/civic-root") };
        assert_eq!(config_root(), std::path::PathBuf::from("/tmp/civic-root"));

        let _guard = unsafe { EnvGuard::remove(ROOT_ENV_VAR) };
        assert_eq!(config_root(), std::path::PathBuf::from(CONFIG_DIR));
    }
}
