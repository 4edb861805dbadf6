mod config;
mod watch;

pub use config::{cmd_config_path, cmd_config_set, cmd_config_show};
pub use watch::cmd_watch;

use owo_colors::OwoColorize;

use crate::error::Result;
use crate::sync::{SyncResult, SyncSource, SyncStatus};
use crate::types::{TicketPriority, TicketStatus};

/// Print a value as pretty JSON on stdout
pub fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Color a ticket status for terminal output
pub fn colored_status(status: TicketStatus) -> String {
    let text = status.to_string();
    match status {
        TicketStatus::Open => text.yellow().to_string(),
        TicketStatus::InProgress => text.cyan().to_string(),
        TicketStatus::Resolved => text.green().to_string(),
        TicketStatus::Closed => text.dimmed().to_string(),
    }
}

/// Color a priority, highlighting high and urgent
pub fn colored_priority(priority: TicketPriority) -> String {
    let text = priority.to_string();
    match priority {
        TicketPriority::Urgent => text.red().bold().to_string(),
        TicketPriority::High => text.red().to_string(),
        TicketPriority::Medium => text,
        TicketPriority::Low => text.dimmed().to_string(),
    }
}

/// One-line header describing where a page came from and how fresh it is
pub fn format_page_header(result: &SyncResult) -> String {
    let source = match result.source {
        SyncSource::Live => "live".green().to_string(),
        SyncSource::Fallback => "fallback".yellow().bold().to_string(),
    };
    let total = result
        .total_count
        .map(|n| format!(", {n} total"))
        .unwrap_or_default();
    format!(
        "[{source}] page {} of {}{total} as of {}",
        result.request.filters.page_index + 1,
        result.page_count.max(1),
        result.as_of.strftime("%H:%M:%S")
    )
}

/// Status line: connection, freshness, retry countdown, session state
pub fn format_status_line(status: &SyncStatus) -> String {
    if status.session_expired {
        return "session expired; sign in again".red().bold().to_string();
    }

    let connection = if status.connected {
        "connected".green().to_string()
    } else {
        "offline".dimmed().to_string()
    };
    let mut line = format!("{connection} | {}", status.phase);
    if let Some(updated) = status.last_updated {
        line.push_str(&format!(" | updated {}", updated.strftime("%H:%M:%S")));
    }
    if let Some(message) = &status.retry_message {
        line.push_str(&format!(" | {}", message.yellow()));
    }
    line
}
