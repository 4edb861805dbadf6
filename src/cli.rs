use clap::{Parser, Subcommand};

use crate::filter::{SortDirection, SortField};
use crate::types::{TicketCategory, TicketStatus, VALID_CATEGORIES, VALID_STATUSES};

#[derive(Parser)]
#[command(name = "civic-sync")]
#[command(about = "Live municipal ticket list with retry and offline fallback")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Follow the ticket list, printing each page as it is published
    #[command(visible_alias = "w")]
    Watch {
        /// Only tickets with this status (open, in_progress, resolved, closed)
        #[arg(short, long, value_parser = parse_status)]
        status: Option<TicketStatus>,

        /// Only tickets in this category
        #[arg(short, long, value_parser = parse_category)]
        category: Option<TicketCategory>,

        /// Free-text search
        #[arg(long)]
        search: Option<String>,

        /// Only tickets in this ward (ignored when a ward scope is configured)
        #[arg(long)]
        ward: Option<u32>,

        /// Sort field (created_at, updated_at, priority, status, title)
        #[arg(long, value_parser = parse_sort_field)]
        sort: Option<SortField>,

        /// Sort direction (asc, desc)
        #[arg(long, value_parser = parse_sort_direction)]
        order: Option<SortDirection>,

        /// Zero-based page to show
        #[arg(long, default_value_t = 0)]
        page: u32,

        /// Print the first published page and exit
        #[arg(long)]
        once: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set a configuration value
    Set {
        /// Configuration key (base_url, auth.token, auth.refresh_token,
        /// request_timeout, sync.poll_interval_secs, sync.max_retries,
        /// sync.base_delay_ms, sync.jitter, sync.page_size, sync.ward_scope)
        key: String,
        /// Value to set
        value: String,
    },
    /// Print the path of the configuration file in use
    Path,
}

/// Filter arguments collected from `watch`.
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub status: Option<TicketStatus>,
    pub category: Option<TicketCategory>,
    pub search: Option<String>,
    pub ward: Option<u32>,
    pub sort: Option<SortField>,
    pub order: Option<SortDirection>,
    pub page: u32,
    pub once: bool,
    pub json: bool,
}

impl Commands {
    /// Execute the command, dispatching to the appropriate handler.
    pub async fn run(self) -> crate::error::Result<()> {
        use crate::commands::{cmd_config_path, cmd_config_set, cmd_config_show, cmd_watch};

        match self {
            Commands::Watch {
                status,
                category,
                search,
                ward,
                sort,
                order,
                page,
                once,
                json,
            } => {
                cmd_watch(WatchOptions {
                    status,
                    category,
                    search,
                    ward,
                    sort,
                    order,
                    page,
                    once,
                    json,
                })
                .await
            }

            Commands::Config { action } => match action {
                ConfigAction::Show { json } => cmd_config_show(json),
                ConfigAction::Set { key, value } => cmd_config_set(&key, &value),
                ConfigAction::Path => cmd_config_path(),
            },
        }
    }
}

/// Generic validation helper for parsing values with a standard error message format.
fn parse_with_validation<T, F>(
    s: &str,
    parser: F,
    field_name: &str,
    valid_values: &[&str],
) -> Result<T, String>
where
    F: FnOnce(&str) -> Result<T, String>,
{
    parser(s).map_err(|_| {
        format!(
            "Invalid {}. Must be one of: {}",
            field_name,
            valid_values.join(", ")
        )
    })
}

fn parse_status(s: &str) -> Result<TicketStatus, String> {
    parse_with_validation(
        s,
        |v| v.parse().map_err(|_| String::new()),
        "status",
        VALID_STATUSES,
    )
}

fn parse_category(s: &str) -> Result<TicketCategory, String> {
    parse_with_validation(
        s,
        |v| v.parse().map_err(|_| String::new()),
        "category",
        VALID_CATEGORIES,
    )
}

fn parse_sort_field(s: &str) -> Result<SortField, String> {
    parse_with_validation(
        s,
        |v| v.parse().map_err(|_| String::new()),
        "sort field",
        SortField::ALL_STRINGS,
    )
}

fn parse_sort_direction(s: &str) -> Result<SortDirection, String> {
    parse_with_validation(
        s,
        |v| v.parse().map_err(|_| String::new()),
        "sort direction",
        &["asc", "desc"],
    )
}
