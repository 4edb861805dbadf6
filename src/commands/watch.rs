//! `civic-sync watch`: follow the ticket list from the terminal.
//!
//! The terminal has no notion of visibility and no push transport, so the
//! synchronizer runs with `AlwaysVisible` and a disconnected in-process
//! push channel: updates arrive through the periodic refresh alone.

use std::sync::Arc;

use owo_colors::OwoColorize;
use tabled::settings::Style;
use tokio::sync::watch;
use tabled::{Table, Tabled};

use super::{
    colored_priority, colored_status, format_page_header, format_status_line, print_json,
};
use crate::auth::{HttpTokenRefresher, StaticToken, TokenRefresher};
use crate::cli::WatchOptions;
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::fallback::CannedFallback;
use crate::filter::{FilterStore, FilterUpdate};
use crate::push::BroadcastPushChannel;
use crate::query::{HttpTicketQuery, build_client};
use crate::sync::{ListSynchronizer, SyncResult, SyncStatus};
use crate::visibility::AlwaysVisible;

/// A row in the ticket table
#[derive(Tabled)]
struct TicketRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Priority")]
    priority: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Ward")]
    ward: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

/// Filter updates for the requested view. The page index goes last since
/// every other update resets it.
fn initial_updates(options: &WatchOptions) -> Vec<FilterUpdate> {
    let mut updates = Vec::new();
    if options.status.is_some() {
        updates.push(FilterUpdate::Status(options.status));
    }
    if options.category.is_some() {
        updates.push(FilterUpdate::Category(options.category));
    }
    if options.search.is_some() {
        updates.push(FilterUpdate::Search(options.search.clone()));
    }
    if options.ward.is_some() {
        updates.push(FilterUpdate::WardId(options.ward));
    }
    if options.sort.is_some() {
        updates.push(FilterUpdate::SortField(options.sort));
    }
    if let Some(order) = options.order {
        updates.push(FilterUpdate::SortDirection(order));
    }
    updates.push(FilterUpdate::PageIndex(options.page));
    updates
}

/// Follow the ticket list until Ctrl-C (or after the first page with `--once`)
pub async fn cmd_watch(options: WatchOptions) -> Result<()> {
    let config = Config::load()?;
    let client = build_client(config.request_timeout())?;

    match HttpTokenRefresher::from_config(client.clone(), &config)? {
        Some(refresher) => watch_with(&config, client, refresher, options).await,
        None => watch_with(&config, client, StaticToken, options).await,
    }
}

async fn watch_with<R: TokenRefresher>(
    config: &Config,
    client: reqwest::Client,
    refresher: R,
    options: WatchOptions,
) -> Result<()> {
    let query = HttpTicketQuery::from_config(client, config, refresher)?;
    tracing::info!(endpoint = %query.endpoint(), "watching ticket list");

    let filters = FilterStore::from_config(&config.sync);
    if filters.ward_scope().is_some() && options.ward.is_some() {
        eprintln!(
            "{}",
            "Note: a ward scope is configured; --ward is ignored".dimmed()
        );
    }
    filters.update_many(initial_updates(&options));

    let handle = ListSynchronizer::new(
        query,
        CannedFallback::new(),
        filters,
        Arc::new(BroadcastPushChannel::new(false)),
        Arc::new(AlwaysVisible),
    )
    .with_config(&config.sync)
    .spawn();

    let stop = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };
    let outcome = follow(handle.subscribe(), handle.subscribe_status(), &options, stop).await;

    handle.shutdown().await;
    outcome
}

/// Print pages and status changes until `stop` resolves, the session
/// expires, or (with `--once`) the first page is out.
async fn follow(
    mut pages: watch::Receiver<Option<SyncResult>>,
    mut statuses: watch::Receiver<SyncStatus>,
    options: &WatchOptions,
    stop: impl Future<Output = ()>,
) -> Result<()> {
    tokio::pin!(stop);
    let mut last_line = String::new();

    loop {
        tokio::select! {
            changed = pages.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let page = pages.borrow_and_update().clone();
                if let Some(page) = page {
                    print_page(&page, options.json)?;
                    if options.once {
                        return Ok(());
                    }
                }
            }
            changed = statuses.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let status = statuses.borrow_and_update().clone();
                if status.session_expired {
                    return Err(SyncError::SessionExpired(
                        "token refresh failed; update auth.token and try again".to_string(),
                    ));
                }
                if !options.json {
                    let line = format_status_line(&status);
                    if line != last_line {
                        eprintln!("{line}");
                        last_line = line;
                    }
                }
            }
            _ = &mut stop => return Ok(()),
        }
    }
}

fn print_page(page: &SyncResult, json: bool) -> Result<()> {
    if json {
        return print_json(page);
    }

    println!("{}", format_page_header(page));
    if page.records.is_empty() {
        println!("{}", "No tickets.".dimmed());
        return Ok(());
    }

    let rows: Vec<TicketRow> = page
        .records
        .iter()
        .map(|t| TicketRow {
            id: t.id.cyan().to_string(),
            status: colored_status(t.status),
            priority: colored_priority(t.priority),
            category: t.category.to_string(),
            ward: t.ward_id.map(|w| w.to_string()).unwrap_or_else(|| "-".to_string()),
            title: t.title.clone(),
            updated: t.updated_at.strftime("%Y-%m-%d %H:%M").to_string(),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}\n");
    Ok(())
}
