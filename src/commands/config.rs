//! Configuration commands.
//!
//! - `config show`: Display current configuration
//! - `config set`: Set a configuration value
//! - `config path`: Print the config file in use

use std::path::PathBuf;

use owo_colors::OwoColorize;
use serde_json::json;

use super::print_json;
use crate::config::Config;
use crate::error::Result;

/// Keys holding credentials; their values are never echoed back
const SENSITIVE_KEYS: &[&str] = &["auth.token", "auth.refresh_token"];

/// Mask a sensitive value by showing only the first 2 and last 2 characters
fn mask_sensitive_value(value: &str) -> String {
    let char_count = value.chars().count();
    if char_count > 4 {
        let first: String = value.chars().take(2).collect();
        let last: String = value.chars().skip(char_count - 2).collect();
        format!("{first}...{last}")
    } else {
        "****".to_string()
    }
}

/// The file `Config::load` reads: the project file, else the user file
/// when it exists, else the project path that `save` would create.
fn active_config_path() -> PathBuf {
    let project = Config::config_path();
    if project.exists() {
        return project;
    }
    match Config::user_config_path() {
        Some(user) if user.exists() => user,
        _ => project,
    }
}

fn configured(present: bool) -> String {
    if present {
        "configured".green().to_string()
    } else {
        "not configured".dimmed().to_string()
    }
}

/// Show current configuration
pub fn cmd_config_show(json: bool) -> Result<()> {
    let config = Config::load()?;
    let sync = &config.sync;

    if json {
        return print_json(&json!({
            "base_url": config.base_url,
            "request_timeout": config.request_timeout,
            "auth": {
                "token_configured": config.token().is_some(),
                "refresh_token_configured": config.refresh_token().is_some(),
            },
            "sync": sync,
            "config_file": active_config_path().to_string_lossy(),
        }));
    }

    println!("{}\n", "Configuration:".cyan().bold());

    match &config.base_url {
        Some(url) => println!("{}: {url}", "base_url".cyan()),
        None => println!("{}: {}", "base_url".cyan(), "not configured".dimmed()),
    }
    println!("{}: {}s", "request_timeout".cyan(), config.request_timeout);
    println!();

    // Auth status (don't show actual tokens)
    println!("{}:", "auth".cyan());
    println!("  token: {}", configured(config.token().is_some()));
    println!(
        "  refresh_token: {}",
        configured(config.refresh_token().is_some())
    );
    println!();

    println!("{}:", "sync".cyan());
    println!("  poll_interval_secs: {}", sync.poll_interval_secs);
    println!("  max_retries: {}", sync.max_retries);
    println!("  base_delay_ms: {}", sync.base_delay_ms);
    println!("  jitter: {}", sync.jitter);
    println!("  page_size: {}", sync.page_size);
    match sync.ward_scope {
        Some(ward) => println!("  ward_scope: {ward}"),
        None => println!("  ward_scope: {}", "none".dimmed()),
    }
    println!();

    println!(
        "{}",
        format!("Config file: {}", active_config_path().display()).dimmed()
    );
    Ok(())
}

/// Set a configuration value
pub fn cmd_config_set(key: &str, value: &str) -> Result<()> {
    let mut config = Config::load()?;
    config.set_value(key, value)?;
    config.save()?;

    let shown = if SENSITIVE_KEYS.contains(&key) {
        mask_sensitive_value(value)
    } else {
        value.to_string()
    };
    println!("Set {} to {shown}", key.cyan());
    Ok(())
}

/// Print the path of the configuration file in use
pub fn cmd_config_path() -> Result<()> {
    println!("{}", active_config_path().display());
    Ok(())
}
