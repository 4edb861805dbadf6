//! Top-level application configuration.
//!
//! Configuration is stored in `.civic-sync/config.yaml` (or the per-user
//! config directory when no project file exists) and includes:
//! - The ticket service base URL and request timeout
//! - Bearer and refresh credentials
//! - Synchronizer tuning (poll interval, retry ceiling, page size, ward scope)

use std::env;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, SyncError};
use crate::types::config_root;

/// Environment variable holding the bearer token.
pub const TOKEN_ENV_VAR: &str = "CIVIC_SYNC_TOKEN";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the ticket service, e.g. `https://311.example.gov/api`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Credentials
    #[serde(default)]
    pub auth: AuthConfig,

    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Synchronizer settings
    #[serde(default, skip_serializing_if = "SyncConfig::is_default")]
    pub sync: SyncConfig,
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: None,
            auth: AuthConfig::default(),
            request_timeout: default_request_timeout(),
            sync: SyncConfig::default(),
        }
    }
}

/// Authentication configuration
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("AuthConfig")
            .field("token", &redact(&self.token))
            .field("refresh_token", &redact(&self.refresh_token))
            .finish()
    }
}

/// Synchronizer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Periodic refresh interval in seconds while visible (default: 60)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Automatic retries before degrading to fallback (default: 3, 0 = fall back immediately)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay in milliseconds; doubles on each attempt (default: 1000)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Add up to 10% random jitter to retry delays (default: false)
    #[serde(default)]
    pub jitter: bool,

    /// Records per page (default: 50)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Fixed ward restriction for ward-limited roles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ward_scope: Option<u32>,
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_page_size() -> u32 {
    50
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            jitter: false,
            page_size: default_page_size(),
            ward_scope: None,
        }
    }
}

impl SyncConfig {
    /// Check if this config has default values (for serialization skip)
    pub fn is_default(&self) -> bool {
        *self == SyncConfig::default()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl Config {
    /// Get the path to the project config file
    pub fn config_path() -> PathBuf {
        config_root().join("config.yaml")
    }

    /// Per-user config file, used when no project config exists
    pub fn user_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "civic", "civic-sync")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Load configuration from the project file, then the user file, or
    /// return the default if neither exists
    pub fn load() -> Result<Self> {
        let project = Self::config_path();
        if project.exists() {
            return Self::load_from(&project);
        }
        if let Some(user) = Self::user_config_path()
            && user.exists()
        {
            return Self::load_from(&user);
        }
        Ok(Config::default())
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SyncError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config at {}: {}", path.display(), e),
            ))
        })?;
        let config: Config = serde_yaml_ng::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the project file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SyncError::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create directory for config at {}: {}",
                        parent.display(),
                        e
                    ),
                ))
            })?;
        }

        let content = serde_yaml_ng::to_string(self)?;
        fs::write(&path, content)?;

        // Credentials live in this file: owner read/write only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&path, permissions)?;
        }

        Ok(())
    }

    /// Get the bearer token from the environment or the config file
    pub fn token(&self) -> Option<String> {
        if let Ok(token) = env::var(TOKEN_ENV_VAR)
            && !token.is_empty()
        {
            return Some(token);
        }
        self.auth.token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.auth.refresh_token.clone()
    }

    /// Parsed base URL, or a configuration error if missing or invalid
    pub fn base_url(&self) -> Result<Url> {
        let raw = self.base_url.as_deref().ok_or_else(|| {
            SyncError::Config(
                "base_url not configured. Run: civic-sync config set base_url <url>".to_string(),
            )
        })?;
        let mut url = Url::parse(raw)
            .map_err(|e| SyncError::Config(format!("invalid base_url '{raw}': {e}")))?;
        // Url::join replaces the last segment unless the path ends with '/'
        if !url.path().ends_with('/') {
            url.set_path(&format!("{}/", url.path()));
        }
        Ok(url)
    }

    /// Get the request timeout duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Set a configuration value by dotted key
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parse_err = |e: &dyn fmt::Display| {
            SyncError::Config(format!("invalid value '{value}' for {key}: {e}"))
        };
        match key {
            "base_url" => {
                Url::parse(value).map_err(|e| parse_err(&e))?;
                self.base_url = Some(value.to_string());
            }
            "auth.token" => self.auth.token = Some(value.to_string()),
            "auth.refresh_token" => self.auth.refresh_token = Some(value.to_string()),
            "request_timeout" => self.request_timeout = value.parse().map_err(|e| parse_err(&e))?,
            "sync.poll_interval_secs" => {
                self.sync.poll_interval_secs = value.parse().map_err(|e| parse_err(&e))?
            }
            "sync.max_retries" => {
                self.sync.max_retries = value.parse().map_err(|e| parse_err(&e))?
            }
            "sync.base_delay_ms" => {
                self.sync.base_delay_ms = value.parse().map_err(|e| parse_err(&e))?
            }
            "sync.jitter" => self.sync.jitter = value.parse().map_err(|e| parse_err(&e))?,
            "sync.page_size" => {
                let size: u32 = value.parse().map_err(|e| parse_err(&e))?;
                if size == 0 {
                    return Err(SyncError::Config("sync.page_size must be > 0".to_string()));
                }
                self.sync.page_size = size;
            }
            "sync.ward_scope" => {
                self.sync.ward_scope = if value.is_empty() {
                    None
                } else {
                    Some(value.parse().map_err(|e| parse_err(&e))?)
                };
            }
            _ => return Err(SyncError::Config(format!("unknown config key '{key}'"))),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_guards::EnvGuard;
    use crate::types::ROOT_ENV_VAR;
    use serial_test::serial;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.base_url.is_none());
        assert!(config.auth.token.is_none());
        assert_eq!(config.request_timeout, 30);
        assert_eq!(config.sync.poll_interval_secs, 60);
        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.sync.page_size, 50);
        assert!(!config.sync.jitter);
    }

    #[test]
    fn test_sync_section_defaults_when_partial() {
        let yaml = r#"
base_url: https://311.example.gov/api
sync:
  max_retries: 0
"#;
        let config: Config = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.sync.max_retries, 0);
        assert_eq!(config.sync.poll_interval_secs, 60);
        assert_eq!(config.sync.base_delay_ms, 1000);
        assert_eq!(config.request_timeout, 30);
    }

    #[test]
    fn test_default_sync_section_is_not_serialized() {
        let config = Config::default();
        let yaml = serde_yaml_ng::to_string(&config).unwrap();
        assert!(!yaml.contains("sync"));
    }

    #[test]
    fn test_auth_debug_is_redacted() {
        let mut config = Config::default();
        config.auth.token = Some("secret-bearer".to_string());
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret-bearer"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let mut config = Config::default();
        config.base_url = Some("https://311.example.gov/api".to_string());
        let url = config.base_url().unwrap();
        assert_eq!(url.as_str(), "https://311.example.gov/api/");
        assert_eq!(
            url.join("tickets").unwrap().as_str(),
            "https://311.example.gov/api/tickets"
        );
    }

    #[test]
    fn test_base_url_missing_is_config_error() {
        let config = Config::default();
        assert!(matches!(config.base_url(), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_set_value() {
        let mut config = Config::default();
        config.set_value("sync.page_size", "25").unwrap();
        config.set_value("sync.ward_scope", "7").unwrap();
        config.set_value("sync.jitter", "true").unwrap();
        assert_eq!(config.sync.page_size, 25);
        assert_eq!(config.sync.ward_scope, Some(7));
        assert!(config.sync.jitter);

        config.set_value("sync.ward_scope", "").unwrap();
        assert_eq!(config.sync.ward_scope, None);

        assert!(config.set_value("sync.page_size", "0").is_err());
        assert!(config.set_value("sync.max_retries", "many").is_err());
        assert!(config.set_value("base_url", "not a url").is_err());
        assert!(config.set_value("nope", "1").is_err());
    }

    #[test]
    #[serial]
    fn test_token_env_takes_precedence() {
        let mut config = Config::default();
        config.auth.token = Some("from-file".to_string());

        let _guard = unsafe { EnvGuard::set(TOKEN_ENV_VAR, "from-env") };
        assert_eq!(config.token(), Some("from-env".to_string()));

        let _guard = unsafe { EnvGuard::set(TOKEN_ENV_VAR, "") };
        assert_eq!(config.token(), Some("from-file".to_string()));
    }

    #[test]
    #[serial]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let _guard = unsafe { EnvGuard::set(ROOT_ENV_VAR, dir.path()) };

        let mut config = Config::default();
        config.set_value("base_url", "https://311.example.gov/api").unwrap();
        config.set_value("sync.max_retries", "5").unwrap();
        config.save().unwrap();

        let loaded = Config::load().unwrap();
        assert_eq!(
            loaded.base_url.as_deref(),
            Some("https://311.example.gov/api")
        );
        assert_eq!(loaded.sync.max_retries, 5);
    }
}
