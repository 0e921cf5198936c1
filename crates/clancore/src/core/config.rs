//! Runtime configuration
//!
//! Loaded once at startup and handed to constructors as an immutable
//! struct. Nothing in the crate reads the process environment after
//! [`Config::from_env`] returns.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use log::LevelFilter;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// Default SQLite database file
pub const DEFAULT_DATABASE_PATH: &str = "clan.sqlite";

/// Default directory for archived profile screenshots
pub const DEFAULT_SCREENSHOTS_DIR: &str = "data/screenshots";

/// Default log file
pub const DEFAULT_LOG_FILE: &str = "bot.log";

/// Rate limiting defaults: 5 messages per 60 seconds per user
pub mod rate_limit {
    use super::Duration;

    /// Maximum number of messages accepted from one user per window
    pub const MAX_REQUESTS: usize = 5;

    /// Sliding window length (in seconds)
    pub const WINDOW_SECS: u64 = 60;

    /// Sliding window duration
    pub fn window() -> Duration {
        Duration::from_secs(WINDOW_SECS)
    }
}

/// Network configuration
pub mod network {
    use super::Duration;

    /// Request timeout for Bot API calls (in seconds)
    pub const REQUEST_TIMEOUT_SECS: u64 = 60;

    /// Request timeout duration
    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is absent or empty
    #[error("{0} is not configured")]
    Missing(&'static str),

    /// A variable is present but unusable
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },

    /// Directory creation failed
    #[error("failed to create directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Bot configuration.
///
/// `Debug` output never contains the bot token.
#[derive(Debug)]
pub struct Config {
    /// Bot API token (`BOT_TOKEN`, falls back to `TELOXIDE_TOKEN`)
    pub bot_token: SecretString,
    /// Telegram id of the clan leader, the only administrator (`LEADER_TELEGRAM_ID`)
    pub leader_id: i64,
    /// SQLite database file (`DATABASE_PATH`)
    pub database_path: PathBuf,
    /// Where submitted screenshots are archived (`SCREENSHOTS_DIR`)
    pub screenshots_dir: PathBuf,
    /// Log verbosity (`LOG_LEVEL`)
    pub log_level: LevelFilter,
    /// Log file (`LOG_FILE_PATH`)
    pub log_file: PathBuf,
    /// Messages allowed per user per window (`RATE_LIMIT_MAX`)
    pub rate_limit_max: usize,
    /// Rate limit window (`RATE_LIMIT_WINDOW_SECS`)
    pub rate_limit_window: Duration,
    /// Self-hosted Bot API server (`BOT_API_URL`), if any
    pub bot_api_url: Option<String>,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// Call `dotenvy::dotenv()` beforehand if a `.env` file should be honoured.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bot_token = get("BOT_TOKEN")
            .or_else(|| get("TELOXIDE_TOKEN"))
            .ok_or(ConfigError::Missing("BOT_TOKEN"))?;
        if !bot_token.contains(':') {
            return Err(ConfigError::Invalid {
                name: "BOT_TOKEN",
                reason: "expected the `<id>:<secret>` format".to_string(),
            });
        }

        let leader_raw = get("LEADER_TELEGRAM_ID").ok_or(ConfigError::Missing("LEADER_TELEGRAM_ID"))?;
        let leader_id = leader_raw.parse::<i64>().map_err(|e| ConfigError::Invalid {
            name: "LEADER_TELEGRAM_ID",
            reason: e.to_string(),
        })?;
        if leader_id <= 0 {
            return Err(ConfigError::Invalid {
                name: "LEADER_TELEGRAM_ID",
                reason: "must be positive".to_string(),
            });
        }

        let log_level = match get("LOG_LEVEL") {
            Some(raw) => LevelFilter::from_str(&raw).map_err(|_| ConfigError::Invalid {
                name: "LOG_LEVEL",
                reason: format!("unknown level '{}'", raw),
            })?,
            None => LevelFilter::Info,
        };

        let rate_limit_max = parse_or("RATE_LIMIT_MAX", get("RATE_LIMIT_MAX"), rate_limit::MAX_REQUESTS)?;
        let window_secs = parse_or(
            "RATE_LIMIT_WINDOW_SECS",
            get("RATE_LIMIT_WINDOW_SECS"),
            rate_limit::WINDOW_SECS,
        )?;

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            leader_id,
            database_path: get("DATABASE_PATH")
                .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string())
                .into(),
            screenshots_dir: get("SCREENSHOTS_DIR")
                .unwrap_or_else(|| DEFAULT_SCREENSHOTS_DIR.to_string())
                .into(),
            log_level,
            log_file: get("LOG_FILE_PATH").unwrap_or_else(|| DEFAULT_LOG_FILE.to_string()).into(),
            rate_limit_max,
            rate_limit_window: Duration::from_secs(window_secs),
            bot_api_url: get("BOT_API_URL"),
        })
    }

    /// Exposes the bot token for the Telegram client.
    pub fn bot_token(&self) -> &str {
        self.bot_token.expose_secret()
    }

    /// Creates the screenshots directory and the database parent directory.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        create_dir(&self.screenshots_dir)?;
        if let Some(parent) = self.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                create_dir(parent)?;
            }
        }
        Ok(())
    }
}

fn parse_or<T: FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value.parse::<T>().map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn create_dir(path: &Path) -> Result<(), ConfigError> {
    std::fs::create_dir_all(path).map_err(|source| ConfigError::Directory {
        path: path.display().to_string(),
        source,
    })
}
