//! Logging initialization and startup diagnostics
//!
//! This module provides:
//! - Logger initialization (console + file)
//! - A configuration summary logged at startup (without secrets)

use std::fs::File;
use std::path::Path;

use simplelog::{ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, TermLogger, TerminalMode, WriteLogger};

use crate::core::config::Config;
use crate::core::error::AppResult;

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `log_file_path` - Path to the log file (truncated on start)
/// * `level` - Maximum level written to both sinks
///
/// # Errors
/// Fails if the file cannot be created or a global logger is already set.
pub fn init_logger(log_file_path: &Path, level: LevelFilter) -> AppResult<()> {
    let log_file = File::create(log_file_path)?;

    // Dependency chatter (reqwest, hyper, r2d2) is only interesting at trace level.
    let config = ConfigBuilder::new()
        .add_filter_ignore_str("hyper")
        .add_filter_ignore_str("reqwest")
        .add_filter_ignore_str("r2d2")
        .build();

    CombinedLogger::init(vec![
        TermLogger::new(level, config.clone(), TerminalMode::Mixed, ColorChoice::Auto),
        WriteLogger::new(level, config, log_file),
    ])?;

    Ok(())
}

/// Logs the effective configuration at application startup.
pub fn log_configuration(config: &Config) {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("Clan registration bot configuration");
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("Leader id:        {}", config.leader_id);
    log::info!("Database:         {}", config.database_path.display());
    log::info!("Screenshots dir:  {}", config.screenshots_dir.display());
    log::info!("Log file:         {} ({})", config.log_file.display(), config.log_level);
    log::info!(
        "Rate limit:       {} messages / {}s",
        config.rate_limit_max,
        config.rate_limit_window.as_secs()
    );

    if let Some(url) = &config.bot_api_url {
        log::info!("Bot API URL:      {}", url);
    }

    if !config.screenshots_dir.is_dir() {
        log::warn!(
            "Screenshots directory {} does not exist yet, archiving will create it",
            config.screenshots_dir.display()
        );
    }
}
