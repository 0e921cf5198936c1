#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod cli;
mod telegram;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dotenvy::dotenv;
use teloxide::prelude::*;
use teloxide::update_listeners::Polling;
use tokio::time::interval;

use clancore::core::{init_logger, log_configuration, RateLimiter};
use clancore::{create_pool, Config, SqliteRepository};

use cli::{Cli, Commands};
use telegram::{create_bot, schema, setup_bot_commands, HandlerDeps};

const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Main entry point for the clan registration bot
///
/// Parses CLI arguments and dispatches to the requested subcommand.
///
/// # Errors
/// Returns an error if initialization fails (configuration, logging, database, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Log panics from handler tasks instead of losing them on stderr
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
        if let Some(msg) = panic_info.payload().downcast_ref::<&str>() {
            log::error!("Panic message: {}", msg);
        }
    }));

    // Load environment variables from .env if present
    let _ = dotenv();

    let config = Config::from_env()?;
    init_logger(&config.log_file, config.log_level)?;
    config.ensure_directories()?;

    match cli.command {
        Some(Commands::Run) => run_bot(config).await,
        Some(Commands::Migrate) => run_migrate(&config),
        Some(Commands::CheckConfig) => {
            log_configuration(&config);
            println!("Configuration OK");
            Ok(())
        }
        None => {
            log::info!("No command specified, running the bot");
            run_bot(config).await
        }
    }
}

/// Applies pending migrations and exits
fn run_migrate(config: &Config) -> Result<()> {
    create_pool(&config.database_path).map_err(|e| anyhow::anyhow!("Failed to migrate database: {}", e))?;
    log::info!("Database {} is up to date", config.database_path.display());
    Ok(())
}

async fn run_bot(config: Config) -> Result<()> {
    log_configuration(&config);
    let config = Arc::new(config);

    let repo = SqliteRepository::open(&config.database_path)
        .map_err(|e| anyhow::anyhow!("Failed to open database: {}", e))?;

    let bot = create_bot(&config)?;
    match bot.get_me().await {
        Ok(me) => log::info!("Bot started as @{}", me.username()),
        Err(e) => log::warn!("Failed to fetch bot info: {}", e),
    }
    if let Err(e) = setup_bot_commands(&bot, config.leader_id).await {
        log::warn!("Failed to set up bot commands: {}", e);
    }

    let rate_limiter = Arc::new(RateLimiter::with_limits(config.rate_limit_max, config.rate_limit_window));
    {
        let rate_limiter = Arc::clone(&rate_limiter);
        tokio::spawn(async move {
            let mut ticker = interval(RATE_LIMIT_CLEANUP_INTERVAL);
            loop {
                ticker.tick().await;
                rate_limiter.cleanup().await;
                log::debug!("Rate limiter tracks {} users", rate_limiter.tracked_users().await);
            }
        });
    }

    let deps = HandlerDeps::new(Arc::clone(&config), repo, rate_limiter);

    log::info!("Starting long polling");
    let listener = Polling::builder(bot.clone()).drop_pending_updates().build();
    Dispatcher::builder(bot, schema(deps))
        .enable_ctrlc_handler()
        .build()
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("An error from the update listener"),
        )
        .await;

    log::info!("Dispatcher shutdown gracefully");
    Ok(())
}
