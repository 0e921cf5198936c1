//! Bot initialization and command definitions

use reqwest::ClientBuilder;
use teloxide::prelude::*;
use teloxide::types::{BotCommand, BotCommandScope, Recipient};
use teloxide::utils::command::BotCommands;

use clancore::core::config::network;
use clancore::Config;

/// Bot commands. Leader commands take the rest of the line as arguments.
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "about this bot")]
    Start,
    #[command(description = "list commands")]
    Help,
    #[command(description = "apply to join the clan")]
    Register,
    #[command(description = "stop the current registration")]
    Cancel,
    #[command(description = "applications waiting for review (leader)")]
    Pending,
    #[command(description = "clan roster: /list [active|excluded] (leader)")]
    List(String),
    #[command(description = "exclude a player: /exclude <@username|nickname> <reason> (leader)")]
    Exclude(String),
    #[command(description = "add a player: /add <telegram_id> <@username> <nickname> (leader)")]
    Add(String),
}

impl Command {
    /// Commands only the leader may run.
    pub fn is_leader_only(&self) -> bool {
        matches!(self, Self::Pending | Self::List(_) | Self::Exclude(_) | Self::Add(_))
    }
}

/// Creates a Bot instance with custom or default API URL
///
/// # Errors
/// Fails on an unparsable `BOT_API_URL` or if the HTTP client cannot be built.
pub fn create_bot(config: &Config) -> anyhow::Result<Bot> {
    let client = ClientBuilder::new().timeout(network::timeout()).build()?;
    let bot = Bot::with_client(config.bot_token(), client);

    let bot = match &config.bot_api_url {
        Some(raw) => {
            log::info!("Using custom Bot API URL: {}", raw);
            let url = url::Url::parse(raw).map_err(|e| anyhow::anyhow!("Invalid BOT_API_URL: {}", e))?;
            bot.set_api_url(url)
        }
        None => bot,
    };

    Ok(bot)
}

fn public_commands() -> Vec<BotCommand> {
    vec![
        BotCommand::new("start", "about this bot"),
        BotCommand::new("help", "list commands"),
        BotCommand::new("register", "apply to join the clan"),
        BotCommand::new("cancel", "stop the current registration"),
    ]
}

fn leader_commands() -> Vec<BotCommand> {
    let mut commands = public_commands();
    commands.extend([
        BotCommand::new("pending", "applications waiting for review"),
        BotCommand::new("list", "clan roster"),
        BotCommand::new("exclude", "exclude a player"),
        BotCommand::new("add", "add a player directly"),
    ]);
    commands
}

/// Sets up bot commands in the Telegram UI.
///
/// Everyone sees the registration commands; the leader's private chat
/// additionally lists the admin commands.
pub async fn setup_bot_commands(bot: &Bot, leader_id: i64) -> Result<(), teloxide::RequestError> {
    bot.set_my_commands(public_commands()).await?;
    bot.set_my_commands(leader_commands())
        .scope(BotCommandScope::Chat {
            chat_id: Recipient::Id(ChatId(leader_id)),
        })
        .await?;
    Ok(())
}
