//! Telegram glue: bot setup, dispatcher schema, keyboards and outgoing messages

pub mod archive;
pub mod bot;
pub mod handlers;
pub mod keyboards;
pub mod notifications;

pub use bot::{create_bot, setup_bot_commands, Command};
pub use handlers::{schema, HandlerDeps, HandlerError};
