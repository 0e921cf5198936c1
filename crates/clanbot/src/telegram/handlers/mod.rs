//! Telegram bot handler tree configuration
//!
//! The dispatcher schema routes commands, registration messages and the
//! leader's review buttons. Handlers translate updates into core events and
//! keep all decisions in `clancore`.

mod schema;
mod types;

pub use schema::schema;
pub use types::{HandlerDeps, HandlerError};
