//! Clancore - membership registration engine for the clan bot
//!
//! Everything that does not need Telegram lives here so it can be tested
//! without a bot token or network access.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging, input validation, rate limiting
//! - `models`: `Player` and `PendingRegistration` entities
//! - `storage`: SQLite pool, migrations and the `ClanRepository` implementations
//! - `registration`: the conversational registration state machine
//! - `admin`: leader-only commands layered on the repository
//! - `formatting`: every chat-visible string

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod admin;
pub mod core;
pub mod formatting;
pub mod models;
pub mod registration;
pub mod storage;

// Re-export commonly used types for convenience
pub use crate::core::{config::Config, AppError, AppResult};
pub use admin::{AdminError, AdminService, Decision, ReviewOutcome};
pub use models::{NewPendingRegistration, NewPlayer, PendingRegistration, Player, PlayerStatus, ReviewStatus};
pub use registration::{Applicant, Effect, RegistrationEvent, RegistrationFlow, RegistrationState, Reply, Transition};
pub use storage::{create_pool, ClanRepository, DbPool, InMemoryRepository, PlayerKey, RepositoryError, SqliteRepository};
