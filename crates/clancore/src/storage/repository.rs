//! Repository contract shared by the SQLite store and the in-memory fake.

use thiserror::Error;

use crate::models::{NewPendingRegistration, NewPlayer, PendingRegistration, Player, PlayerStatus, ReviewStatus};

/// Ways to look up a single player
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerKey {
    /// Case-insensitive in-game nickname
    Nickname(String),
    /// Telegram user id
    ExternalId(i64),
    /// `@username` or `user_<id>`, case-insensitive
    Handle(String),
}

/// Coarse classification of repository failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A uniqueness rule would be broken
    Conflict,
    /// The addressed row does not exist
    NotFound,
    /// Someone else already moved the row to its final state
    Race,
    /// The store itself failed
    Storage,
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("user {external_id} already has a pending application")]
    DuplicatePending { external_id: i64 },

    #[error("nickname '{nickname}' is already taken")]
    NicknameTaken { nickname: String },

    #[error("user {external_id} is already an active member")]
    AlreadyMember { external_id: i64 },

    #[error("{entity} '{key}' not found")]
    NotFound { entity: &'static str, key: String },

    #[error("application #{pending_id} is already {status}")]
    AlreadyResolved { pending_id: i64, status: ReviewStatus },

    #[error("player '{nickname}' is already excluded")]
    AlreadyExcluded { nickname: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

impl RepositoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicatePending { .. } | Self::NicknameTaken { .. } | Self::AlreadyMember { .. } => {
                ErrorKind::Conflict
            }
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyResolved { .. } | Self::AlreadyExcluded { .. } => ErrorKind::Race,
            Self::Database(_) | Self::Pool(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn pending_not_found(pending_id: i64) -> Self {
        Self::NotFound {
            entity: "application",
            key: format!("#{}", pending_id),
        }
    }

    pub(crate) fn player_not_found(key: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "player",
            key: key.into(),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Persistent store of players and membership applications.
///
/// Every mutating method is atomic: its checks and writes either all take
/// effect or none do. Implementations are shared between concurrently
/// running handlers, hence `Send + Sync`.
pub trait ClanRepository: Send + Sync {
    /// Stores a new application in `Pending` status.
    ///
    /// # Errors
    /// `DuplicatePending` when the user already has one open,
    /// `AlreadyMember` when the user is an active player,
    /// `NicknameTaken` when a player or open application holds the nickname.
    fn create_pending(&self, new: NewPendingRegistration) -> RepositoryResult<PendingRegistration>;

    /// Marks the application approved and creates the player from it.
    fn approve_pending(&self, pending_id: i64, admin_id: i64) -> RepositoryResult<Player>;

    /// Marks the application rejected and returns it. No player is created.
    fn reject_pending(&self, pending_id: i64, admin_id: i64) -> RepositoryResult<PendingRegistration>;

    /// Looks up one player. Id and handle lookups prefer the active row.
    fn get_player(&self, key: &PlayerKey) -> RepositoryResult<Option<Player>>;

    fn get_pending(&self, pending_id: i64) -> RepositoryResult<Option<PendingRegistration>>;

    /// The user's open application, if any.
    fn pending_for_user(&self, external_id: i64) -> RepositoryResult<Option<PendingRegistration>>;

    /// True if any player or open application holds the nickname.
    fn is_nickname_taken(&self, nickname: &str) -> RepositoryResult<bool>;

    /// Players in registration order, optionally filtered by status.
    fn list_players(&self, status: Option<PlayerStatus>) -> RepositoryResult<Vec<Player>>;

    /// Open applications in submission order.
    fn list_pending(&self) -> RepositoryResult<Vec<PendingRegistration>>;

    /// Soft-excludes a player and records the reason.
    fn exclude_player(&self, nickname: &str, reason: &str, admin_id: i64) -> RepositoryResult<Player>;

    /// Adds an active player directly, bypassing review.
    fn add_player(&self, new: NewPlayer) -> RepositoryResult<Player>;
}
