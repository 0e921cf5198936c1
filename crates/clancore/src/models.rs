//! Domain entities: clan members and membership applications.

use chrono::{DateTime, Utc};
use strum::{AsRefStr, Display, EnumString};

/// Membership status of a player. Exclusion is a soft state; rows are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PlayerStatus {
    Active,
    Excluded,
}

/// Review status of a membership application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

/// A clan member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: i64,
    /// Telegram user id
    pub external_id: i64,
    /// `@username` or `user_<id>`
    pub handle: String,
    /// In-game nickname, unique across all players (case-insensitive)
    pub nickname: String,
    /// Telegram file id of the profile screenshot; absent for direct adds
    pub screenshot_ref: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub status: PlayerStatus,
    /// Admin who approved the application or added the player
    pub added_by: Option<i64>,
    pub exclusion_reason: Option<String>,
    pub excluded_at: Option<DateTime<Utc>>,
    pub excluded_by: Option<i64>,
}

impl Player {
    pub fn is_active(&self) -> bool {
        self.status == PlayerStatus::Active
    }
}

/// A membership application awaiting (or past) the leader's decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRegistration {
    pub id: i64,
    /// Telegram user id of the applicant
    pub external_id: i64,
    pub handle: String,
    pub nickname: String,
    /// Telegram file id of the profile screenshot
    pub screenshot_ref: String,
    pub submitted_at: DateTime<Utc>,
    pub status: ReviewStatus,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<i64>,
}

impl PendingRegistration {
    pub fn is_pending(&self) -> bool {
        self.status == ReviewStatus::Pending
    }
}

/// Insert payload for [`crate::storage::ClanRepository::create_pending`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPendingRegistration {
    pub external_id: i64,
    pub handle: String,
    pub nickname: String,
    pub screenshot_ref: String,
}

/// Insert payload for a player added directly by the leader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPlayer {
    pub external_id: i64,
    pub handle: String,
    pub nickname: String,
    pub screenshot_ref: Option<String>,
    pub added_by: i64,
}
