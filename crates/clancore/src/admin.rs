//! Leader-only commands: reports, review decisions, exclusion and direct adds.
//!
//! Every entry point checks the caller against the configured leader id
//! before touching the repository.

use std::str::FromStr;

use thiserror::Error;

use crate::core::validation::{is_admin, normalize_handle, validate_nickname, ValidationError};
use crate::formatting::{self, MAX_MESSAGE_LENGTH};
use crate::models::{NewPlayer, PendingRegistration, Player, PlayerStatus};
use crate::registration::RegistrationState;
use crate::storage::{ClanRepository, PlayerKey, RepositoryError};

pub const EXCLUDE_USAGE: &str = "/exclude <@username|nickname> <reason>";
pub const ADD_USAGE: &str = "/add <telegram_id> <@username> <nickname>";
pub const LIST_USAGE: &str = "/list [active|excluded]";

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("only the clan leader can use this command")]
    NotAuthorized,

    /// Malformed arguments; carries the usage line
    #[error("usage: {0}")]
    Usage(&'static str),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type AdminResult<T> = Result<T, AdminError>;

/// Leader's verdict on an application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    Approved(Player),
    Rejected(PendingRegistration),
}

impl ReviewOutcome {
    /// Telegram id of the applicant, whose private chat gets the verdict.
    pub fn submitter_id(&self) -> i64 {
        match self {
            Self::Approved(player) => player.external_id,
            Self::Rejected(pending) => pending.external_id,
        }
    }

    pub fn nickname(&self) -> &str {
        match self {
            Self::Approved(player) => &player.nickname,
            Self::Rejected(pending) => &pending.nickname,
        }
    }

    /// Conversation state the applicant ends up in.
    pub fn submitter_state(&self) -> RegistrationState {
        let nickname = self.nickname().to_string();
        match self {
            Self::Approved(_) => RegistrationState::Approved { nickname },
            Self::Rejected(_) => RegistrationState::Rejected { nickname },
        }
    }
}

/// Who `/exclude` is aimed at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExcludeTarget {
    Handle(String),
    Nickname(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludeRequest {
    pub target: ExcludeTarget,
    pub reason: String,
}

/// Parses `/exclude` arguments: `<target> <reason…>`.
///
/// The target is an `@username` or a nickname; a nickname containing
/// spaces must be quoted. Quotes around the reason are dropped.
pub fn parse_exclude(args: &str) -> AdminResult<ExcludeRequest> {
    let usage = AdminError::Usage(EXCLUDE_USAGE);
    let args = args.trim();

    let (target, rest) = match args.strip_prefix('"') {
        Some(quoted) => {
            let end = quoted.find('"').ok_or(AdminError::Usage(EXCLUDE_USAGE))?;
            (&quoted[..end], &quoted[end + 1..])
        }
        None => args.split_once(char::is_whitespace).unwrap_or((args, "")),
    };

    let target = target.trim();
    let reason = strip_quotes(rest.trim()).trim();
    if target.trim_start_matches('@').is_empty() || reason.is_empty() {
        return Err(usage);
    }

    let target = if target.starts_with('@') {
        ExcludeTarget::Handle(normalize_handle(target))
    } else {
        ExcludeTarget::Nickname(target.to_string())
    };

    Ok(ExcludeRequest {
        target,
        reason: reason.to_string(),
    })
}

/// Parses `/add` arguments: `<telegram_id> <@username> <nickname…>`.
pub fn parse_add(args: &str, admin_id: i64) -> AdminResult<NewPlayer> {
    let mut parts = args.trim().splitn(3, char::is_whitespace);
    let (Some(id), Some(handle), Some(nickname)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(AdminError::Usage(ADD_USAGE));
    };

    let external_id = match i64::from_str(id) {
        Ok(id) if id > 0 => id,
        _ => return Err(AdminError::Usage(ADD_USAGE)),
    };
    if handle.trim_start_matches('@').is_empty() {
        return Err(AdminError::Usage(ADD_USAGE));
    }

    Ok(NewPlayer {
        external_id,
        handle: normalize_handle(handle),
        nickname: validate_nickname(nickname)?,
        screenshot_ref: None,
        added_by: admin_id,
    })
}

/// Parses the optional `/list` filter.
pub fn parse_list_filter(args: &str) -> AdminResult<Option<PlayerStatus>> {
    match args.trim() {
        "" | "all" => Ok(None),
        other => PlayerStatus::from_str(other)
            .map(Some)
            .map_err(|_| AdminError::Usage(LIST_USAGE)),
    }
}

fn strip_quotes(s: &str) -> &str {
    for (open, close) in [('"', '"'), ('\'', '\''), ('«', '»'), ('“', '”')] {
        if let Some(inner) = s.strip_prefix(open).and_then(|rest| rest.strip_suffix(close)) {
            return inner;
        }
    }
    s
}

/// Admin command handler bound to one repository and leader.
#[derive(Clone)]
pub struct AdminService<R> {
    repo: R,
    leader_id: i64,
}

impl<R: ClanRepository> AdminService<R> {
    pub fn new(repo: R, leader_id: i64) -> Self {
        Self { repo, leader_id }
    }

    pub fn leader_id(&self) -> i64 {
        self.leader_id
    }

    pub fn is_leader(&self, user_id: i64) -> bool {
        is_admin(user_id, self.leader_id)
    }

    fn authorize(&self, user_id: i64) -> AdminResult<()> {
        if self.is_leader(user_id) {
            Ok(())
        } else {
            log::warn!("User {} tried to use a leader command", user_id);
            Err(AdminError::NotAuthorized)
        }
    }

    /// `/pending`: open applications, oldest first.
    pub fn pending_report(&self, admin_id: i64) -> AdminResult<String> {
        self.authorize(admin_id)?;
        let pending = self.repo.list_pending()?;
        Ok(formatting::truncate_message(
            &formatting::pending_report(&pending),
            MAX_MESSAGE_LENGTH,
        ))
    }

    /// `/list [active|excluded]`
    pub fn list_report(&self, admin_id: i64, args: &str) -> AdminResult<String> {
        self.authorize(admin_id)?;
        let filter = parse_list_filter(args)?;
        let players = self.repo.list_players(filter)?;
        Ok(formatting::truncate_message(
            &formatting::players_report(&players, filter),
            MAX_MESSAGE_LENGTH,
        ))
    }

    /// `/exclude <target> <reason>`. Returns the excluded player so the
    /// caller can notify them.
    pub fn exclude(&self, admin_id: i64, args: &str) -> AdminResult<Player> {
        self.authorize(admin_id)?;
        let request = parse_exclude(args)?;

        let (key, label) = match &request.target {
            ExcludeTarget::Handle(handle) => (PlayerKey::Handle(handle.clone()), handle.clone()),
            ExcludeTarget::Nickname(nickname) => (PlayerKey::Nickname(nickname.clone()), nickname.clone()),
        };
        let player = self
            .repo
            .get_player(&key)?
            .ok_or_else(|| RepositoryError::player_not_found(label))?;

        Ok(self.repo.exclude_player(&player.nickname, &request.reason, admin_id)?)
    }

    /// `/add <telegram_id> <@username> <nickname>`
    pub fn add(&self, admin_id: i64, args: &str) -> AdminResult<Player> {
        self.authorize(admin_id)?;
        let new = parse_add(args, admin_id)?;
        Ok(self.repo.add_player(new)?)
    }

    /// Approve or reject an application from the review buttons.
    pub fn review(&self, pending_id: i64, admin_id: i64, decision: Decision) -> AdminResult<ReviewOutcome> {
        self.authorize(admin_id)?;
        let outcome = match decision {
            Decision::Approve => ReviewOutcome::Approved(self.repo.approve_pending(pending_id, admin_id)?),
            Decision::Reject => ReviewOutcome::Rejected(self.repo.reject_pending(pending_id, admin_id)?),
        };
        Ok(outcome)
    }
}
