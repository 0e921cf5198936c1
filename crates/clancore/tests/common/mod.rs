//! Shared helpers for clancore integration tests

#![allow(dead_code)]

use clancore::core::validation::Attachment;
use clancore::{Applicant, ClanRepository, RegistrationEvent, RegistrationFlow, RegistrationState, SqliteRepository, Transition};
use tempfile::TempDir;

pub const LEADER_ID: i64 = 42;

/// A migrated SQLite database in a temporary directory.
///
/// Keep the `TempDir` alive for as long as the repository is used.
pub fn temp_repository() -> (TempDir, SqliteRepository) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let repo = SqliteRepository::open(dir.path().join("clan.sqlite")).expect("Failed to open database");
    (dir, repo)
}

pub fn applicant(telegram_id: i64, username: &str) -> Applicant {
    Applicant::new(telegram_id, format!("@{}", username))
}

pub fn text(s: &str) -> RegistrationEvent {
    RegistrationEvent::Text(s.to_string())
}

pub fn photo(file_id: &str) -> RegistrationEvent {
    RegistrationEvent::Media(Some(Attachment::Photo {
        file_id: file_id.to_string(),
    }))
}

/// Walks one conversation through the given events, as the bot would
/// with its dialogue storage, and returns the last transition.
pub fn converse<R: ClanRepository>(
    flow: &RegistrationFlow<R>,
    who: &Applicant,
    events: impl IntoIterator<Item = RegistrationEvent>,
) -> Transition {
    let mut state = RegistrationState::Idle;
    let mut last = None;
    for event in events {
        let transition = flow.handle(&state, who, event);
        state = transition.next.clone();
        last = Some(transition);
    }
    last.expect("at least one event")
}

/// `/register`, nickname, screenshot.
pub fn register<R: ClanRepository>(flow: &RegistrationFlow<R>, who: &Applicant, nickname: &str) -> Transition {
    converse(
        flow,
        who,
        [RegistrationEvent::Register, text(nickname), photo(&format!("shot-{}", who.telegram_id))],
    )
}
