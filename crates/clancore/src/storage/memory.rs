//! In-memory repository used by tests and dry runs.
//!
//! A single mutex guards all state, which gives every operation the same
//! all-or-nothing behaviour as the SQLite transactions.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::core::validation::nickname_key;
use crate::models::{NewPendingRegistration, NewPlayer, PendingRegistration, Player, PlayerStatus, ReviewStatus};
use crate::storage::repository::{ClanRepository, PlayerKey, RepositoryError, RepositoryResult};

#[derive(Default)]
struct State {
    players: Vec<Player>,
    pending: Vec<PendingRegistration>,
    last_player_id: i64,
    last_pending_id: i64,
}

impl State {
    fn active_player(&self, external_id: i64) -> Option<&Player> {
        self.players
            .iter()
            .find(|p| p.external_id == external_id && p.is_active())
    }

    fn open_pending_for(&self, external_id: i64) -> Option<&PendingRegistration> {
        self.pending
            .iter()
            .find(|p| p.external_id == external_id && p.is_pending())
    }

    fn player_holds(&self, key: &str) -> bool {
        self.players.iter().any(|p| nickname_key(&p.nickname) == key)
    }

    fn nickname_in_use(&self, key: &str) -> bool {
        self.player_holds(key)
            || self
                .pending
                .iter()
                .any(|p| p.is_pending() && nickname_key(&p.nickname) == key)
    }

    fn push_player(&mut self, new: NewPlayer) -> Player {
        self.last_player_id += 1;
        let player = Player {
            id: self.last_player_id,
            external_id: new.external_id,
            handle: new.handle,
            nickname: new.nickname,
            screenshot_ref: new.screenshot_ref,
            registered_at: Utc::now(),
            status: PlayerStatus::Active,
            added_by: Some(new.added_by),
            exclusion_reason: None,
            excluded_at: None,
            excluded_by: None,
        };
        self.players.push(player.clone());
        player
    }

    /// Index of an application that must still be open.
    fn open_pending_index(&self, pending_id: i64) -> RepositoryResult<usize> {
        let idx = self
            .pending
            .iter()
            .position(|p| p.id == pending_id)
            .ok_or_else(|| RepositoryError::pending_not_found(pending_id))?;
        let status = self.pending[idx].status;
        if status != ReviewStatus::Pending {
            return Err(RepositoryError::AlreadyResolved { pending_id, status });
        }
        Ok(idx)
    }

    /// Prefers the active row, then the most recent.
    fn best_match<'a>(candidates: impl Iterator<Item = &'a Player>) -> Option<&'a Player> {
        candidates.max_by_key(|p| (p.is_active(), p.registered_at, p.id))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<State>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ClanRepository for InMemoryRepository {
    fn create_pending(&self, new: NewPendingRegistration) -> RepositoryResult<PendingRegistration> {
        let mut state = self.state();

        if state.open_pending_for(new.external_id).is_some() {
            return Err(RepositoryError::DuplicatePending {
                external_id: new.external_id,
            });
        }
        if state.active_player(new.external_id).is_some() {
            return Err(RepositoryError::AlreadyMember {
                external_id: new.external_id,
            });
        }
        if state.nickname_in_use(&nickname_key(&new.nickname)) {
            return Err(RepositoryError::NicknameTaken { nickname: new.nickname });
        }

        state.last_pending_id += 1;
        let pending = PendingRegistration {
            id: state.last_pending_id,
            external_id: new.external_id,
            handle: new.handle,
            nickname: new.nickname,
            screenshot_ref: new.screenshot_ref,
            submitted_at: Utc::now(),
            status: ReviewStatus::Pending,
            resolved_at: None,
            resolved_by: None,
        };
        state.pending.push(pending.clone());
        Ok(pending)
    }

    fn approve_pending(&self, pending_id: i64, admin_id: i64) -> RepositoryResult<Player> {
        let mut state = self.state();
        let idx = state.open_pending_index(pending_id)?;
        let pending = state.pending[idx].clone();

        if state.active_player(pending.external_id).is_some() {
            return Err(RepositoryError::AlreadyMember {
                external_id: pending.external_id,
            });
        }
        if state.player_holds(&nickname_key(&pending.nickname)) {
            return Err(RepositoryError::NicknameTaken {
                nickname: pending.nickname,
            });
        }

        let entry = &mut state.pending[idx];
        entry.status = ReviewStatus::Approved;
        entry.resolved_at = Some(Utc::now());
        entry.resolved_by = Some(admin_id);

        Ok(state.push_player(NewPlayer {
            external_id: pending.external_id,
            handle: pending.handle,
            nickname: pending.nickname,
            screenshot_ref: Some(pending.screenshot_ref),
            added_by: admin_id,
        }))
    }

    fn reject_pending(&self, pending_id: i64, admin_id: i64) -> RepositoryResult<PendingRegistration> {
        let mut state = self.state();
        let idx = state.open_pending_index(pending_id)?;

        let entry = &mut state.pending[idx];
        entry.status = ReviewStatus::Rejected;
        entry.resolved_at = Some(Utc::now());
        entry.resolved_by = Some(admin_id);
        Ok(entry.clone())
    }

    fn get_player(&self, key: &PlayerKey) -> RepositoryResult<Option<Player>> {
        let state = self.state();
        let found = match key {
            PlayerKey::Nickname(nickname) => {
                let key = nickname_key(nickname);
                state.players.iter().find(|p| nickname_key(&p.nickname) == key)
            }
            PlayerKey::ExternalId(external_id) => {
                State::best_match(state.players.iter().filter(|p| p.external_id == *external_id))
            }
            PlayerKey::Handle(handle) => {
                let handle = handle.trim();
                State::best_match(state.players.iter().filter(|p| p.handle.eq_ignore_ascii_case(handle)))
            }
        };
        Ok(found.cloned())
    }

    fn get_pending(&self, pending_id: i64) -> RepositoryResult<Option<PendingRegistration>> {
        Ok(self.state().pending.iter().find(|p| p.id == pending_id).cloned())
    }

    fn pending_for_user(&self, external_id: i64) -> RepositoryResult<Option<PendingRegistration>> {
        Ok(self.state().open_pending_for(external_id).cloned())
    }

    fn is_nickname_taken(&self, nickname: &str) -> RepositoryResult<bool> {
        Ok(self.state().nickname_in_use(&nickname_key(nickname)))
    }

    fn list_players(&self, status: Option<PlayerStatus>) -> RepositoryResult<Vec<Player>> {
        let state = self.state();
        let mut players: Vec<Player> = state
            .players
            .iter()
            .filter(|p| status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        players.sort_by_key(|p| (p.registered_at, p.id));
        Ok(players)
    }

    fn list_pending(&self) -> RepositoryResult<Vec<PendingRegistration>> {
        let state = self.state();
        let mut pending: Vec<PendingRegistration> = state.pending.iter().filter(|p| p.is_pending()).cloned().collect();
        pending.sort_by_key(|p| (p.submitted_at, p.id));
        Ok(pending)
    }

    fn exclude_player(&self, nickname: &str, reason: &str, admin_id: i64) -> RepositoryResult<Player> {
        let mut state = self.state();
        let key = nickname_key(nickname);
        let player = state
            .players
            .iter_mut()
            .find(|p| nickname_key(&p.nickname) == key)
            .ok_or_else(|| RepositoryError::player_not_found(nickname))?;

        if player.status == PlayerStatus::Excluded {
            return Err(RepositoryError::AlreadyExcluded {
                nickname: player.nickname.clone(),
            });
        }
        player.status = PlayerStatus::Excluded;
        player.exclusion_reason = Some(reason.to_string());
        player.excluded_at = Some(Utc::now());
        player.excluded_by = Some(admin_id);
        Ok(player.clone())
    }

    fn add_player(&self, new: NewPlayer) -> RepositoryResult<Player> {
        let mut state = self.state();
        if state.active_player(new.external_id).is_some() {
            return Err(RepositoryError::AlreadyMember {
                external_id: new.external_id,
            });
        }
        if state.nickname_in_use(&nickname_key(&new.nickname)) {
            return Err(RepositoryError::NicknameTaken { nickname: new.nickname });
        }
        Ok(state.push_player(new))
    }
}
