//! SQLite-backed repository.
//!
//! Each mutating call runs in a single `BEGIN IMMEDIATE` transaction, so the
//! uniqueness checks and the writes that depend on them are serialized
//! against every other writer on the same database file.

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::core::error::AppResult;
use crate::core::validation::nickname_key;
use crate::models::{NewPendingRegistration, NewPlayer, PendingRegistration, Player, PlayerStatus, ReviewStatus};
use crate::storage::db::{
    create_pool, format_timestamp, get_connection, optional_timestamp_column, status_column, timestamp_column,
    DbConnection, DbPool,
};
use crate::storage::repository::{ClanRepository, PlayerKey, RepositoryError, RepositoryResult};

const PLAYER_COLUMNS: &str = "id, telegram_id, handle, nickname, screenshot_ref, registered_at, status, \
                              added_by, exclusion_reason, excluded_at, excluded_by";

const PENDING_COLUMNS: &str =
    "id, telegram_id, handle, nickname, screenshot_ref, submitted_at, status, resolved_at, resolved_by";

/// Active rows first, then the most recent one.
const PREFER_ACTIVE: &str = "ORDER BY (status = 'active') DESC, registered_at DESC, id DESC LIMIT 1";

#[derive(Clone)]
pub struct SqliteRepository {
    pool: DbPool,
}

impl SqliteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Opens (and migrates) the database file.
    pub fn open(database_path: impl AsRef<Path>) -> AppResult<Self> {
        Ok(Self::new(create_pool(database_path)?))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    fn conn(&self) -> RepositoryResult<DbConnection> {
        Ok(get_connection(&self.pool)?)
    }
}

fn parse_player_row(row: &Row<'_>) -> rusqlite::Result<Player> {
    Ok(Player {
        id: row.get(0)?,
        external_id: row.get(1)?,
        handle: row.get(2)?,
        nickname: row.get(3)?,
        screenshot_ref: row.get(4)?,
        registered_at: timestamp_column(row, 5)?,
        status: status_column::<PlayerStatus>(row, 6)?,
        added_by: row.get(7)?,
        exclusion_reason: row.get(8)?,
        excluded_at: optional_timestamp_column(row, 9)?,
        excluded_by: row.get(10)?,
    })
}

fn parse_pending_row(row: &Row<'_>) -> rusqlite::Result<PendingRegistration> {
    Ok(PendingRegistration {
        id: row.get(0)?,
        external_id: row.get(1)?,
        handle: row.get(2)?,
        nickname: row.get(3)?,
        screenshot_ref: row.get(4)?,
        submitted_at: timestamp_column(row, 5)?,
        status: status_column::<ReviewStatus>(row, 6)?,
        resolved_at: optional_timestamp_column(row, 7)?,
        resolved_by: row.get(8)?,
    })
}

fn player_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<Player>> {
    conn.query_row(
        &format!("SELECT {} FROM players WHERE id = ?1", PLAYER_COLUMNS),
        params![id],
        parse_player_row,
    )
    .optional()
}

fn player_by_nickname(conn: &Connection, nickname: &str) -> rusqlite::Result<Option<Player>> {
    conn.query_row(
        &format!("SELECT {} FROM players WHERE nickname_key = ?1", PLAYER_COLUMNS),
        params![nickname_key(nickname)],
        parse_player_row,
    )
    .optional()
}

fn active_player_by_external_id(conn: &Connection, external_id: i64) -> rusqlite::Result<Option<Player>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM players WHERE telegram_id = ?1 AND status = 'active'",
            PLAYER_COLUMNS
        ),
        params![external_id],
        parse_player_row,
    )
    .optional()
}

fn pending_by_id(conn: &Connection, pending_id: i64) -> rusqlite::Result<Option<PendingRegistration>> {
    conn.query_row(
        &format!("SELECT {} FROM pending_registrations WHERE id = ?1", PENDING_COLUMNS),
        params![pending_id],
        parse_pending_row,
    )
    .optional()
}

fn open_pending_for_user(conn: &Connection, external_id: i64) -> rusqlite::Result<Option<PendingRegistration>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM pending_registrations WHERE telegram_id = ?1 AND status = 'pending'",
            PENDING_COLUMNS
        ),
        params![external_id],
        parse_pending_row,
    )
    .optional()
}

fn player_holds_nickname(conn: &Connection, key: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM players WHERE nickname_key = ?1)",
        params![key],
        |row| row.get(0),
    )
}

/// True if a player or an open application holds the nickname key.
fn nickname_in_use(conn: &Connection, key: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM players WHERE nickname_key = ?1)
             OR EXISTS(SELECT 1 FROM pending_registrations WHERE nickname_key = ?1 AND status = 'pending')",
        params![key],
        |row| row.get(0),
    )
}

struct PlayerInsert<'a> {
    external_id: i64,
    handle: &'a str,
    nickname: &'a str,
    screenshot_ref: Option<&'a str>,
    added_by: i64,
}

fn insert_player(conn: &Connection, player: PlayerInsert<'_>) -> RepositoryResult<Player> {
    conn.execute(
        "INSERT INTO players (telegram_id, handle, nickname, nickname_key, screenshot_ref, registered_at, status, added_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7)",
        params![
            player.external_id,
            player.handle,
            player.nickname,
            nickname_key(player.nickname),
            player.screenshot_ref,
            format_timestamp(Utc::now()),
            player.added_by,
        ],
    )?;
    let id = conn.last_insert_rowid();
    player_by_id(conn, id)?.ok_or_else(|| RepositoryError::player_not_found(format!("#{}", id)))
}

/// Loads an application that must still be open.
fn open_pending(conn: &Connection, pending_id: i64) -> RepositoryResult<PendingRegistration> {
    let pending = pending_by_id(conn, pending_id)?.ok_or_else(|| RepositoryError::pending_not_found(pending_id))?;
    if !pending.is_pending() {
        return Err(RepositoryError::AlreadyResolved {
            pending_id,
            status: pending.status,
        });
    }
    Ok(pending)
}

fn resolve_pending(conn: &Connection, pending_id: i64, status: ReviewStatus, admin_id: i64) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE pending_registrations
         SET status = ?1, resolved_at = ?2, resolved_by = ?3
         WHERE id = ?4 AND status = 'pending'",
        params![status.as_ref(), format_timestamp(Utc::now()), admin_id, pending_id],
    )?;
    Ok(())
}

impl ClanRepository for SqliteRepository {
    fn create_pending(&self, new: NewPendingRegistration) -> RepositoryResult<PendingRegistration> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if open_pending_for_user(&tx, new.external_id)?.is_some() {
            return Err(RepositoryError::DuplicatePending {
                external_id: new.external_id,
            });
        }
        if active_player_by_external_id(&tx, new.external_id)?.is_some() {
            return Err(RepositoryError::AlreadyMember {
                external_id: new.external_id,
            });
        }
        let key = nickname_key(&new.nickname);
        if nickname_in_use(&tx, &key)? {
            return Err(RepositoryError::NicknameTaken { nickname: new.nickname });
        }

        tx.execute(
            "INSERT INTO pending_registrations
                 (telegram_id, handle, nickname, nickname_key, screenshot_ref, submitted_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending')",
            params![
                new.external_id,
                new.handle,
                new.nickname,
                key,
                new.screenshot_ref,
                format_timestamp(Utc::now()),
            ],
        )?;
        let id = tx.last_insert_rowid();
        let pending = pending_by_id(&tx, id)?.ok_or_else(|| RepositoryError::pending_not_found(id))?;
        tx.commit()?;

        log::info!(
            "Application #{} created for {} ({}) with nickname '{}'",
            pending.id,
            pending.handle,
            pending.external_id,
            pending.nickname
        );
        Ok(pending)
    }

    fn approve_pending(&self, pending_id: i64, admin_id: i64) -> RepositoryResult<Player> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let pending = open_pending(&tx, pending_id)?;
        if active_player_by_external_id(&tx, pending.external_id)?.is_some() {
            return Err(RepositoryError::AlreadyMember {
                external_id: pending.external_id,
            });
        }
        if player_holds_nickname(&tx, &nickname_key(&pending.nickname))? {
            return Err(RepositoryError::NicknameTaken {
                nickname: pending.nickname,
            });
        }

        resolve_pending(&tx, pending_id, ReviewStatus::Approved, admin_id)?;
        let player = insert_player(
            &tx,
            PlayerInsert {
                external_id: pending.external_id,
                handle: &pending.handle,
                nickname: &pending.nickname,
                screenshot_ref: Some(&pending.screenshot_ref),
                added_by: admin_id,
            },
        )?;
        tx.commit()?;

        log::info!(
            "Application #{} approved by {}: player '{}' ({})",
            pending_id,
            admin_id,
            player.nickname,
            player.handle
        );
        Ok(player)
    }

    fn reject_pending(&self, pending_id: i64, admin_id: i64) -> RepositoryResult<PendingRegistration> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        open_pending(&tx, pending_id)?;
        resolve_pending(&tx, pending_id, ReviewStatus::Rejected, admin_id)?;
        let resolved = pending_by_id(&tx, pending_id)?.ok_or_else(|| RepositoryError::pending_not_found(pending_id))?;
        tx.commit()?;

        log::info!(
            "Application #{} ('{}') rejected by {}",
            pending_id,
            resolved.nickname,
            admin_id
        );
        Ok(resolved)
    }

    fn get_player(&self, key: &PlayerKey) -> RepositoryResult<Option<Player>> {
        let conn = self.conn()?;
        let player = match key {
            PlayerKey::Nickname(nickname) => player_by_nickname(&conn, nickname)?,
            PlayerKey::ExternalId(external_id) => conn
                .query_row(
                    &format!("SELECT {} FROM players WHERE telegram_id = ?1 {}", PLAYER_COLUMNS, PREFER_ACTIVE),
                    params![external_id],
                    parse_player_row,
                )
                .optional()?,
            PlayerKey::Handle(handle) => conn
                .query_row(
                    &format!(
                        "SELECT {} FROM players WHERE handle = ?1 COLLATE NOCASE {}",
                        PLAYER_COLUMNS, PREFER_ACTIVE
                    ),
                    params![handle.trim()],
                    parse_player_row,
                )
                .optional()?,
        };
        Ok(player)
    }

    fn get_pending(&self, pending_id: i64) -> RepositoryResult<Option<PendingRegistration>> {
        let conn = self.conn()?;
        Ok(pending_by_id(&conn, pending_id)?)
    }

    fn pending_for_user(&self, external_id: i64) -> RepositoryResult<Option<PendingRegistration>> {
        let conn = self.conn()?;
        Ok(open_pending_for_user(&conn, external_id)?)
    }

    fn is_nickname_taken(&self, nickname: &str) -> RepositoryResult<bool> {
        let conn = self.conn()?;
        Ok(nickname_in_use(&conn, &nickname_key(nickname))?)
    }

    fn list_players(&self, status: Option<PlayerStatus>) -> RepositoryResult<Vec<Player>> {
        let conn = self.conn()?;
        let players = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM players WHERE status = ?1 ORDER BY registered_at ASC, id ASC",
                    PLAYER_COLUMNS
                ))?;
                let rows = stmt.query_map(params![status.as_ref()], parse_player_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM players ORDER BY registered_at ASC, id ASC",
                    PLAYER_COLUMNS
                ))?;
                let rows = stmt.query_map([], parse_player_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(players)
    }

    fn list_pending(&self) -> RepositoryResult<Vec<PendingRegistration>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pending_registrations WHERE status = 'pending' ORDER BY submitted_at ASC, id ASC",
            PENDING_COLUMNS
        ))?;
        let rows = stmt.query_map([], parse_pending_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn exclude_player(&self, nickname: &str, reason: &str, admin_id: i64) -> RepositoryResult<Player> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let player = player_by_nickname(&tx, nickname)?.ok_or_else(|| RepositoryError::player_not_found(nickname))?;
        if player.status == PlayerStatus::Excluded {
            return Err(RepositoryError::AlreadyExcluded {
                nickname: player.nickname,
            });
        }

        tx.execute(
            "UPDATE players
             SET status = 'excluded', exclusion_reason = ?1, excluded_at = ?2, excluded_by = ?3
             WHERE id = ?4",
            params![reason, format_timestamp(Utc::now()), admin_id, player.id],
        )?;
        let excluded = player_by_id(&tx, player.id)?.ok_or_else(|| RepositoryError::player_not_found(nickname))?;
        tx.commit()?;

        log::info!(
            "Player '{}' ({}) excluded by {}: {}",
            excluded.nickname,
            excluded.handle,
            admin_id,
            reason
        );
        Ok(excluded)
    }

    fn add_player(&self, new: NewPlayer) -> RepositoryResult<Player> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if active_player_by_external_id(&tx, new.external_id)?.is_some() {
            return Err(RepositoryError::AlreadyMember {
                external_id: new.external_id,
            });
        }
        if nickname_in_use(&tx, &nickname_key(&new.nickname))? {
            return Err(RepositoryError::NicknameTaken { nickname: new.nickname });
        }

        let player = insert_player(
            &tx,
            PlayerInsert {
                external_id: new.external_id,
                handle: &new.handle,
                nickname: &new.nickname,
                screenshot_ref: new.screenshot_ref.as_deref(),
                added_by: new.added_by,
            },
        )?;
        tx.commit()?;

        log::info!(
            "Player '{}' ({}) added directly by {}",
            player.nickname,
            player.handle,
            new.added_by
        );
        Ok(player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::ErrorKind;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn test_repo() -> (TempDir, SqliteRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = SqliteRepository::open(dir.path().join("clan.sqlite")).unwrap();
        (dir, repo)
    }

    fn application(external_id: i64, nickname: &str) -> NewPendingRegistration {
        NewPendingRegistration {
            external_id,
            handle: format!("@user{}", external_id),
            nickname: nickname.to_string(),
            screenshot_ref: format!("file-{}", external_id),
        }
    }

    #[test]
    fn test_create_pending_persists_row() {
        let (_dir, repo) = test_repo();
        let pending = repo.create_pending(application(100, "DragonSlayer")).unwrap();

        assert_eq!(pending.nickname, "DragonSlayer");
        assert_eq!(pending.status, ReviewStatus::Pending);
        assert_eq!(pending.resolved_at, None);
        assert_eq!(repo.get_pending(pending.id).unwrap(), Some(pending.clone()));
        assert_eq!(repo.pending_for_user(100).unwrap(), Some(pending));
    }

    #[test]
    fn test_second_pending_for_same_user_is_refused() {
        let (_dir, repo) = test_repo();
        repo.create_pending(application(100, "First")).unwrap();

        let err = repo.create_pending(application(100, "Second")).unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicatePending { external_id: 100 }));
        assert_eq!(repo.list_pending().unwrap().len(), 1);
        assert_eq!(repo.list_pending().unwrap()[0].nickname, "First");
    }

    #[test]
    fn test_nickname_collision_is_case_insensitive() {
        let (_dir, repo) = test_repo();
        repo.create_pending(application(100, "DragonSlayer")).unwrap();

        let err = repo.create_pending(application(200, "dragonslayer")).unwrap_err();
        assert!(matches!(err, RepositoryError::NicknameTaken { .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(repo.is_nickname_taken("DRAGONSLAYER").unwrap());
        assert!(!repo.is_nickname_taken("Knight").unwrap());
    }

    #[test]
    fn test_approve_creates_single_player() {
        let (_dir, repo) = test_repo();
        let pending = repo.create_pending(application(100, "DragonSlayer")).unwrap();

        let player = repo.approve_pending(pending.id, 1).unwrap();
        assert_eq!(player.nickname, "DragonSlayer");
        assert_eq!(player.external_id, 100);
        assert_eq!(player.status, PlayerStatus::Active);
        assert_eq!(player.added_by, Some(1));
        assert_eq!(player.screenshot_ref.as_deref(), Some("file-100"));

        let resolved = repo.get_pending(pending.id).unwrap().unwrap();
        assert_eq!(resolved.status, ReviewStatus::Approved);
        assert_eq!(resolved.resolved_by, Some(1));
        assert!(resolved.resolved_at.is_some());
        assert!(repo.pending_for_user(100).unwrap().is_none());

        let err = repo.approve_pending(pending.id, 1).unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::AlreadyResolved {
                status: ReviewStatus::Approved,
                ..
            }
        ));
        assert_eq!(repo.list_players(None).unwrap().len(), 1);
    }

    #[test]
    fn test_reject_keeps_history_without_player() {
        let (_dir, repo) = test_repo();
        let pending = repo.create_pending(application(100, "DragonSlayer")).unwrap();

        let rejected = repo.reject_pending(pending.id, 1).unwrap();
        assert_eq!(rejected.status, ReviewStatus::Rejected);
        assert_eq!(rejected.resolved_by, Some(1));
        assert!(repo.list_players(None).unwrap().is_empty());
        assert!(repo.list_pending().unwrap().is_empty());

        assert!(matches!(
            repo.approve_pending(pending.id, 1),
            Err(RepositoryError::AlreadyResolved { .. })
        ));
        // The nickname is free again once the application is closed.
        assert!(!repo.is_nickname_taken("DragonSlayer").unwrap());
        repo.create_pending(application(100, "DragonSlayer")).unwrap();
    }

    #[test]
    fn test_unknown_pending_is_not_found() {
        let (_dir, repo) = test_repo();
        let err = repo.approve_pending(999, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(repo.reject_pending(999, 1).is_err());
        assert_eq!(repo.get_pending(999).unwrap(), None);
    }

    #[test]
    fn test_active_member_cannot_apply() {
        let (_dir, repo) = test_repo();
        let pending = repo.create_pending(application(100, "DragonSlayer")).unwrap();
        repo.approve_pending(pending.id, 1).unwrap();

        let err = repo.create_pending(application(100, "Other")).unwrap_err();
        assert!(matches!(err, RepositoryError::AlreadyMember { external_id: 100 }));
    }

    #[test]
    fn test_exclude_player() {
        let (_dir, repo) = test_repo();
        let pending = repo.create_pending(application(100, "DragonSlayer")).unwrap();
        repo.approve_pending(pending.id, 1).unwrap();

        let excluded = repo.exclude_player("dragonslayer", "inactive", 1).unwrap();
        assert_eq!(excluded.status, PlayerStatus::Excluded);
        assert_eq!(excluded.exclusion_reason.as_deref(), Some("inactive"));
        assert_eq!(excluded.excluded_by, Some(1));
        assert!(excluded.excluded_at.is_some());

        let listed = repo.list_players(Some(PlayerStatus::Excluded)).unwrap();
        assert_eq!(listed, vec![excluded]);
        assert!(repo.list_players(Some(PlayerStatus::Active)).unwrap().is_empty());

        let err = repo.exclude_player("DragonSlayer", "again", 1).unwrap_err();
        assert!(matches!(err, RepositoryError::AlreadyExcluded { .. }));
        assert_eq!(err.kind(), ErrorKind::Race);

        assert!(matches!(
            repo.exclude_player("Ghost", "x", 1),
            Err(RepositoryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_excluded_user_may_reapply_with_new_nickname() {
        let (_dir, repo) = test_repo();
        let pending = repo.create_pending(application(100, "DragonSlayer")).unwrap();
        repo.approve_pending(pending.id, 1).unwrap();
        repo.exclude_player("DragonSlayer", "inactive", 1).unwrap();

        assert!(matches!(
            repo.create_pending(application(100, "DragonSlayer")),
            Err(RepositoryError::NicknameTaken { .. })
        ));
        let again = repo.create_pending(application(100, "Phoenix")).unwrap();
        let player = repo.approve_pending(again.id, 1).unwrap();

        // The id lookup now prefers the active row.
        let found = repo.get_player(&PlayerKey::ExternalId(100)).unwrap().unwrap();
        assert_eq!(found.id, player.id);
        assert_eq!(found.nickname, "Phoenix");
    }

    #[test]
    fn test_get_player_by_each_key() {
        let (_dir, repo) = test_repo();
        let added = repo
            .add_player(NewPlayer {
                external_id: 300,
                handle: "@Knight".to_string(),
                nickname: "Lancelot".to_string(),
                screenshot_ref: None,
                added_by: 1,
            })
            .unwrap();

        let by_nick = repo.get_player(&PlayerKey::Nickname("LANCELOT".to_string())).unwrap();
        let by_id = repo.get_player(&PlayerKey::ExternalId(300)).unwrap();
        let by_handle = repo.get_player(&PlayerKey::Handle("@knight".to_string())).unwrap();
        assert_eq!(by_nick, Some(added.clone()));
        assert_eq!(by_id, Some(added.clone()));
        assert_eq!(by_handle, Some(added));
        assert_eq!(repo.get_player(&PlayerKey::ExternalId(301)).unwrap(), None);
    }

    #[test]
    fn test_add_player_conflicts() {
        let (_dir, repo) = test_repo();
        let new = NewPlayer {
            external_id: 300,
            handle: "@knight".to_string(),
            nickname: "Lancelot".to_string(),
            screenshot_ref: None,
            added_by: 1,
        };
        repo.add_player(new.clone()).unwrap();

        assert!(matches!(
            repo.add_player(new.clone()),
            Err(RepositoryError::AlreadyMember { .. })
        ));
        let other_user = NewPlayer {
            external_id: 301,
            ..new
        };
        assert!(matches!(
            repo.add_player(other_user),
            Err(RepositoryError::NicknameTaken { .. })
        ));
    }

    #[test]
    fn test_lists_are_ordered_by_time_then_id() {
        let (_dir, repo) = test_repo();
        for (id, nick) in [(1, "Alpha"), (2, "Bravo"), (3, "Charlie")] {
            repo.create_pending(application(id, nick)).unwrap();
        }
        let names: Vec<String> = repo.list_pending().unwrap().into_iter().map(|p| p.nickname).collect();
        assert_eq!(names, vec!["Alpha", "Bravo", "Charlie"]);

        for pending in repo.list_pending().unwrap() {
            repo.approve_pending(pending.id, 9).unwrap();
        }
        let names: Vec<String> = repo.list_players(None).unwrap().into_iter().map(|p| p.nickname).collect();
        assert_eq!(names, vec!["Alpha", "Bravo", "Charlie"]);
    }
}
