use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::Row;

use crate::core::error::AppResult;
use crate::storage::migrations::run_migrations;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Text layout of stored timestamps. Fixed width, so text order is time order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const POOL_MAX_SIZE: u32 = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a new database connection pool
///
/// Every pooled connection waits up to 30 seconds on a locked database and
/// enforces foreign keys. Schema migrations run before the pool is returned.
///
/// # Arguments
///
/// * `database_path` - Path to SQLite database file
///
/// # Example
///
/// ```no_run
/// use clancore::storage::create_pool;
///
/// let pool = create_pool("clan.sqlite")?;
/// # Ok::<(), clancore::AppError>(())
/// ```
pub fn create_pool(database_path: impl AsRef<Path>) -> AppResult<DbPool> {
    let manager = SqliteConnectionManager::file(database_path.as_ref()).with_init(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(())
    });
    let pool = Pool::builder().max_size(POOL_MAX_SIZE).build(manager)?;

    let mut conn = pool.get()?;
    run_migrations(&mut conn)?;

    log::info!("Database ready at {}", database_path.as_ref().display());
    Ok(pool)
}

/// Get a connection from the pool. It returns to the pool when dropped.
pub fn get_connection(pool: &DbPool) -> Result<DbConnection, r2d2::Error> {
    pool.get()
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map(|naive| naive.and_utc())
}

pub(crate) fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn optional_timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

/// Reads a text column into a status enum.
pub(crate) fn status_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_text_roundtrip_keeps_micros() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap() + chrono::Duration::microseconds(42);
        let text = format_timestamp(at);
        assert_eq!(text, "2024-03-09 07:05:01.000042");
        assert_eq!(parse_timestamp(&text).unwrap(), at);
    }

    #[test]
    fn test_timestamp_text_sorts_chronologically() {
        let early = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap();
        assert!(format_timestamp(early) < format_timestamp(late));
    }

    #[test]
    fn test_create_pool_runs_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_pool(dir.path().join("clan.sqlite")).unwrap();
        let conn = get_connection(&pool).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM players", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
