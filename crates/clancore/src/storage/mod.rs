//! Persistence: connection pool, migrations and the clan repository.

pub mod db;
pub mod memory;
pub mod migrations;
pub mod repository;
pub mod sqlite;

pub use db::{create_pool, get_connection, DbConnection, DbPool};
pub use memory::InMemoryRepository;
pub use migrations::run_migrations;
pub use repository::{ClanRepository, ErrorKind, PlayerKey, RepositoryError, RepositoryResult};
pub use sqlite::SqliteRepository;
