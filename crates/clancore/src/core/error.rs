use thiserror::Error;

use crate::core::config::ConfigError;
use crate::core::validation::ValidationError;
use crate::storage::RepositoryError;

/// Centralized error type for startup and infrastructure failures
///
/// Per-operation errors (`RepositoryError`, `AdminError`, `ValidationError`)
/// convert into this enum when they escape to the binary's top level.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// Schema migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] refinery::Error),

    /// Repository errors
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Logger setup errors
    #[error("Logger error: {0}")]
    Logger(#[from] log::SetLoggerError),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;
