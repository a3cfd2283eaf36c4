use core_types::RunMode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to load environment variables for database connection: {0}")]
    ConnectionConfigError(String),

    #[error("Database query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("An unfinished {0} run already exists.")]
    ActiveRunExists(RunMode),

    #[error("Row holds a value that cannot be decoded: {0}")]
    Corrupt(String),

    #[error("The requested data was not found in the database.")]
    NotFound,
}

impl DbError {
    /// Whether the error is the partial unique index on `runs(mode)` firing.
    pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
            _ => false,
        }
    }
}
