use thiserror::Error;

/// Errors that can occur when reading from or appending to the stock ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row carried an event type this version does not know.
    #[error("Unknown stock event type: {0}")]
    UnknownEventType(String),

    /// The ledger is temporarily unable to serve the request.
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
