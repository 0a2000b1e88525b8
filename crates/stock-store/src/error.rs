use common::ArticleId;
use thiserror::Error;

/// Errors returned by stock store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No row exists for the article.
    #[error("Stock not found for article {0}")]
    NotFound(ArticleId),

    /// A row already exists for the article.
    #[error("Stock already exists for article {0}")]
    AlreadyExists(ArticleId),

    /// Not enough unreserved units to satisfy the request.
    #[error("Insufficient stock for article {article_id}: available {available}, requested {requested}")]
    InsufficientStock {
        article_id: ArticleId,
        available: i64,
        requested: i64,
    },

    /// Not enough reserved units to confirm.
    #[error("Insufficient reserved stock for article {article_id}: reserved {reserved}, requested {requested}")]
    InsufficientReserved {
        article_id: ArticleId,
        reserved: i64,
        requested: i64,
    },

    /// The mutation would break `0 <= reserved <= quantity`.
    #[error("Invalid stock state for article {article_id}: {reason}")]
    InvalidState { article_id: ArticleId, reason: String },

    /// Quantities passed to the store must be positive (or non-negative for absolute values).
    #[error("Invalid quantity {0}")]
    InvalidQuantity(i64),

    /// The store is temporarily unable to serve the request.
    #[error("Stock store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// SQLSTATEs worth retrying: lock_not_available (raised by `lock_timeout`),
/// serialization_failure and deadlock_detected.
const TRANSIENT_SQLSTATES: [&str; 3] = ["55P03", "40001", "40P01"];

impl StoreError {
    /// Returns true for failures that may succeed if the call is repeated
    /// (connectivity, lock timeouts). Business-rule failures and schema or
    /// decoding errors are never transient.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(e) => is_transient_sqlx(e),
            _ => false,
        }
    }
}

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| TRANSIENT_SQLSTATES.contains(&code.as_ref())),
        _ => false,
    }
}

/// Result type for stock store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
