//! Reservation coordinator error types.

use common::{ArticleId, OrderId};
use stock_ledger::LedgerError;
use stock_store::StoreError;
use thiserror::Error;

/// Errors surfaced by [`StockService`](crate::StockService).
#[derive(Debug, Error)]
pub enum StockError {
    #[error("Stock not found for article {0}")]
    NotFound(ArticleId),

    #[error("Stock already exists for article {0}")]
    AlreadyExists(ArticleId),

    #[error("Insufficient stock for article {article_id}: available {available}, requested {requested}")]
    InsufficientStock {
        article_id: ArticleId,
        available: i64,
        requested: i64,
    },

    #[error("Insufficient reserved stock for article {article_id}: reserved {reserved}, requested {requested}")]
    InsufficientReserved {
        article_id: ArticleId,
        reserved: i64,
        requested: i64,
    },

    /// The order already holds a live reservation on the article.
    #[error("Order {order_id} already has an active reservation for article {article_id}")]
    DuplicateReservation {
        order_id: OrderId,
        article_id: ArticleId,
    },

    #[error("No active reservation for order {order_id} and article {article_id}")]
    NoActiveReservation {
        order_id: OrderId,
        article_id: ArticleId,
    },

    #[error("Reservation for order {order_id} and article {article_id} is already cancelled")]
    AlreadyCancelled {
        order_id: OrderId,
        article_id: ArticleId,
    },

    #[error("Reservation for order {order_id} and article {article_id} is already confirmed")]
    AlreadyConfirmed {
        order_id: OrderId,
        article_id: ArticleId,
    },

    #[error("Quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    #[error("Invalid stock state for article {article_id}: {reason}")]
    InvalidState { article_id: ArticleId, reason: String },

    /// Connectivity or lock-timeout failure in the stock store.
    #[error("Transient store error: {0}")]
    TransientStore(#[source] StoreError),

    /// A store failure that repeating the call will not fix, such as a
    /// schema mismatch.
    #[error("Store error: {0}")]
    Storage(#[source] StoreError),

    /// The ledger could not be read, so reservation state is unknown.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl StockError {
    /// True when repeating the call may succeed. Business-rule violations
    /// never are.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StockError::TransientStore(_) | StockError::Ledger(_))
    }

    /// Short machine-readable name, used as a metrics label and in HTTP bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            StockError::NotFound(_) => "not_found",
            StockError::AlreadyExists(_) => "already_exists",
            StockError::InsufficientStock { .. } => "insufficient_stock",
            StockError::InsufficientReserved { .. } => "insufficient_reserved",
            StockError::DuplicateReservation { .. } => "duplicate_reservation",
            StockError::NoActiveReservation { .. } => "no_active_reservation",
            StockError::AlreadyCancelled { .. } => "already_cancelled",
            StockError::AlreadyConfirmed { .. } => "already_confirmed",
            StockError::InvalidQuantity(_) => "invalid_quantity",
            StockError::InvalidState { .. } => "invalid_state",
            StockError::TransientStore(_) => "transient_store",
            StockError::Storage(_) => "storage",
            StockError::Ledger(_) => "ledger",
        }
    }
}

impl From<StoreError> for StockError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => StockError::NotFound(id),
            StoreError::AlreadyExists(id) => StockError::AlreadyExists(id),
            StoreError::InsufficientStock {
                article_id,
                available,
                requested,
            } => StockError::InsufficientStock {
                article_id,
                available,
                requested,
            },
            StoreError::InsufficientReserved {
                article_id,
                reserved,
                requested,
            } => StockError::InsufficientReserved {
                article_id,
                reserved,
                requested,
            },
            StoreError::InvalidState { article_id, reason } => {
                StockError::InvalidState { article_id, reason }
            }
            StoreError::InvalidQuantity(q) => StockError::InvalidQuantity(q),
            e @ (StoreError::Unavailable(_) | StoreError::Database(_)) => {
                if e.is_transient() {
                    StockError::TransientStore(e)
                } else {
                    StockError::Storage(e)
                }
            }
        }
    }
}

/// Result type for coordinator operations.
pub type Result<T> = std::result::Result<T, StockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_keep_their_meaning() {
        let err: StockError = StoreError::InsufficientStock {
            article_id: ArticleId::new("A1"),
            available: 3,
            requested: 5,
        }
        .into();
        assert!(matches!(
            err,
            StockError::InsufficientStock {
                available: 3,
                requested: 5,
                ..
            }
        ));
        assert!(!err.is_retryable());

        let err: StockError = StoreError::NotFound(ArticleId::new("A1")).into();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn infrastructure_failures_are_retryable() {
        let err: StockError = StoreError::Unavailable("down".into()).into();
        assert!(matches!(err, StockError::TransientStore(_)));
        assert!(err.is_retryable());

        let err: StockError = LedgerError::Unavailable("down".into()).into();
        assert!(err.is_retryable());

        let err: StockError = StoreError::Database(sqlx::Error::PoolTimedOut).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn schema_failures_are_not_retried() {
        let err: StockError =
            StoreError::Database(sqlx::Error::ColumnNotFound("reserved".into())).into();
        assert!(matches!(err, StockError::Storage(_)));
        assert_eq!(err.kind(), "storage");
        assert!(!err.is_retryable());
    }

    #[test]
    fn business_rule_violations_are_terminal() {
        let order_id = OrderId::new("O1");
        let article_id = ArticleId::new("A1");
        for err in [
            StockError::DuplicateReservation {
                order_id: order_id.clone(),
                article_id: article_id.clone(),
            },
            StockError::AlreadyCancelled {
                order_id: order_id.clone(),
                article_id: article_id.clone(),
            },
            StockError::AlreadyConfirmed {
                order_id: order_id.clone(),
                article_id: article_id.clone(),
            },
        ] {
            assert!(!err.is_retryable(), "{err}");
        }
    }
}
