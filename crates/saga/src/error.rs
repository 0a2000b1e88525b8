//! Saga error types.

use common::{ArticleId, OrderId};
use inventory::StockError;
use thiserror::Error;

/// Errors that can occur while handling order messages.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The payload could not be decoded or failed validation.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// The message arrived on a topic this consumer does not handle.
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// A coordinator call failed for one line of an order.
    #[error("Stock operation failed for order {order_id}, article {article_id}: {source}")]
    Stock {
        order_id: OrderId,
        article_id: ArticleId,
        #[source]
        source: StockError,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
