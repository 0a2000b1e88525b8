use async_trait::async_trait;
use common::ArticleId;

use crate::{NewStock, Result, Stock};

/// Durable per-article counters.
///
/// Every mutation runs under an exclusive lock on the article's row and
/// returns the row as committed. Operations on different articles never share
/// a lock. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Inserts a new row with `reserved = 0`. Fails with `AlreadyExists`.
    async fn create(&self, new_stock: NewStock) -> Result<Stock>;

    /// Reads a row. Fails with `NotFound`.
    async fn get(&self, article_id: &ArticleId) -> Result<Stock>;

    /// All rows, most recently created first.
    async fn list(&self) -> Result<Vec<Stock>>;

    /// Rows with `quantity <= min_stock`, most critical first.
    async fn list_low_stock(&self) -> Result<Vec<Stock>>;

    /// Adds `delta` to the on-hand quantity under the row lock. A negative
    /// delta fails with `InsufficientStock` if it would touch reserved units.
    async fn adjust_quantity(&self, article_id: &ArticleId, delta: i64) -> Result<Stock>;

    /// Holds `quantity` units if that many are available.
    async fn reserve(&self, article_id: &ArticleId, quantity: i64) -> Result<Stock>;

    /// Releases `quantity` held units.
    async fn cancel_reservation(&self, article_id: &ArticleId, quantity: i64) -> Result<Stock>;

    /// Deducts `quantity` held units from both counters.
    async fn confirm_reservation(&self, article_id: &ArticleId, quantity: i64) -> Result<Stock>;
}

/// Orders rows the way `list_low_stock` returns them.
pub(crate) fn sort_most_critical_first(rows: &mut [Stock]) {
    rows.sort_by(|a, b| {
        (a.quantity - a.min_stock)
            .cmp(&(b.quantity - b.min_stock))
            .then_with(|| a.article_id.cmp(&b.article_id))
    });
}
