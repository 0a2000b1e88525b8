use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::ArticleId;
use tokio::sync::{Mutex, RwLock};

use crate::store::{StockStore, sort_most_critical_first};
use crate::{NewStock, Result, Stock, StoreError};

type Row = Arc<Mutex<Stock>>;

/// In-memory stock store.
///
/// Each article's row sits behind its own mutex, mirroring the row lock the
/// PostgreSQL store takes. The outer map lock is held only long enough to
/// find the row.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockStore {
    rows: Arc<RwLock<HashMap<ArticleId, Row>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryStockStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the number of articles stored.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store switched off".to_string(),
            ));
        }
        Ok(())
    }

    async fn row(&self, article_id: &ArticleId) -> Result<Row> {
        self.check_available()?;
        self.rows
            .read()
            .await
            .get(article_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(article_id.clone()))
    }

    /// Applies `f` to a copy of the row under its lock and commits the copy
    /// only if `f` succeeds.
    async fn mutate<F>(&self, article_id: &ArticleId, f: F) -> Result<Stock>
    where
        F: FnOnce(&mut Stock) -> Result<()> + Send,
    {
        let row = self.row(article_id).await?;
        let mut guard = row.lock().await;

        let mut updated = guard.clone();
        f(&mut updated)?;
        updated.updated_at = Utc::now();
        *guard = updated.clone();

        Ok(updated)
    }

    async fn snapshot(&self) -> Result<Vec<Stock>> {
        self.check_available()?;
        let rows: Vec<Row> = self.rows.read().await.values().cloned().collect();

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(row.lock().await.clone());
        }
        Ok(out)
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    #[tracing::instrument(skip(self, new_stock), fields(article_id = %new_stock.article_id))]
    async fn create(&self, new_stock: NewStock) -> Result<Stock> {
        self.check_available()?;
        new_stock.validate()?;

        let mut rows = self.rows.write().await;
        if rows.contains_key(&new_stock.article_id) {
            return Err(StoreError::AlreadyExists(new_stock.article_id));
        }

        let stock = new_stock.into_stock(Utc::now());
        rows.insert(
            stock.article_id.clone(),
            Arc::new(Mutex::new(stock.clone())),
        );
        Ok(stock)
    }

    async fn get(&self, article_id: &ArticleId) -> Result<Stock> {
        let row = self.row(article_id).await?;
        let stock = row.lock().await.clone();
        Ok(stock)
    }

    async fn list(&self) -> Result<Vec<Stock>> {
        let mut rows = self.snapshot().await?;
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.article_id.cmp(&b.article_id))
        });
        Ok(rows)
    }

    async fn list_low_stock(&self) -> Result<Vec<Stock>> {
        let mut rows: Vec<Stock> = self
            .snapshot()
            .await?
            .into_iter()
            .filter(Stock::is_low_stock)
            .collect();
        sort_most_critical_first(&mut rows);
        Ok(rows)
    }

    #[tracing::instrument(skip(self))]
    async fn adjust_quantity(&self, article_id: &ArticleId, delta: i64) -> Result<Stock> {
        self.mutate(article_id, |s| s.adjust(delta)).await
    }

    #[tracing::instrument(skip(self))]
    async fn reserve(&self, article_id: &ArticleId, quantity: i64) -> Result<Stock> {
        self.mutate(article_id, |s| s.reserve(quantity)).await
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_reservation(&self, article_id: &ArticleId, quantity: i64) -> Result<Stock> {
        self.mutate(article_id, |s| s.cancel_reservation(quantity))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn confirm_reservation(&self, article_id: &ArticleId, quantity: i64) -> Result<Stock> {
        self.mutate(article_id, |s| s.confirm_reservation(quantity))
            .await
    }
}
