//! Cache-aside reads with invalidate-on-write.
//!
//! A cached row is only ever a display copy. Decisions about reserving or
//! confirming stock always read the store itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::ArticleId;
use tokio::sync::RwLock;

use crate::store::StockStore;
use crate::{NewStock, Result, Stock};

/// Default lifetime of a cached row.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Key under which an article's row is cached.
pub fn cache_key(article_id: &ArticleId) -> String {
    format!("stock:{article_id}")
}

/// Read-through cache for stock rows.
#[async_trait]
pub trait StockCache: Send + Sync {
    /// Returns a cached row if one is present and fresh.
    async fn get(&self, article_id: &ArticleId) -> Option<Stock>;

    /// Stores a row.
    async fn put(&self, stock: &Stock);

    /// Evicts an article's row.
    async fn invalidate(&self, article_id: &ArticleId);
}

#[derive(Debug, Clone)]
struct CacheEntry {
    stock: Stock,
    expires_at: Instant,
}

/// In-process TTL cache.
#[derive(Debug, Clone)]
pub struct InMemoryStockCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl: Duration,
}

impl Default for InMemoryStockCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl InMemoryStockCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Number of entries held, fresh or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn contains(&self, article_id: &ArticleId) -> bool {
        self.entries
            .read()
            .await
            .contains_key(&cache_key(article_id))
    }
}

#[async_trait]
impl StockCache for InMemoryStockCache {
    async fn get(&self, article_id: &ArticleId) -> Option<Stock> {
        let key = cache_key(article_id);
        {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                Some(entry) if Instant::now() < entry.expires_at => {
                    return Some(entry.stock.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: drop it so the next reader goes straight to the store.
        self.entries.write().await.remove(&key);
        None
    }

    async fn put(&self, stock: &Stock) {
        let entry = CacheEntry {
            stock: stock.clone(),
            expires_at: Instant::now() + self.ttl,
        };
        self.entries
            .write()
            .await
            .insert(cache_key(&stock.article_id), entry);
    }

    async fn invalidate(&self, article_id: &ArticleId) {
        self.entries.write().await.remove(&cache_key(article_id));
    }
}

/// Decorates a store with cache-aside reads.
///
/// Every successful mutation evicts the article's entry before returning, so
/// no later read can observe the pre-write row. `get` stays authoritative;
/// only `get_cached` consults the cache.
#[derive(Debug, Clone)]
pub struct CachedStockStore<S, C> {
    inner: S,
    cache: C,
}

impl<S, C> CachedStockStore<S, C>
where
    S: StockStore,
    C: StockCache,
{
    pub fn new(inner: S, cache: C) -> Self {
        Self { inner, cache }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Display read: serves a fresh cached row or fills the cache from the store.
    ///
    /// After filling, the row is read again. A write that committed and
    /// evicted between the first read and the put would otherwise leave its
    /// pre-write row cached until the TTL runs out.
    #[tracing::instrument(skip(self))]
    pub async fn get_cached(&self, article_id: &ArticleId) -> Result<Stock> {
        if let Some(stock) = self.cache.get(article_id).await {
            tracing::trace!("cache hit");
            return Ok(stock);
        }

        let stock = self.inner.get(article_id).await?;
        self.cache.put(&stock).await;

        match self.inner.get(article_id).await {
            Ok(latest) if latest == stock => Ok(stock),
            Ok(latest) => {
                tracing::debug!("row changed while filling the cache");
                self.cache.invalidate(article_id).await;
                Ok(latest)
            }
            Err(_) => {
                self.cache.invalidate(article_id).await;
                Ok(stock)
            }
        }
    }

    async fn evict_after(&self, article_id: &ArticleId, result: Result<Stock>) -> Result<Stock> {
        let stock = result?;
        self.cache.invalidate(article_id).await;
        Ok(stock)
    }
}

#[async_trait]
impl<S, C> StockStore for CachedStockStore<S, C>
where
    S: StockStore,
    C: StockCache,
{
    async fn create(&self, new_stock: NewStock) -> Result<Stock> {
        let article_id = new_stock.article_id.clone();
        let result = self.inner.create(new_stock).await;
        self.evict_after(&article_id, result).await
    }

    async fn get(&self, article_id: &ArticleId) -> Result<Stock> {
        self.inner.get(article_id).await
    }

    async fn list(&self) -> Result<Vec<Stock>> {
        self.inner.list().await
    }

    async fn list_low_stock(&self) -> Result<Vec<Stock>> {
        self.inner.list_low_stock().await
    }

    async fn adjust_quantity(&self, article_id: &ArticleId, delta: i64) -> Result<Stock> {
        let result = self.inner.adjust_quantity(article_id, delta).await;
        self.evict_after(article_id, result).await
    }

    async fn reserve(&self, article_id: &ArticleId, quantity: i64) -> Result<Stock> {
        let result = self.inner.reserve(article_id, quantity).await;
        self.evict_after(article_id, result).await
    }

    async fn cancel_reservation(&self, article_id: &ArticleId, quantity: i64) -> Result<Stock> {
        let result = self.inner.cancel_reservation(article_id, quantity).await;
        self.evict_after(article_id, result).await
    }

    async fn confirm_reservation(&self, article_id: &ArticleId, quantity: i64) -> Result<Stock> {
        let result = self.inner.confirm_reservation(article_id, quantity).await;
        self.evict_after(article_id, result).await
    }
}
