use async_trait::async_trait;
use common::ArticleId;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::store::StockStore;
use crate::{NewStock, Result, Stock, StoreError};

const SELECT_COLUMNS: &str = "SELECT id, article_id, quantity, reserved, min_stock, max_stock, location, created_at, updated_at FROM stocks";

/// Upper bound on how long a mutation waits for another transaction's row lock.
const LOCK_TIMEOUT: &str = "5s";

/// PostgreSQL-backed stock store.
///
/// Mutations read the row with `SELECT ... FOR UPDATE` inside a transaction,
/// apply the change in Rust and write both counters back before committing,
/// so concurrent reservations on one article serialize on the row lock.
#[derive(Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
}

impl PostgresStockStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_stock(row: PgRow) -> Result<Stock> {
        Ok(Stock {
            id: row.try_get::<Uuid, _>("id")?,
            article_id: ArticleId::new(row.try_get::<String, _>("article_id")?),
            quantity: row.try_get("quantity")?,
            reserved: row.try_get("reserved")?,
            min_stock: row.try_get("min_stock")?,
            max_stock: row.try_get("max_stock")?,
            location: row.try_get("location")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn mutate<F>(&self, article_id: &ArticleId, f: F) -> Result<Stock>
    where
        F: FnOnce(&mut Stock) -> Result<()> + Send,
    {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("SET LOCAL lock_timeout = '{LOCK_TIMEOUT}'"))
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE article_id = $1 FOR UPDATE"))
            .bind(article_id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(article_id.clone()))?;

        let mut stock = Self::row_to_stock(row)?;
        // Dropping the transaction on error rolls it back and releases the lock.
        f(&mut stock)?;

        let updated = sqlx::query(
            r#"
            UPDATE stocks
            SET quantity = $2, reserved = $3, updated_at = NOW()
            WHERE article_id = $1
            RETURNING updated_at
            "#,
        )
        .bind(article_id.as_str())
        .bind(stock.quantity)
        .bind(stock.reserved)
        .fetch_one(&mut *tx)
        .await?;
        stock.updated_at = updated.try_get("updated_at")?;

        tx.commit().await?;
        Ok(stock)
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    #[tracing::instrument(skip(self, new_stock), fields(article_id = %new_stock.article_id))]
    async fn create(&self, new_stock: NewStock) -> Result<Stock> {
        new_stock.validate()?;

        let result = sqlx::query(
            r#"
            INSERT INTO stocks (id, article_id, quantity, reserved, min_stock, max_stock, location)
            VALUES ($1, $2, $3, 0, $4, $5, $6)
            RETURNING id, article_id, quantity, reserved, min_stock, max_stock, location, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new_stock.article_id.as_str())
        .bind(new_stock.quantity)
        .bind(new_stock.min_stock)
        .bind(new_stock.max_stock)
        .bind(new_stock.location.as_deref())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Self::row_to_stock(row),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::AlreadyExists(new_stock.article_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, article_id: &ArticleId) -> Result<Stock> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE article_id = $1"))
            .bind(article_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(article_id.clone()))?;
        Self::row_to_stock(row)
    }

    async fn list(&self) -> Result<Vec<Stock>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} ORDER BY created_at DESC, article_id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_stock).collect()
    }

    async fn list_low_stock(&self) -> Result<Vec<Stock>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE quantity <= min_stock ORDER BY (quantity - min_stock) ASC, article_id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_stock).collect()
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
