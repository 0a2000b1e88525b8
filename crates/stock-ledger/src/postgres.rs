use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ArticleId, OrderId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::ledger::StockLedger;
use crate::query::QueryOrder;
use crate::{EventId, EventQuery, NewStockEvent, Result, Sequence, StockEvent, StockEventType};

const SELECT_COLUMNS: &str =
    "SELECT id, seq, article_id, event_type, quantity, order_id, reason, created_at FROM stock_events";

/// PostgreSQL-backed stock ledger.
///
/// Sequences come from the `seq BIGSERIAL` column, so ordering holds across
/// processes sharing the database.
#[derive(Clone)]
pub struct PostgresStockLedger {
    pool: PgPool,
}

impl PostgresStockLedger {
    /// Creates a new PostgreSQL ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_event(row: PgRow) -> Result<StockEvent> {
        let event_type: String = row.try_get("event_type")?;
        let order_id: Option<String> = row.try_get("order_id")?;

        Ok(StockEvent {
            id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            sequence: Sequence::new(row.try_get("seq")?),
            article_id: ArticleId::new(row.try_get::<String, _>("article_id")?),
            event_type: event_type.parse()?,
            quantity: row.try_get("quantity")?,
            order_id: order_id.map(OrderId::new),
            reason: row.try_get("reason")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }
}

#[async_trait]
impl StockLedger for PostgresStockLedger {
    #[tracing::instrument(skip(self, event), fields(article_id = %event.article_id, event_type = %event.event_type))]
    async fn append(&self, event: NewStockEvent) -> Result<StockEvent> {
        let id = EventId::new();

        let row = sqlx::query(
            r#"
            INSERT INTO stock_events (id, article_id, event_type, quantity, order_id, reason)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING seq, created_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(event.article_id.as_str())
        .bind(event.event_type.as_str())
        .bind(event.quantity)
        .bind(event.order_id.as_ref().map(|o| o.as_str()))
        .bind(&event.reason)
        .fetch_one(&self.pool)
        .await?;

        Ok(StockEvent {
            id,
            sequence: Sequence::new(row.try_get("seq")?),
            article_id: event.article_id,
            event_type: event.event_type,
            quantity: event.quantity,
            order_id: event.order_id,
            reason: event.reason,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn query_events(&self, query: EventQuery) -> Result<Vec<StockEvent>> {
        let mut sql = format!("{SELECT_COLUMNS} WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.article_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND article_id = ${param_count}"));
        }
        if query.order_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND order_id = ${param_count}"));
        }
        if query.event_types.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND event_type = ANY(${param_count})"));
        }

        match query.order {
            QueryOrder::Ascending => sql.push_str(" ORDER BY seq ASC"),
            QueryOrder::Descending => sql.push_str(" ORDER BY seq DESC"),
        }

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(ref id) = query.article_id {
            sqlx_query = sqlx_query.bind(id.as_str());
        }
        if let Some(ref id) = query.order_id {
            sqlx_query = sqlx_query.bind(id.as_str());
        }
        if let Some(ref types) = query.event_types {
            let tags: Vec<&str> = types.iter().map(StockEventType::as_str).collect();
            sqlx_query = sqlx_query.bind(tags);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_event).collect()
    }
}
