use std::collections::BTreeMap;

use async_trait::async_trait;
use common::{ArticleId, OrderId};

use crate::lifecycle::{ReservationState, derive_order_reservations, derive_reservation};
use crate::{EventQuery, NewStockEvent, Result, StockEvent};

/// Core trait for stock ledger implementations.
///
/// The ledger is append-only: entries are never updated or deleted. Every
/// append is assigned a sequence strictly greater than all earlier ones.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Appends an entry and returns it with id, sequence and timestamp set.
    async fn append(&self, event: NewStockEvent) -> Result<StockEvent>;

    /// Retrieves entries matching a query.
    async fn query_events(&self, query: EventQuery) -> Result<Vec<StockEvent>>;

    /// Retrieves every entry recorded against an order, across all articles,
    /// in append order.
    async fn events_for_order(&self, order_id: &OrderId) -> Result<Vec<StockEvent>> {
        self.query_events(EventQuery::for_order(order_id.clone()))
            .await
    }

    /// Retrieves an article's most recent entries, newest first.
    async fn events_for_article(
        &self,
        article_id: &ArticleId,
        limit: usize,
    ) -> Result<Vec<StockEvent>> {
        self.query_events(
            EventQuery::for_article(article_id.clone())
                .newest_first()
                .limit(limit),
        )
        .await
    }
}

/// Extension trait deriving reservation lifecycle from any ledger.
#[async_trait]
pub trait StockLedgerExt: StockLedger {
    /// Derives the state of the reservation an order holds on an article.
    async fn reservation_state(
        &self,
        order_id: &OrderId,
        article_id: &ArticleId,
    ) -> Result<ReservationState> {
        let events = self
            .query_events(
                EventQuery::for_order(order_id.clone()).article_id(article_id.clone()),
            )
            .await?;
        Ok(derive_reservation(&events, order_id, article_id))
    }

    /// Returns true iff the derived state for the pair is ACTIVE.
    async fn has_active_reservation(
        &self,
        order_id: &OrderId,
        article_id: &ArticleId,
    ) -> Result<bool> {
        Ok(self
            .reservation_state(order_id, article_id)
            .await?
            .is_active())
    }

    /// Derives the reservation state of every article an order touched.
    async fn order_reservations(
        &self,
        order_id: &OrderId,
    ) -> Result<BTreeMap<ArticleId, ReservationState>> {
        let events = self.events_for_order(order_id).await?;
        Ok(derive_order_reservations(&events, order_id))
    }
}

// Blanket implementation for all StockLedger implementations
impl<T: StockLedger + ?Sized> StockLedgerExt for T {}
