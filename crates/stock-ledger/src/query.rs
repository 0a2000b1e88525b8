use common::{ArticleId, OrderId};

use crate::event::StockEventType;

/// Direction in which matching entries are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryOrder {
    /// Oldest first, in append order.
    #[default]
    Ascending,
    /// Most recent first.
    Descending,
}

/// Builder for constructing ledger queries.
///
/// Allows filtering entries by article, order and event type, with
/// pagination.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// Filter by article.
    pub article_id: Option<ArticleId>,

    /// Filter by order.
    pub order_id: Option<OrderId>,

    /// Filter by event types (any of these types).
    pub event_types: Option<Vec<StockEventType>>,

    /// Result order by sequence.
    pub order: QueryOrder,

    /// Maximum number of entries to return.
    pub limit: Option<usize>,

    /// Number of entries to skip.
    pub offset: Option<usize>,
}

impl EventQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for one article's history.
    pub fn for_article(article_id: ArticleId) -> Self {
        Self {
            article_id: Some(article_id),
            ..Default::default()
        }
    }

    /// Creates a query for every entry recorded against an order.
    pub fn for_order(order_id: OrderId) -> Self {
        Self {
            order_id: Some(order_id),
            ..Default::default()
        }
    }

    /// Filters by article.
    pub fn article_id(mut self, id: ArticleId) -> Self {
        self.article_id = Some(id);
        self
    }

    /// Filters by order.
    pub fn order_id(mut self, id: OrderId) -> Self {
        self.order_id = Some(id);
        self
    }

    /// Filters by event type.
    pub fn event_type(mut self, event_type: StockEventType) -> Self {
        self.event_types = Some(vec![event_type]);
        self
    }

    /// Filters by multiple event types (any of these).
    pub fn event_types(mut self, event_types: Vec<StockEventType>) -> Self {
        self.event_types = Some(event_types);
        self
    }

    /// Returns most recent entries first.
    pub fn newest_first(mut self) -> Self {
        self.order = QueryOrder::Descending;
        self
    }

    /// Limits the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips a number of results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_builder_sets_filters() {
        let query = EventQuery::for_article(ArticleId::new("A1"))
            .order_id(OrderId::new("O1"))
            .event_type(StockEventType::Reserve)
            .newest_first()
            .limit(10)
            .offset(5);

        assert_eq!(query.article_id, Some(ArticleId::new("A1")));
        assert_eq!(query.order_id, Some(OrderId::new("O1")));
        assert_eq!(query.event_types, Some(vec![StockEventType::Reserve]));
        assert_eq!(query.order, QueryOrder::Descending);
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, Some(5));
    }

    #[test]
    fn default_order_is_ascending() {
        let query = EventQuery::for_order(OrderId::new("O1"));
        assert_eq!(query.order, QueryOrder::Ascending);
        assert!(query.article_id.is_none());
    }
}
