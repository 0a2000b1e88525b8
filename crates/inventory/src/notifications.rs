//! Outbound stock alerts and the publishers that deliver them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ArticleId, OrderId};
use serde::{Deserialize, Serialize};
use stock_store::Stock;
use thiserror::Error;
use tokio::sync::Mutex;

/// Fired when an article's on-hand quantity drops to or below its minimum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockAlert {
    pub article_id: ArticleId,
    pub current_quantity: i64,
    pub min_quantity: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub alerted_at: DateTime<Utc>,
}

impl LowStockAlert {
    pub const ROUTING_KEY: &'static str = "stock.alert.low";

    pub fn from_stock(stock: &Stock) -> Self {
        Self {
            article_id: stock.article_id.clone(),
            current_quantity: stock.quantity,
            min_quantity: stock.min_stock,
            location: stock.location.clone(),
            alerted_at: Utc::now(),
        }
    }
}

/// Names the articles that could not be reserved for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsufficientStockAlert {
    pub order_id: OrderId,
    pub article_ids: Vec<ArticleId>,
}

impl InsufficientStockAlert {
    pub const ROUTING_KEY: &'static str = "insufficient_stock";
}

/// Errors from alert publishing.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Publisher unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Delivers alerts to the message bus.
///
/// Publishing is fire-and-forget from the caller's point of view: callers log
/// failures and carry on.
#[async_trait]
pub trait AlertPublisher: Send + Sync {
    async fn publish_low_stock(&self, alert: LowStockAlert) -> Result<(), PublishError>;

    async fn publish_insufficient_stock(
        &self,
        alert: InsufficientStockAlert,
    ) -> Result<(), PublishError>;
}

#[async_trait]
impl<T: AlertPublisher + ?Sized> AlertPublisher for Arc<T> {
    async fn publish_low_stock(&self, alert: LowStockAlert) -> Result<(), PublishError> {
        (**self).publish_low_stock(alert).await
    }

    async fn publish_insufficient_stock(
        &self,
        alert: InsufficientStockAlert,
    ) -> Result<(), PublishError> {
        (**self).publish_insufficient_stock(alert).await
    }
}

/// Publisher that writes each alert as a structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingAlertPublisher;

#[async_trait]
impl AlertPublisher for LoggingAlertPublisher {
    async fn publish_low_stock(&self, alert: LowStockAlert) -> Result<(), PublishError> {
        let payload = serde_json::to_string(&alert)?;
        tracing::warn!(
            routing_key = LowStockAlert::ROUTING_KEY,
            article_id = %alert.article_id,
            %payload,
            "low stock"
        );
        Ok(())
    }

    async fn publish_insufficient_stock(
        &self,
        alert: InsufficientStockAlert,
    ) -> Result<(), PublishError> {
        let payload = serde_json::to_string(&alert)?;
        tracing::warn!(
            routing_key = InsufficientStockAlert::ROUTING_KEY,
            order_id = %alert.order_id,
            %payload,
            "insufficient stock for order"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct PublishedAlerts {
    low_stock: Vec<LowStockAlert>,
    insufficient_stock: Vec<InsufficientStockAlert>,
}

/// In-memory publisher for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAlertPublisher {
    published: Arc<Mutex<PublishedAlerts>>,
    fail_on_publish: Arc<AtomicBool>,
}

impl InMemoryAlertPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every publish fail until reset.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.fail_on_publish.store(fail, Ordering::SeqCst);
    }

    pub async fn low_stock_alerts(&self) -> Vec<LowStockAlert> {
        self.published.lock().await.low_stock.clone()
    }

    pub async fn insufficient_stock_alerts(&self) -> Vec<InsufficientStockAlert> {
        self.published.lock().await.insufficient_stock.clone()
    }

    fn check(&self) -> Result<(), PublishError> {
        if self.fail_on_publish.load(Ordering::SeqCst) {
            return Err(PublishError::Unavailable("broker unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AlertPublisher for InMemoryAlertPublisher {
    async fn publish_low_stock(&self, alert: LowStockAlert) -> Result<(), PublishError> {
        self.check()?;
        self.published.lock().await.low_stock.push(alert);
        Ok(())
    }

    async fn publish_insufficient_stock(
        &self,
        alert: InsufficientStockAlert,
    ) -> Result<(), PublishError> {
        self.check()?;
        self.published.lock().await.insufficient_stock.push(alert);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use stock_store::NewStock;

    use super::*;

    #[test]
    fn low_stock_alert_carries_location() {
        let stock = NewStock::new("A1", 4)
            .min_stock(5)
            .location("bin-7")
            .into_stock(Utc::now());
        let alert = LowStockAlert::from_stock(&stock);

        assert_eq!(alert.current_quantity, 4);
        assert_eq!(alert.min_quantity, 5);
        assert_eq!(alert.location.as_deref(), Some("bin-7"));

        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["article_id"], "A1");
    }

    #[test]
    fn alert_without_location_omits_field() {
        let stock = NewStock::new("A1", 0).into_stock(Utc::now());
        let json = serde_json::to_value(LowStockAlert::from_stock(&stock)).unwrap();
        assert!(json.get("location").is_none());
    }

    #[tokio::test]
    async fn in_memory_publisher_records_and_fails_on_demand() {
        let publisher = InMemoryAlertPublisher::new();
        let alert = InsufficientStockAlert {
            order_id: OrderId::new("O1"),
            article_ids: vec![ArticleId::new("A2")],
        };

        publisher
            .publish_insufficient_stock(alert.clone())
            .await
            .unwrap();
        assert_eq!(publisher.insufficient_stock_alerts().await, vec![alert.clone()]);

        publisher.set_fail_on_publish(true);
        assert!(publisher.publish_insufficient_stock(alert).await.is_err());
        assert_eq!(publisher.insufficient_stock_alerts().await.len(), 1);
    }

    #[tokio::test]
    async fn shared_publisher_delegates() {
        let inner = InMemoryAlertPublisher::new();
        let shared: Arc<dyn AlertPublisher> = Arc::new(inner.clone());
        let stock = NewStock::new("A1", 1).min_stock(2).into_stock(Utc::now());

        shared
            .publish_low_stock(LowStockAlert::from_stock(&stock))
            .await
            .unwrap();
        assert_eq!(inner.low_stock_alerts().await.len(), 1);
    }
}
