//! Stock alerts published to the bus.

use std::time::Duration;

use async_trait::async_trait;
use inventory::{AlertPublisher, InsufficientStockAlert, LowStockAlert, PublishError};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;

use crate::config::BusConfig;
use crate::error::Result;

/// Publishes each alert as JSON to the topic named by its routing key.
///
/// Low-stock alerts are keyed by article and insufficient-stock alerts by
/// order, so alerts about one subject stay ordered within a partition.
#[derive(Clone)]
pub struct KafkaAlertPublisher {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaAlertPublisher {
    pub fn new(config: &BusConfig) -> Result<Self> {
        let producer = config.producer()?;
        tracing::info!(brokers = %config.brokers, "alert publisher connected");
        Ok(Self {
            producer,
            timeout: config.send_timeout,
        })
    }

    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> std::result::Result<(), PublishError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);
        match self.producer.send(record, Timeout::After(self.timeout)).await {
            Ok((partition, offset)) => {
                tracing::debug!(topic, key, partition, offset, "alert published");
                Ok(())
            }
            Err((e, _)) => {
                tracing::error!(topic, key, error = %e, "failed to publish alert");
                Err(PublishError::Unavailable(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl AlertPublisher for KafkaAlertPublisher {
    async fn publish_low_stock(&self, alert: LowStockAlert) -> std::result::Result<(), PublishError> {
        let payload = serde_json::to_vec(&alert)?;
        self.send(LowStockAlert::ROUTING_KEY, alert.article_id.as_str(), &payload)
            .await
    }

    async fn publish_insufficient_stock(
        &self,
        alert: InsufficientStockAlert,
    ) -> std::result::Result<(), PublishError> {
        let payload = serde_json::to_vec(&alert)?;
        self.send(
            InsufficientStockAlert::ROUTING_KEY,
            alert.order_id.as_str(),
            &payload,
        )
        .await
    }
}
