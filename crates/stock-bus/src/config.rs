//! Client settings shared by the producer and the consumer.

use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::StreamConsumer;
use rdkafka::producer::FutureProducer;

use crate::error::{BusError, Result};

/// Consumer group used when none is configured.
pub const DEFAULT_GROUP_ID: &str = "stock-service";

/// Topic receiving deliveries that were rejected or ran out of attempts.
pub const DEFAULT_DEAD_LETTER_TOPIC: &str = "stock.orders.dead_letter";

/// Connection and topic settings for the bus.
///
/// ```no_run
/// use stock_bus::BusConfig;
///
/// let config = BusConfig::new("localhost:9092")
///     .group_id("stock-service-eu")
///     .dead_letter_topic("orders.dlq");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    pub brokers: String,
    pub group_id: String,
    pub dead_letter_topic: String,
    /// Where a new consumer group starts reading.
    pub auto_offset_reset: String,
    pub send_timeout: Duration,
}

impl BusConfig {
    pub fn new(brokers: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            group_id: DEFAULT_GROUP_ID.to_string(),
            dead_letter_topic: DEFAULT_DEAD_LETTER_TOPIC.to_string(),
            auto_offset_reset: "earliest".to_string(),
            send_timeout: Duration::from_secs(5),
        }
    }

    pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    pub fn dead_letter_topic(mut self, topic: impl Into<String>) -> Self {
        self.dead_letter_topic = topic.into();
        self
    }

    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = policy.into();
        self
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.brokers.trim().is_empty() {
            return Err(BusError::Config("brokers not configured".to_string()));
        }
        if self.group_id.trim().is_empty() {
            return Err(BusError::Config("consumer group not configured".to_string()));
        }
        Ok(())
    }

    pub(crate) fn producer(&self) -> Result<FutureProducer> {
        self.validate()?;
        let producer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("message.timeout.ms", self.send_timeout.as_millis().to_string())
            .set("acks", "all")
            .create()?;
        Ok(producer)
    }

    pub(crate) fn consumer(&self) -> Result<StreamConsumer> {
        self.validate()?;
        let consumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()?;
        Ok(consumer)
    }
}
