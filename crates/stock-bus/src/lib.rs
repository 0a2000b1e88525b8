//! Kafka-compatible message bus adapter for the stock engine.
//!
//! Connects the saga consumer and the alert publisher to a real broker
//! (Kafka, Redpanda or any other Kafka-protocol bus):
//! - [`KafkaOrderConsumer`] reads `orders_placed`, `orders_confirmed` and
//!   `order.canceled`, hands each record to a [`saga::DeliveryHandler`] and
//!   settles it from the returned [`saga::Disposition`]
//! - [`KafkaAlertPublisher`] writes low-stock and insufficient-stock alerts
//!   to the `stock.alert.low` and `insufficient_stock` topics
//!
//! # Delivery semantics
//!
//! Offsets are committed manually and only once a record is settled, so a
//! crash mid-handling redelivers it. Kafka has no per-message negative
//! acknowledgement, so settlement is expressed with topics:
//! - `Ack`: commit the offset
//! - `Requeue`: republish the payload to the same topic with the
//!   `x-delivery-attempt` header incremented, then commit
//! - `Reject`: republish to the dead-letter topic, then commit
//!
//! Records are handled one at a time per consumer. Scale out by running more
//! instances in the same consumer group.

pub mod config;
pub mod consumer;
pub mod error;
pub mod publisher;

pub use config::{BusConfig, DEFAULT_DEAD_LETTER_TOPIC, DEFAULT_GROUP_ID};
pub use consumer::{BusReport, KafkaOrderConsumer, Settlement};
pub use error::{BusError, Result};
pub use publisher::KafkaAlertPublisher;
