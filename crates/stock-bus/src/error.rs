use rdkafka::error::KafkaError;
use thiserror::Error;

/// Errors from the bus adapter.
#[derive(Debug, Error)]
pub enum BusError {
    /// The Kafka client could not be created or subscribed.
    #[error("Kafka client error: {0}")]
    Client(#[from] KafkaError),

    /// Required configuration is missing.
    #[error("Bus configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BusError>;
