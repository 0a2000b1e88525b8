//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use stock_bus::BusConfig;
use thiserror::Error;

/// A variable was set but could not be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value {value:?} for {key}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default `0.0.0.0`)
/// - `PORT`: listen port (default `8080`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset runs on in-memory backends
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default `5`)
/// - `STOCK_CACHE_TTL_SECS`: display cache TTL (default `300`)
/// - `STOCK_EVENTS_DEFAULT_LIMIT`: events returned when no limit is given (default `50`)
/// - `SAGA_WORKERS`: concurrent queued deliveries (default `4`)
/// - `SAGA_MAX_ATTEMPTS`: attempts before a requeued delivery is dead-lettered (default `5`)
/// - `KAFKA_BROKERS`: bootstrap servers; unset keeps alerts in the log and
///   order messages on the HTTP ingress only
/// - `KAFKA_GROUP_ID`: consumer group (default `stock-service`)
/// - `KAFKA_DEAD_LETTER_TOPIC`: topic for rejected order messages
///   (default `stock.orders.dead_letter`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub cache_ttl: Duration,
    pub events_default_limit: usize,
    pub saga_workers: usize,
    pub saga_max_attempts: u32,
    pub kafka_brokers: Option<String>,
    pub kafka_group_id: String,
    pub kafka_dead_letter_topic: String,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from any key lookup. Unset or empty keys fall back
    /// to defaults; set keys that do not parse are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse(&get, "PORT", defaults.port)?,
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: get("DATABASE_URL"),
            database_max_connections: parse(
                &get,
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,
            cache_ttl: Duration::from_secs(parse(
                &get,
                "STOCK_CACHE_TTL_SECS",
                defaults.cache_ttl.as_secs(),
            )?),
            events_default_limit: parse(
                &get,
                "STOCK_EVENTS_DEFAULT_LIMIT",
                defaults.events_default_limit,
            )?,
            saga_workers: parse(&get, "SAGA_WORKERS", defaults.saga_workers)?,
            saga_max_attempts: parse(&get, "SAGA_MAX_ATTEMPTS", defaults.saga_max_attempts)?,
            kafka_brokers: get("KAFKA_BROKERS"),
            kafka_group_id: get("KAFKA_GROUP_ID").unwrap_or(defaults.kafka_group_id),
            kafka_dead_letter_topic: get("KAFKA_DEAD_LETTER_TOPIC")
                .unwrap_or(defaults.kafka_dead_letter_topic),
        })
    }

    /// Bus settings, when a broker is configured.
    pub fn bus(&self) -> Option<BusConfig> {
        self.kafka_brokers.as_ref().map(|brokers| {
            BusConfig::new(brokers.trim())
                .group_id(&self.kafka_group_id)
                .dead_letter_topic(&self.kafka_dead_letter_topic)
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            database_url: None,
            database_max_connections: 5,
            cache_ttl: stock_store::cache::DEFAULT_TTL,
            events_default_limit: inventory::DEFAULT_EVENTS_LIMIT,
            saga_workers: saga::DEFAULT_WORKERS,
            saga_max_attempts: saga::DEFAULT_MAX_ATTEMPTS,
            kafka_brokers: None,
            kafka_group_id: stock_bus::DEFAULT_GROUP_ID.to_string(),
            kafka_dead_letter_topic: stock_bus::DEFAULT_DEAD_LETTER_TOPIC.to_string(),
        }
    }
}

fn parse<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.port, 8080);
        assert_eq!(config.database_url, None);
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.events_default_limit, 50);
        assert_eq!(config.saga_workers, 4);
        assert_eq!(config.saga_max_attempts, 5);
        assert!(config.bus().is_none());
    }

    #[test]
    fn test_bus_is_enabled_by_brokers() {
        let config = from_pairs(&[
            ("KAFKA_BROKERS", "kafka-1:9092,kafka-2:9092"),
            ("KAFKA_GROUP_ID", "stock-eu"),
        ])
        .unwrap();

        let bus = config.bus().unwrap();
        assert_eq!(bus.brokers, "kafka-1:9092,kafka-2:9092");
        assert_eq!(bus.group_id, "stock-eu");
        assert_eq!(bus.dead_letter_topic, "stock.orders.dead_letter");
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "9000"),
            ("DATABASE_URL", "postgres://localhost/stock"),
            ("STOCK_CACHE_TTL_SECS", "30"),
            ("SAGA_WORKERS", " 8 "),
        ])
        .unwrap();

        assert_eq!(config.addr(), "127.0.0.1:9000");
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/stock")
        );
        assert_eq!(config.cache_ttl, Duration::from_secs(30));
        assert_eq!(config.saga_workers, 8);
    }

    #[test]
    fn test_empty_values_use_defaults() {
        let config = from_pairs(&[("PORT", ""), ("DATABASE_URL", "  ")]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.database_url, None);
    }

    #[test]
    fn test_unparseable_value_is_an_error() {
        let err = from_pairs(&[("SAGA_MAX_ATTEMPTS", "many")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError {
                key: "SAGA_MAX_ATTEMPTS",
                value: "many".to_string()
            }
        );
    }
}
