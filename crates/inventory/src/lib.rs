//! Reservation coordinator for the stock engine.
//!
//! This crate provides:
//! - `StockService`, which enforces one live reservation per order and article
//!   and drives the stock store and ledger for reserve, confirm and cancel
//! - the `StockError` taxonomy with retryability classification
//! - low-stock and insufficient-stock alerts and their publishers

pub mod error;
pub mod notifications;
pub mod service;

pub use error::{Result, StockError};
pub use notifications::{
    AlertPublisher, InMemoryAlertPublisher, InsufficientStockAlert, LoggingAlertPublisher,
    LowStockAlert, PublishError,
};
pub use service::{DEFAULT_EVENTS_LIMIT, StockService};
