//! Authoritative per-article stock counters.
//!
//! The store is the only component that mutates `quantity` and `reserved`.
//! Both backends serialize mutations per article: the in-memory store with a
//! mutex per row, PostgreSQL with `SELECT ... FOR UPDATE`.

pub mod cache;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod stock;
pub mod store;

pub use cache::{CachedStockStore, InMemoryStockCache, StockCache, cache_key};
pub use error::{Result, StoreError};
pub use memory::InMemoryStockStore;
pub use postgres::PostgresStockStore;
pub use stock::{NewStock, Stock};
pub use store::StockStore;
