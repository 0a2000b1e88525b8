//! Append-only stock ledger.
//!
//! Every quantity-affecting action is recorded here. The ledger is an audit
//! trail and the source from which reservation lifecycle is derived; the
//! authoritative counters live in the stock store.

pub mod error;
pub mod event;
pub mod ledger;
pub mod lifecycle;
pub mod memory;
pub mod postgres;
pub mod query;

pub use error::{LedgerError, Result};
pub use event::{EventId, NewStockEvent, Sequence, StockEvent, StockEventType};
pub use ledger::{StockLedger, StockLedgerExt};
pub use lifecycle::{
    ReservationState, ReservationStatus, derive_order_reservations, derive_reservation,
};
pub use memory::InMemoryStockLedger;
pub use postgres::PostgresStockLedger;
pub use query::{EventQuery, QueryOrder};
