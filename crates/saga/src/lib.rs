//! Order saga consumer for the stock engine.
//!
//! Order lifecycle messages arrive at least once from the message bus. This
//! crate turns them into reservation calls:
//! 1. `orders_placed`: reserve every line, then commit or compensate
//! 2. `orders_confirmed`: confirm every line, requeue on failure
//! 3. `order.canceled`: release whatever can be released
//!
//! Placement classification is a pure function over line outcomes
//! (`placement`), separate from delivery mechanics (`worker`, `broker`).

pub mod broker;
pub mod consumer;
pub mod delivery;
pub mod error;
pub mod messages;
pub mod placement;
pub mod worker;

pub use broker::{DeadLetter, InMemoryBroker};
pub use consumer::{CancellationSummary, COMPENSATION_REASON, CONFIRM_REASON, OrderSagaConsumer};
pub use delivery::{ATTEMPT_HEADER, Delivery, Disposition};
pub use error::{Result, SagaError};
pub use messages::{OrderCanceled, OrderConfirmed, OrderLine, OrderMessage, OrderPlaced, Topic};
pub use placement::{PlacementDecision, PlacementReport};
pub use worker::{
    ConsumerPool, DEFAULT_MAX_ATTEMPTS, DEFAULT_WORKERS, DeliveryHandler, PoolReport,
};
