pub mod health;
pub mod messages;
pub mod metrics;
pub mod reservations;
pub mod stock;
