//! Identifier types shared by every layer of the stock reservation engine.

mod types;

pub use types::{ArticleId, OrderId};
