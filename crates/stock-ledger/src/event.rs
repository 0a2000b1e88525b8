use chrono::{DateTime, Utc};
use common::{ArticleId, OrderId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::LedgerError;

/// Unique identifier for a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an event in the ledger's append order.
///
/// Sequences are assigned by the ledger at append time and are strictly
/// increasing across the whole ledger. Lifecycle derivation orders by
/// sequence, never by wall-clock time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Sequence(i64);

impl Sequence {
    /// Creates a sequence from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// The position before the first appended event.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the next sequence.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw sequence value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of quantity-affecting action recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockEventType {
    /// Article created with its initial quantity.
    Add,
    /// Units added to an existing article.
    Replenish,
    /// Units removed directly. Ledgers written before `ConfirmReserve`
    /// existed also used this tag, with an order id, for confirmations.
    Deduct,
    /// Units provisionally held for an order.
    Reserve,
    /// A reservation released without deducting.
    CancelReserve,
    /// A reservation converted into a permanent deduction.
    ConfirmReserve,
}

impl StockEventType {
    /// Returns the persisted tag for this event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            StockEventType::Add => "ADD",
            StockEventType::Replenish => "REPLENISH",
            StockEventType::Deduct => "DEDUCT",
            StockEventType::Reserve => "RESERVE",
            StockEventType::CancelReserve => "CANCEL_RESERVE",
            StockEventType::ConfirmReserve => "CONFIRM_RESERVE",
        }
    }
}

impl std::fmt::Display for StockEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StockEventType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADD" => Ok(StockEventType::Add),
            "REPLENISH" => Ok(StockEventType::Replenish),
            "DEDUCT" => Ok(StockEventType::Deduct),
            "RESERVE" => Ok(StockEventType::Reserve),
            "CANCEL_RESERVE" => Ok(StockEventType::CancelReserve),
            "CONFIRM_RESERVE" => Ok(StockEventType::ConfirmReserve),
            other => Err(LedgerError::UnknownEventType(other.to_string())),
        }
    }
}

/// An immutable entry of the stock ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockEvent {
    /// Unique identifier for this entry.
    pub id: EventId,

    /// Append position, used for lifecycle ordering.
    pub sequence: Sequence,

    /// The article whose quantities changed.
    pub article_id: ArticleId,

    /// What happened.
    pub event_type: StockEventType,

    /// Units affected by the action.
    pub quantity: i64,

    /// The order the action was taken for, if any.
    pub order_id: Option<OrderId>,

    /// Free-text reason supplied by the caller.
    pub reason: String,

    /// When the ledger accepted the entry. Informational only.
    pub created_at: DateTime<Utc>,
}

impl StockEvent {
    /// Returns true if this entry belongs to the given reservation pair.
    pub fn concerns(&self, order_id: &OrderId, article_id: &ArticleId) -> bool {
        self.article_id == *article_id && self.order_id.as_ref() == Some(order_id)
    }
}

/// An entry waiting to be appended. The ledger assigns id, sequence and
/// timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStockEvent {
    pub article_id: ArticleId,
    pub event_type: StockEventType,
    pub quantity: i64,
    pub order_id: Option<OrderId>,
    pub reason: String,
}

impl NewStockEvent {
    fn new(article_id: ArticleId, event_type: StockEventType, quantity: i64) -> Self {
        Self {
            article_id,
            event_type,
            quantity,
            order_id: None,
            reason: String::new(),
        }
    }

    /// Records the creation of an article.
    pub fn add(article_id: ArticleId, quantity: i64) -> Self {
        Self::new(article_id, StockEventType::Add, quantity)
            .reason("new article added to inventory")
    }

    /// Records units added to an article.
    pub fn replenish(article_id: ArticleId, quantity: i64) -> Self {
        Self::new(article_id, StockEventType::Replenish, quantity)
    }

    /// Records a direct deduction not tied to any order.
    pub fn deduct(article_id: ArticleId, quantity: i64) -> Self {
        Self::new(article_id, StockEventType::Deduct, quantity)
    }

    /// Records a reservation for an order.
    pub fn reserve(order_id: OrderId, article_id: ArticleId, quantity: i64) -> Self {
        let reason = format!("stock reserved for order {order_id}");
        Self::new(article_id, StockEventType::Reserve, quantity)
            .order(order_id)
            .reason(reason)
    }

    /// Records the release of a reservation.
    pub fn cancel_reservation(order_id: OrderId, article_id: ArticleId, quantity: i64) -> Self {
        let reason = format!("reservation cancelled for order {order_id}");
        Self::new(article_id, StockEventType::CancelReserve, quantity)
            .order(order_id)
            .reason(reason)
    }

    /// Records the confirmation of a reservation.
    pub fn confirm_reservation(order_id: OrderId, article_id: ArticleId, quantity: i64) -> Self {
        let reason = format!("stock deducted on confirmation of order {order_id}");
        Self::new(article_id, StockEventType::ConfirmReserve, quantity)
            .order(order_id)
            .reason(reason)
    }

    /// Attaches an order id.
    pub fn order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    /// Replaces the reason. Blank reasons keep the generated default.
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        if !reason.trim().is_empty() {
            self.reason = reason;
        }
        self
    }

    /// Turns the pending entry into a stored one.
    pub fn into_event(self, sequence: Sequence, created_at: DateTime<Utc>) -> StockEvent {
        StockEvent {
            id: EventId::new(),
            sequence,
            article_id: self.article_id,
            event_type: self.event_type,
            quantity: self.quantity,
            order_id: self.order_id,
            reason: self.reason,
            created_at,
        }
    }
}
