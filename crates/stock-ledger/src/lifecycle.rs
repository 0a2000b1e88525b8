//! Reservation lifecycle derived from the ledger.
//!
//! Reservations are not stored as records. Their state is a fold over the
//! ledger entries of one `(order, article)` pair, taken in sequence order.
//!
//! ```text
//!            RESERVE                CONFIRM_RESERVE / DEDUCT(order)
//! None ──────────────► Active ──┬──────────────────────────────► Confirmed
//!   ▲                    ▲      │
//!   │                    │      │ CANCEL_RESERVE
//!   │          RESERVE   │      ▼
//!   └────────────────────┴─ Cancelled
//! ```

use std::collections::BTreeMap;

use common::{ArticleId, OrderId};
use serde::{Deserialize, Serialize};

use crate::event::{Sequence, StockEvent, StockEventType};

/// Status of a reservation without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    None,
    Active,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    /// Returns the status name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::None => "NONE",
            ReservationStatus::Active => "ACTIVE",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived state of the reservation held by one order on one article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationState {
    /// No RESERVE entry exists for the pair.
    #[default]
    None,
    /// A RESERVE entry is live.
    Active { quantity: i64, reserved_at: Sequence },
    /// The latest reservation was converted into a deduction.
    Confirmed { quantity: i64, reserved_at: Sequence },
    /// The latest reservation was released.
    Cancelled { quantity: i64, reserved_at: Sequence },
}

impl ReservationState {
    /// Advances the state by one ledger entry of the same pair.
    pub fn apply(self, event: &StockEvent) -> Self {
        match (self, event.event_type) {
            (previous, StockEventType::Reserve) => {
                if previous.is_active() {
                    tracing::warn!(
                        article_id = %event.article_id,
                        order_id = ?event.order_id,
                        sequence = %event.sequence,
                        "second live RESERVE for the same pair, newest wins"
                    );
                }
                ReservationState::Active {
                    quantity: event.quantity,
                    reserved_at: event.sequence,
                }
            }
            (
                ReservationState::Active {
                    quantity,
                    reserved_at,
                },
                StockEventType::CancelReserve,
            ) => ReservationState::Cancelled {
                quantity,
                reserved_at,
            },
            (
                ReservationState::Active {
                    quantity,
                    reserved_at,
                },
                StockEventType::ConfirmReserve | StockEventType::Deduct,
            ) => ReservationState::Confirmed {
                quantity,
                reserved_at,
            },
            (state, _) => state,
        }
    }

    /// Returns the status without payload.
    pub fn status(&self) -> ReservationStatus {
        match self {
            ReservationState::None => ReservationStatus::None,
            ReservationState::Active { .. } => ReservationStatus::Active,
            ReservationState::Confirmed { .. } => ReservationStatus::Confirmed,
            ReservationState::Cancelled { .. } => ReservationStatus::Cancelled,
        }
    }

    /// Returns true if the reservation is currently holding units.
    pub fn is_active(&self) -> bool {
        matches!(self, ReservationState::Active { .. })
    }

    /// Returns the reserved quantity of the latest reservation, if any.
    pub fn quantity(&self) -> Option<i64> {
        match self {
            ReservationState::None => None,
            ReservationState::Active { quantity, .. }
            | ReservationState::Confirmed { quantity, .. }
            | ReservationState::Cancelled { quantity, .. } => Some(*quantity),
        }
    }
}

/// Derives the reservation state of one pair from any set of ledger entries.
///
/// Entries of other pairs are ignored and the input order does not matter.
pub fn derive_reservation<'a, I>(
    events: I,
    order_id: &OrderId,
    article_id: &ArticleId,
) -> ReservationState
where
    I: IntoIterator<Item = &'a StockEvent>,
{
    let mut pair: Vec<&StockEvent> = events
        .into_iter()
        .filter(|e| e.concerns(order_id, article_id))
        .collect();
    pair.sort_by_key(|e| e.sequence);

    pair.into_iter()
        .fold(ReservationState::None, |state, event| state.apply(event))
}

/// Derives the reservation state of every article touched by an order.
pub fn derive_order_reservations<'a, I>(
    events: I,
    order_id: &OrderId,
) -> BTreeMap<ArticleId, ReservationState>
where
    I: IntoIterator<Item = &'a StockEvent>,
{
    let mut ordered: Vec<&StockEvent> = events
        .into_iter()
        .filter(|e| e.order_id.as_ref() == Some(order_id))
        .collect();
    ordered.sort_by_key(|e| e.sequence);

    let mut states: BTreeMap<ArticleId, ReservationState> = BTreeMap::new();
    for event in ordered {
        let state = states.entry(event.article_id.clone()).or_default();
        *state = state.apply(event);
    }
    states
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::event::NewStockEvent;

    struct Timeline {
        events: Vec<StockEvent>,
        next: Sequence,
    }

    impl Timeline {
        fn new() -> Self {
            Self {
                events: Vec::new(),
                next: Sequence::initial(),
            }
        }

        fn push(&mut self, event: NewStockEvent) -> &mut Self {
            self.next = self.next.next();
            self.events.push(event.into_event(self.next, Utc::now()));
            self
        }
    }

    fn o(id: &str) -> OrderId {
        OrderId::new(id)
    }

    fn a(id: &str) -> ArticleId {
        ArticleId::new(id)
    }

    #[test]
    fn no_reserve_means_none() {
        let mut t = Timeline::new();
        t.push(NewStockEvent::add(a("A1"), 10));
        let state = derive_reservation(&t.events, &o("O1"), &a("A1"));
        assert_eq!(state, ReservationState::None);
        assert_eq!(state.quantity(), None);
    }

    #[test]
    fn reserve_alone_is_active() {
        let mut t = Timeline::new();
        t.push(NewStockEvent::reserve(o("O1"), a("A1"), 6));
        let state = derive_reservation(&t.events, &o("O1"), &a("A1"));
        assert!(state.is_active());
        assert_eq!(state.quantity(), Some(6));
    }

    #[test]
    fn cancel_after_reserve_is_cancelled() {
        let mut t = Timeline::new();
        t.push(NewStockEvent::reserve(o("O1"), a("A1"), 6))
            .push(NewStockEvent::cancel_reservation(o("O1"), a("A1"), 6));
        let state = derive_reservation(&t.events, &o("O1"), &a("A1"));
        assert_eq!(state.status(), ReservationStatus::Cancelled);
    }

    #[test]
    fn confirm_after_reserve_is_confirmed() {
        let mut t = Timeline::new();
        t.push(NewStockEvent::reserve(o("O1"), a("A1"), 6))
            .push(NewStockEvent::confirm_reservation(o("O1"), a("A1"), 6));
        let state = derive_reservation(&t.events, &o("O1"), &a("A1"));
        assert_eq!(state.status(), ReservationStatus::Confirmed);
    }

    #[test]
    fn order_scoped_deduct_still_reads_as_confirmation() {
        let mut t = Timeline::new();
        t.push(NewStockEvent::reserve(o("O1"), a("A1"), 6))
            .push(NewStockEvent::deduct(a("A1"), 6).order(o("O1")));
        let state = derive_reservation(&t.events, &o("O1"), &a("A1"));
        assert_eq!(state.status(), ReservationStatus::Confirmed);
    }

    #[test]
    fn direct_deduct_does_not_confirm() {
        let mut t = Timeline::new();
        t.push(NewStockEvent::reserve(o("O1"), a("A1"), 6))
            .push(NewStockEvent::deduct(a("A1"), 2));
        let state = derive_reservation(&t.events, &o("O1"), &a("A1"));
        assert!(state.is_active());
    }

    #[test]
    fn reserve_after_cancel_is_active_again() {
        let mut t = Timeline::new();
        t.push(NewStockEvent::reserve(o("O1"), a("A1"), 6))
            .push(NewStockEvent::cancel_reservation(o("O1"), a("A1"), 6))
            .push(NewStockEvent::reserve(o("O1"), a("A1"), 4));
        let state = derive_reservation(&t.events, &o("O1"), &a("A1"));
        assert!(state.is_active());
        assert_eq!(state.quantity(), Some(4));
    }

    #[test]
    fn cancel_without_live_reserve_is_ignored() {
        let mut t = Timeline::new();
        t.push(NewStockEvent::reserve(o("O1"), a("A1"), 6))
            .push(NewStockEvent::confirm_reservation(o("O1"), a("A1"), 6))
            .push(NewStockEvent::cancel_reservation(o("O1"), a("A1"), 6));
        let state = derive_reservation(&t.events, &o("O1"), &a("A1"));
        assert_eq!(state.status(), ReservationStatus::Confirmed);
    }

    #[test]
    fn derivation_orders_by_sequence_not_input_order() {
        let mut t = Timeline::new();
        t.push(NewStockEvent::reserve(o("O1"), a("A1"), 6))
            .push(NewStockEvent::cancel_reservation(o("O1"), a("A1"), 6));
        t.events.reverse();
        let state = derive_reservation(&t.events, &o("O1"), &a("A1"));
        assert_eq!(state.status(), ReservationStatus::Cancelled);
    }

    #[test]
    fn other_pairs_are_ignored() {
        let mut t = Timeline::new();
        t.push(NewStockEvent::reserve(o("O1"), a("A1"), 6))
            .push(NewStockEvent::cancel_reservation(o("O2"), a("A1"), 6))
            .push(NewStockEvent::confirm_reservation(o("O1"), a("A2"), 6));
        let state = derive_reservation(&t.events, &o("O1"), &a("A1"));
        assert!(state.is_active());
    }

    #[test]
    fn order_reservations_fold_each_article() {
        let mut t = Timeline::new();
        t.push(NewStockEvent::reserve(o("O1"), a("A1"), 1))
            .push(NewStockEvent::reserve(o("O1"), a("A2"), 2))
            .push(NewStockEvent::reserve(o("O2"), a("A3"), 3))
            .push(NewStockEvent::cancel_reservation(o("O1"), a("A2"), 2));

        let states = derive_order_reservations(&t.events, &o("O1"));
        assert_eq!(states.len(), 2);
        assert!(states[&a("A1")].is_active());
        assert_eq!(states[&a("A2")].status(), ReservationStatus::Cancelled);
    }

    #[test]
    fn state_serializes_with_status_tag() {
        let state = ReservationState::Active {
            quantity: 3,
            reserved_at: Sequence::new(9),
        };
        let json = serde_json::to_value(state).unwrap();
        assert_eq!(json["status"], "ACTIVE");
        assert_eq!(json["quantity"], 3);
    }
}
