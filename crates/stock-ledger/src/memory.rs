use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::ledger::StockLedger;
use crate::query::QueryOrder;
use crate::{EventQuery, LedgerError, NewStockEvent, Result, Sequence, StockEvent};

#[derive(Debug, Default)]
struct LedgerState {
    events: Vec<StockEvent>,
    last_sequence: Sequence,
}

/// In-memory stock ledger.
///
/// Provides the same interface as the PostgreSQL implementation. Sequence
/// assignment and the push happen under one write lock, so the vector is
/// always in sequence order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockLedger {
    state: Arc<RwLock<LedgerState>>,
    fail_on_append: Arc<AtomicBool>,
}

impl InMemoryStockLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of entries stored.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }

    /// Makes every subsequent append fail until reset. Reads keep working.
    pub fn set_fail_on_append(&self, fail: bool) {
        self.fail_on_append.store(fail, Ordering::SeqCst);
    }

    /// Clears all entries.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.events.clear();
        state.last_sequence = Sequence::initial();
    }
}

#[async_trait]
impl StockLedger for InMemoryStockLedger {
    async fn append(&self, event: NewStockEvent) -> Result<StockEvent> {
        if self.fail_on_append.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable(
                "ledger rejected append".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        let sequence = state.last_sequence.next();
        let stored = event.into_event(sequence, Utc::now());

        state.last_sequence = sequence;
        state.events.push(stored.clone());

        Ok(stored)
    }

    async fn query_events(&self, query: EventQuery) -> Result<Vec<StockEvent>> {
        let state = self.state.read().await;
        let matching = state.events.iter().filter(|e| {
            if let Some(ref id) = query.article_id
                && &e.article_id != id
            {
                return false;
            }
            if let Some(ref id) = query.order_id
                && e.order_id.as_ref() != Some(id)
            {
                return false;
            }
            if let Some(ref types) = query.event_types
                && !types.contains(&e.event_type)
            {
                return false;
            }
            true
        });

        let mut events: Vec<StockEvent> = matching.cloned().collect();
        if query.order == QueryOrder::Descending {
            events.reverse();
        }

        // Apply offset and limit
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(events.into_iter().skip(offset).take(limit).collect())
    }
}
