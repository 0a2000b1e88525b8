//! Classification of an order placement's line outcomes.
//!
//! Placement runs in two phases: every line is attempted, then the collected
//! outcomes are classified here. Nothing in this module performs I/O, so the
//! compensation and redelivery policy can be tested without a store.

use common::ArticleId;
use inventory::StockError;

use crate::delivery::Disposition;
use crate::messages::OrderLine;

/// Outcomes of attempting every line of one order.
#[derive(Debug, Default)]
pub struct PlacementReport {
    pub succeeded: Vec<OrderLine>,
    pub failed: Vec<(OrderLine, StockError)>,
}

/// What to do with a placement once all lines were attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementDecision {
    /// Every line is reserved.
    Commit,
    /// Some lines lacked stock: alert on these articles, release the
    /// succeeded lines, never retry.
    InsufficientStock { article_ids: Vec<ArticleId> },
    /// Some lines failed for another reason: release the succeeded lines and
    /// retry only if every such failure was transient.
    Failed { retryable: bool },
    /// The only failures are reservations an earlier delivery already holds.
    /// Nothing is released.
    Duplicate,
}

impl PlacementReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, line: OrderLine, result: Result<(), StockError>) {
        match result {
            Ok(()) => self.succeeded.push(line),
            Err(e) => self.failed.push((line, e)),
        }
    }

    /// Applies the placement policy to the recorded outcomes.
    pub fn decision(&self) -> PlacementDecision {
        if self.failed.is_empty() {
            return PlacementDecision::Commit;
        }

        let insufficient: Vec<ArticleId> = self
            .failed
            .iter()
            .filter(|(_, e)| matches!(e, StockError::InsufficientStock { .. }))
            .map(|(line, _)| line.article_id.clone())
            .collect();
        if !insufficient.is_empty() {
            return PlacementDecision::InsufficientStock {
                article_ids: insufficient,
            };
        }

        let mut others = self
            .failed
            .iter()
            .filter(|(_, e)| !matches!(e, StockError::DuplicateReservation { .. }))
            .peekable();
        if others.peek().is_none() {
            return PlacementDecision::Duplicate;
        }

        PlacementDecision::Failed {
            retryable: others.all(|(_, e)| e.is_retryable()),
        }
    }
}

impl PlacementDecision {
    /// True when the succeeded lines must be released.
    pub fn compensates(&self) -> bool {
        matches!(
            self,
            PlacementDecision::InsufficientStock { .. } | PlacementDecision::Failed { .. }
        )
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            PlacementDecision::Commit => Disposition::Ack,
            PlacementDecision::Failed { retryable: true } => Disposition::Requeue,
            PlacementDecision::InsufficientStock { .. }
            | PlacementDecision::Failed { retryable: false }
            | PlacementDecision::Duplicate => Disposition::Reject,
        }
    }
}

#[cfg(test)]
mod tests {
    use common::OrderId;
    use stock_store::StoreError;

    use super::*;

    fn line(id: &str) -> OrderLine {
        OrderLine::new(id, 1)
    }

    fn insufficient(id: &str) -> StockError {
        StockError::InsufficientStock {
            article_id: ArticleId::new(id),
            available: 0,
            requested: 1,
        }
    }

    fn duplicate(id: &str) -> StockError {
        StockError::DuplicateReservation {
            order_id: OrderId::new("O1"),
            article_id: ArticleId::new(id),
        }
    }

    fn transient() -> StockError {
        StockError::TransientStore(StoreError::Unavailable("down".into()))
    }

    #[test]
    fn all_reserved_commits() {
        let mut report = PlacementReport::new();
        report.record(line("A1"), Ok(()));
        report.record(line("A2"), Ok(()));

        let decision = report.decision();
        assert_eq!(decision, PlacementDecision::Commit);
        assert!(!decision.compensates());
        assert_eq!(decision.disposition(), Disposition::Ack);
    }

    #[test]
    fn insufficient_stock_names_every_short_article() {
        let mut report = PlacementReport::new();
        report.record(line("A1"), Ok(()));
        report.record(line("A2"), Err(insufficient("A2")));
        report.record(line("A3"), Err(transient()));
        report.record(line("A4"), Err(insufficient("A4")));

        let decision = report.decision();
        assert_eq!(
            decision,
            PlacementDecision::InsufficientStock {
                article_ids: vec![ArticleId::new("A2"), ArticleId::new("A4")]
            }
        );
        assert!(decision.compensates());
        assert_eq!(decision.disposition(), Disposition::Reject);
    }

    #[test]
    fn transient_failure_compensates_and_requeues() {
        let mut report = PlacementReport::new();
        report.record(line("A1"), Ok(()));
        report.record(line("A2"), Err(transient()));

        let decision = report.decision();
        assert_eq!(decision, PlacementDecision::Failed { retryable: true });
        assert!(decision.compensates());
        assert_eq!(decision.disposition(), Disposition::Requeue);
    }

    #[test]
    fn not_found_is_terminal() {
        let mut report = PlacementReport::new();
        report.record(line("A1"), Ok(()));
        report.record(line("A2"), Err(transient()));
        report.record(line("ghost"), Err(StockError::NotFound(ArticleId::new("ghost"))));

        let decision = report.decision();
        assert_eq!(decision, PlacementDecision::Failed { retryable: false });
        assert_eq!(decision.disposition(), Disposition::Reject);
    }

    #[test]
    fn duplicates_alone_release_nothing() {
        let mut report = PlacementReport::new();
        report.record(line("A1"), Err(duplicate("A1")));
        report.record(line("A2"), Ok(()));

        let decision = report.decision();
        assert_eq!(decision, PlacementDecision::Duplicate);
        assert!(!decision.compensates());
        assert_eq!(decision.disposition(), Disposition::Reject);
    }

    #[test]
    fn duplicate_beside_transient_failure_still_retries() {
        let mut report = PlacementReport::new();
        report.record(line("A1"), Err(duplicate("A1")));
        report.record(line("A2"), Err(transient()));

        assert_eq!(
            report.decision(),
            PlacementDecision::Failed { retryable: true }
        );
    }
}
