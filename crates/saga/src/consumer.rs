//! Order saga consumer.

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use inventory::{AlertPublisher, InsufficientStockAlert, StockError, StockService};
use stock_ledger::StockLedger;
use stock_store::StockStore;

use crate::delivery::{Delivery, Disposition};
use crate::error::{Result, SagaError};
use crate::messages::{self, OrderCanceled, OrderConfirmed, OrderLine, OrderPlaced, Topic};
use crate::placement::{PlacementDecision, PlacementReport};

/// Reason recorded on confirmations driven by the bus.
pub const CONFIRM_REASON: &str = "order confirmed via message bus";

/// Reason recorded when a failed placement is rolled back.
pub const COMPENSATION_REASON: &str = "compensation for failed order processing";

/// Result of a best-effort cancellation.
#[derive(Debug, Default)]
pub struct CancellationSummary {
    pub cancelled: Vec<OrderLine>,
    pub failed: Vec<(OrderLine, StockError)>,
}

/// Drives the reservation coordinator from order lifecycle messages.
///
/// Each handler is safe to run concurrently with others, including for
/// different orders touching the same article.
pub struct OrderSagaConsumer<S, L, P> {
    service: Arc<StockService<S, L, P>>,
}

impl<S, L, P> Clone for OrderSagaConsumer<S, L, P> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

impl<S, L, P> OrderSagaConsumer<S, L, P>
where
    S: StockStore,
    L: StockLedger,
    P: AlertPublisher,
{
    pub fn new(service: Arc<StockService<S, L, P>>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &StockService<S, L, P> {
        &self.service
    }

    /// Decodes a delivery, runs the matching handler and decides how the
    /// broker should settle it.
    #[tracing::instrument(skip(self, delivery), fields(topic = %delivery.topic, attempt = delivery.attempt))]
    pub async fn handle_delivery(&self, delivery: &Delivery) -> Disposition {
        let start = Instant::now();

        let disposition = match delivery.topic {
            Topic::OrderPlaced => match messages::decode::<OrderPlaced>(&delivery.payload) {
                Ok(msg) => self.handle_order_placed(&msg).await.disposition(),
                Err(e) => reject_malformed(&e),
            },
            Topic::OrderConfirmed => match messages::decode::<OrderConfirmed>(&delivery.payload) {
                Ok(msg) => match self.handle_order_confirmed(&msg).await {
                    Ok(()) => Disposition::Ack,
                    Err(e) => {
                        tracing::warn!(error = %e, "confirmation failed, requeueing");
                        Disposition::Requeue
                    }
                },
                Err(e) => reject_malformed(&e),
            },
            Topic::OrderCanceled => match messages::decode::<OrderCanceled>(&delivery.payload) {
                Ok(msg) => {
                    self.handle_order_canceled(&msg).await;
                    Disposition::Ack
                }
                Err(e) => reject_malformed(&e),
            },
        };

        metrics::counter!(
            "saga_messages_total",
            "topic" => delivery.topic.as_str(),
            "disposition" => disposition.as_str()
        )
        .increment(1);
        metrics::histogram!("saga_message_duration_seconds", "topic" => delivery.topic.as_str())
            .record(start.elapsed().as_secs_f64());

        disposition
    }

    /// Reserves every line, then commits or compensates as a whole.
    ///
    /// All lines are attempted even after a failure so the alert can name
    /// every short article.
    #[tracing::instrument(skip(self, msg), fields(order_id = %msg.order_id, lines = msg.lines.len()))]
    pub async fn handle_order_placed(&self, msg: &OrderPlaced) -> PlacementDecision {
        let mut report = PlacementReport::new();
        for line in &msg.lines {
            let result = self
                .service
                .reserve(&msg.order_id, &line.article_id, line.quantity)
                .await
                .map(|_| ());
            if let Err(ref e) = result {
                tracing::info!(article_id = %line.article_id, error = %e, "line not reserved");
            }
            report.record(line.clone(), result);
        }

        let decision = report.decision();

        if let PlacementDecision::InsufficientStock { article_ids } = &decision {
            let alert = InsufficientStockAlert {
                order_id: msg.order_id.clone(),
                article_ids: article_ids.clone(),
            };
            if let Err(e) = self.service.publisher().publish_insufficient_stock(alert).await {
                tracing::warn!(error = %e, "failed to publish insufficient stock alert");
            }
        }

        if decision.compensates() {
            self.compensate(msg, &report.succeeded).await;
        }

        match &decision {
            PlacementDecision::Commit => tracing::info!("order reserved"),
            other => tracing::warn!(decision = ?other, failed = report.failed.len(), "order not reserved"),
        }
        decision
    }

    /// Confirms every line. The first failure aborts the rest.
    ///
    /// Lines an earlier delivery already confirmed are skipped, so a
    /// redelivery after a partial failure picks up where it stopped.
    #[tracing::instrument(skip(self, msg), fields(order_id = %msg.order_id, lines = msg.lines.len()))]
    pub async fn handle_order_confirmed(&self, msg: &OrderConfirmed) -> Result<()> {
        for line in &msg.lines {
            match self
                .service
                .confirm(&msg.order_id, &line.article_id, CONFIRM_REASON)
                .await
            {
                Ok(_) => {}
                Err(StockError::AlreadyConfirmed { .. }) => {
                    tracing::debug!(article_id = %line.article_id, "line already confirmed");
                }
                Err(source) => {
                    return Err(SagaError::Stock {
                        order_id: msg.order_id.clone(),
                        article_id: line.article_id.clone(),
                        source,
                    });
                }
            }
        }
        tracing::info!("order confirmed");
        Ok(())
    }

    /// Releases every line it can. Failures are logged and skipped.
    #[tracing::instrument(skip(self, msg), fields(order_id = %msg.order_id, lines = msg.lines.len()))]
    pub async fn handle_order_canceled(&self, msg: &OrderCanceled) -> CancellationSummary {
        let reason = msg.reason.as_deref().unwrap_or_default();
        let summary = self.cancel_lines(msg, &msg.lines, reason).await;

        for (line, e) in &summary.failed {
            tracing::warn!(article_id = %line.article_id, error = %e, "line not cancelled");
        }
        tracing::info!(
            cancelled = summary.cancelled.len(),
            failed = summary.failed.len(),
            "order cancellation processed"
        );
        summary
    }

    async fn compensate(&self, msg: &OrderPlaced, succeeded: &[OrderLine]) {
        let summary = self
            .cancel_lines(msg, succeeded, COMPENSATION_REASON)
            .await;

        metrics::counter!("saga_compensations_total", "result" => "released")
            .increment(summary.cancelled.len() as u64);
        metrics::counter!("saga_compensations_total", "result" => "failed")
            .increment(summary.failed.len() as u64);

        for (line, e) in &summary.failed {
            tracing::error!(
                article_id = %line.article_id,
                error = %e,
                "compensation failed; reservation left in place"
            );
        }
    }

    async fn cancel_lines<M: messages::OrderMessage>(
        &self,
        msg: &M,
        lines: &[OrderLine],
        reason: &str,
    ) -> CancellationSummary {
        let order_id = msg.order_id();
        let results = join_all(lines.iter().map(|line| async move {
            let result = self
                .service
                .cancel(order_id, &line.article_id, reason)
                .await;
            (line.clone(), result)
        }))
        .await;

        let mut summary = CancellationSummary::default();
        for (line, result) in results {
            match result {
                Ok(_) => summary.cancelled.push(line),
                Err(e) => summary.failed.push((line, e)),
            }
        }
        summary
    }
}

fn reject_malformed(e: &SagaError) -> Disposition {
    tracing::warn!(error = %e, "rejecting message");
    Disposition::Reject
}
