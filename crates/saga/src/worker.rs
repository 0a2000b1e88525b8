//! Concurrent consumer pool.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use inventory::AlertPublisher;
use stock_ledger::StockLedger;
use stock_store::StockStore;
use tokio::task::JoinSet;

use crate::broker::InMemoryBroker;
use crate::consumer::OrderSagaConsumer;
use crate::delivery::{Delivery, Disposition};

/// Default number of deliveries handled at once.
pub const DEFAULT_WORKERS: usize = 4;

/// Default attempt after which a requeued delivery is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Anything that can settle a delivery.
#[async_trait]
pub trait DeliveryHandler: Send + Sync + 'static {
    async fn handle(&self, delivery: &Delivery) -> Disposition;
}

#[async_trait]
impl<S, L, P> DeliveryHandler for OrderSagaConsumer<S, L, P>
where
    S: StockStore + 'static,
    L: StockLedger + 'static,
    P: AlertPublisher + 'static,
{
    async fn handle(&self, delivery: &Delivery) -> Disposition {
        self.handle_delivery(delivery).await
    }
}

/// Counts of how deliveries were settled during one pool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub acked: usize,
    pub requeued: usize,
    pub dead_lettered: usize,
    /// Worker tasks that panicked; their deliveries are lost.
    pub crashed: usize,
}

/// Runs up to `workers` deliveries concurrently from one broker.
///
/// Each delivery is handled by exactly one task at a time. A `Requeue` on a
/// delivery that already reached `max_attempts` is turned into a dead letter.
pub struct ConsumerPool<H> {
    handler: Arc<H>,
    workers: usize,
    max_attempts: u32,
}

impl<H: DeliveryHandler> ConsumerPool<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            workers: DEFAULT_WORKERS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Processes until the queue is empty and nothing is in flight,
    /// including redeliveries.
    pub async fn drain(&self, broker: &InMemoryBroker) -> PoolReport {
        self.pump(broker, true, std::future::pending()).await
    }

    /// Processes until `shutdown` resolves, then finishes in-flight work.
    pub async fn run<F>(&self, broker: &InMemoryBroker, shutdown: F) -> PoolReport
    where
        F: Future<Output = ()> + Send,
    {
        self.pump(broker, false, shutdown).await
    }

    #[tracing::instrument(skip_all, fields(workers = self.workers, max_attempts = self.max_attempts))]
    async fn pump<F>(&self, broker: &InMemoryBroker, stop_when_idle: bool, shutdown: F) -> PoolReport
    where
        F: Future<Output = ()> + Send,
    {
        let mut receiver = broker.receiver().lock().await;
        let mut in_flight: JoinSet<(Delivery, Disposition)> = JoinSet::new();
        let mut report = PoolReport::default();
        tokio::pin!(shutdown);

        tracing::info!("consumer pool started");
        loop {
            while in_flight.len() < self.workers {
                match receiver.try_recv() {
                    Ok(delivery) => self.spawn(&mut in_flight, delivery),
                    Err(_) => break,
                }
            }

            if in_flight.is_empty() {
                if stop_when_idle {
                    break;
                }
                tokio::select! {
                    () = &mut shutdown => break,
                    next = receiver.recv() => match next {
                        Some(delivery) => self.spawn(&mut in_flight, delivery),
                        None => break,
                    },
                }
                continue;
            }

            let has_capacity = in_flight.len() < self.workers;
            tokio::select! {
                () = &mut shutdown, if !stop_when_idle => break,
                Some(joined) = in_flight.join_next() => {
                    self.settle(broker, joined, &mut report).await;
                }
                Some(delivery) = receiver.recv(), if has_capacity && !stop_when_idle => {
                    self.spawn(&mut in_flight, delivery);
                }
                else => break,
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            self.settle(broker, joined, &mut report).await;
        }

        tracing::info!(?report, "consumer pool stopped");
        report
    }

    fn spawn(&self, in_flight: &mut JoinSet<(Delivery, Disposition)>, delivery: Delivery) {
        let handler = Arc::clone(&self.handler);
        in_flight.spawn(async move {
            let disposition = handler.handle(&delivery).await;
            (delivery, disposition)
        });
    }

    async fn settle(
        &self,
        broker: &InMemoryBroker,
        joined: Result<(Delivery, Disposition), tokio::task::JoinError>,
        report: &mut PoolReport,
    ) {
        let (delivery, disposition) = match joined {
            Ok(settled) => settled,
            Err(e) => {
                tracing::error!(error = %e, "worker task failed");
                report.crashed += 1;
                return;
            }
        };

        match disposition {
            Disposition::Ack => {
                broker.ack();
                report.acked += 1;
            }
            Disposition::Requeue if delivery.exhausted(self.max_attempts) => {
                tracing::warn!(
                    topic = %delivery.topic,
                    attempt = delivery.attempt,
                    "redelivery limit reached, dead-lettering"
                );
                broker
                    .dead_letter(delivery, "redelivery limit reached")
                    .await;
                report.dead_lettered += 1;
            }
            Disposition::Requeue => {
                broker.requeue(delivery);
                report.requeued += 1;
            }
            Disposition::Reject => {
                broker.dead_letter(delivery, "rejected by consumer").await;
                report.dead_lettered += 1;
            }
        }
    }
}
