//! In-process message broker with at-least-once redelivery.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, mpsc};

use crate::delivery::Delivery;
use crate::messages::Topic;

/// A delivery the broker gave up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub delivery: Delivery,
    pub reason: String,
}

/// Unbounded in-process queue shared by publishers and one consumer pool.
///
/// Requeued deliveries go to the back of the queue with their attempt count
/// incremented. Rejected ones are kept as dead letters for inspection.
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    sender: mpsc::UnboundedSender<Delivery>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Delivery>>>,
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
    unsettled: Arc<AtomicUsize>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            dead_letters: Arc::new(Mutex::new(Vec::new())),
            unsettled: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Enqueues a first delivery.
    pub fn publish(&self, topic: Topic, payload: impl Into<Vec<u8>>) {
        self.enqueue(Delivery::new(topic, payload));
    }

    pub fn enqueue(&self, delivery: Delivery) {
        self.unsettled.fetch_add(1, Ordering::SeqCst);
        // The broker owns the receiver, so the channel cannot be closed here.
        let _ = self.sender.send(delivery);
    }

    /// Deliveries published but not yet acked or dead-lettered.
    pub fn unsettled(&self) -> usize {
        self.unsettled.load(Ordering::SeqCst)
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().await.clone()
    }

    pub(crate) fn receiver(&self) -> &Mutex<mpsc::UnboundedReceiver<Delivery>> {
        &self.receiver
    }

    pub(crate) fn ack(&self) {
        self.unsettled.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn requeue(&self, delivery: Delivery) {
        let _ = self.sender.send(delivery.redelivered());
    }

    pub(crate) async fn dead_letter(&self, delivery: Delivery, reason: impl Into<String>) {
        self.dead_letters.lock().await.push(DeadLetter {
            delivery,
            reason: reason.into(),
        });
        self.unsettled.fetch_sub(1, Ordering::SeqCst);
    }
}
