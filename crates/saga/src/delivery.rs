//! Broker-facing delivery envelope and settlement outcome.

use std::fmt;

use crate::messages::Topic;

/// Header carrying the broker's delivery attempt, starting at 1.
pub const ATTEMPT_HEADER: &str = "x-delivery-attempt";

/// How a delivery is settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Processed (or terminally handled); remove from the queue.
    Ack,
    /// Failed transiently; deliver again.
    Requeue,
    /// Failed terminally; do not redeliver.
    Reject,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Ack => "ack",
            Disposition::Requeue => "requeue",
            Disposition::Reject => "reject",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw message as handed over by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: Topic,
    pub payload: Vec<u8>,
    /// 1 on first delivery, incremented on every redelivery.
    pub attempt: u32,
}

impl Delivery {
    pub fn new(topic: Topic, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic,
            payload: payload.into(),
            attempt: 1,
        }
    }

    /// Serializes a message as a first delivery on `topic`.
    pub fn json<T: serde::Serialize>(topic: Topic, message: &T) -> crate::Result<Self> {
        Ok(Self::new(topic, serde_json::to_vec(message)?))
    }

    /// The same delivery, one attempt later.
    pub fn redelivered(mut self) -> Self {
        self.attempt += 1;
        self
    }

    /// True once no further redelivery is allowed.
    pub fn exhausted(&self, max_attempts: u32) -> bool {
        self.attempt >= max_attempts
    }

    /// Turns a `Requeue` into a `Reject` once the delivery is exhausted.
    pub fn settle(&self, disposition: Disposition, max_attempts: u32) -> Disposition {
        match disposition {
            Disposition::Requeue if self.exhausted(max_attempts) => {
                tracing::warn!(
                    topic = %self.topic,
                    attempt = self.attempt,
                    "redelivery limit reached, rejecting"
                );
                Disposition::Reject
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requeue_turns_into_reject_at_the_limit() {
        let first = Delivery::new(Topic::OrderConfirmed, b"{}".to_vec());
        assert_eq!(first.settle(Disposition::Requeue, 3), Disposition::Requeue);

        let last = first.clone().redelivered().redelivered();
        assert_eq!(last.attempt, 3);
        assert!(last.exhausted(3));
        assert_eq!(last.settle(Disposition::Requeue, 3), Disposition::Reject);
        assert_eq!(last.settle(Disposition::Ack, 3), Disposition::Ack);
    }
}
