//! Order messages consumed from the bus.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use saga::{ATTEMPT_HEADER, DEFAULT_MAX_ATTEMPTS, Delivery, DeliveryHandler, Disposition, Topic};

use crate::config::BusConfig;
use crate::error::Result;

/// Header naming the topic a dead letter was read from.
pub const ORIGINAL_TOPIC_HEADER: &str = "x-original-topic";

/// Header carrying why a delivery was dead-lettered.
pub const DEAD_LETTER_REASON_HEADER: &str = "x-dead-letter-reason";

const MAX_REPUBLISH_BACKOFF: Duration = Duration::from_secs(5);

/// What the bus does with a handled record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Commit the offset.
    Commit,
    /// Publish the record again with the next attempt number.
    Redeliver,
    /// Publish the record to the dead-letter topic.
    DeadLetter { reason: &'static str },
}

impl Settlement {
    /// Maps a handler's disposition onto bus operations, honoring the
    /// attempt cap.
    pub fn for_delivery(delivery: &Delivery, disposition: Disposition, max_attempts: u32) -> Self {
        match disposition {
            Disposition::Ack => Settlement::Commit,
            Disposition::Requeue if delivery.exhausted(max_attempts) => Settlement::DeadLetter {
                reason: "redelivery limit reached",
            },
            Disposition::Requeue => Settlement::Redeliver,
            Disposition::Reject => Settlement::DeadLetter {
                reason: "rejected by consumer",
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Settlement::Commit => "commit",
            Settlement::Redeliver => "redeliver",
            Settlement::DeadLetter { .. } => "dead_letter",
        }
    }
}

/// Counts of how records were settled during one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusReport {
    pub committed: usize,
    pub redelivered: usize,
    pub dead_lettered: usize,
    /// Records on topics this consumer does not handle.
    pub skipped: usize,
}

/// Feeds records from the order topics into a [`DeliveryHandler`].
pub struct KafkaOrderConsumer<H> {
    consumer: StreamConsumer,
    producer: FutureProducer,
    handler: Arc<H>,
    dead_letter_topic: String,
    send_timeout: Duration,
    max_attempts: u32,
}

impl<H: DeliveryHandler> KafkaOrderConsumer<H> {
    /// Connects and subscribes to every order topic.
    pub fn new(config: &BusConfig, handler: Arc<H>) -> Result<Self> {
        let consumer = config.consumer()?;
        let topics: Vec<&str> = Topic::ALL.iter().map(Topic::as_str).collect();
        consumer.subscribe(&topics)?;

        tracing::info!(
            brokers = %config.brokers,
            group_id = %config.group_id,
            ?topics,
            "subscribed to order topics"
        );

        Ok(Self {
            consumer,
            producer: config.producer()?,
            handler,
            dead_letter_topic: config.dead_letter_topic.clone(),
            send_timeout: config.send_timeout,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        })
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Consumes until `shutdown` resolves. The record in hand is settled
    /// before returning.
    #[tracing::instrument(skip_all, fields(max_attempts = self.max_attempts))]
    pub async fn run<F>(&self, shutdown: F) -> BusReport
    where
        F: Future<Output = ()> + Send,
    {
        let mut report = BusReport::default();
        tokio::pin!(shutdown);

        tracing::info!("bus consumer started");
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                received = self.consumer.recv() => match received {
                    Ok(message) => self.process(&message, &mut report).await,
                    Err(e) => tracing::warn!(error = %e, "failed to receive record"),
                },
            }
        }

        tracing::info!(?report, "bus consumer stopped");
        report
    }

    async fn process(&self, message: &BorrowedMessage<'_>, report: &mut BusReport) {
        let Ok(topic) = message.topic().parse::<Topic>() else {
            tracing::warn!(topic = message.topic(), "skipping record on unhandled topic");
            report.skipped += 1;
            self.commit(message);
            return;
        };

        let delivery = Delivery {
            attempt: delivery_attempt(message.headers()),
            ..Delivery::new(topic, message.payload().unwrap_or_default())
        };
        let disposition = self.handler.handle(&delivery).await;
        let settlement = Settlement::for_delivery(&delivery, disposition, self.max_attempts);

        match settlement {
            Settlement::Commit => report.committed += 1,
            Settlement::Redeliver => {
                let next = delivery.redelivered();
                self.republish(topic.as_str(), &next, redelivery_headers(&next))
                    .await;
                report.redelivered += 1;
            }
            Settlement::DeadLetter { reason } => {
                tracing::warn!(%topic, attempt = delivery.attempt, reason, "dead-lettering record");
                self.republish(
                    &self.dead_letter_topic,
                    &delivery,
                    dead_letter_headers(&delivery, reason),
                )
                .await;
                report.dead_lettered += 1;
            }
        }

        metrics::counter!(
            "bus_settlements_total",
            "topic" => topic.as_str(),
            "settlement" => settlement.as_str()
        )
        .increment(1);
        self.commit(message);
    }

    /// Publishes until the broker accepts the record. The source offset is
    /// only committed afterwards, so a record is never dropped between the
    /// two topics.
    async fn republish(&self, topic: &str, delivery: &Delivery, headers: OwnedHeaders) {
        let mut backoff = Duration::from_millis(100);
        loop {
            let record = FutureRecord::<(), [u8]>::to(topic)
                .payload(&delivery.payload)
                .headers(headers.clone());
            match self
                .producer
                .send(record, Timeout::After(self.send_timeout))
                .await
            {
                Ok(_) => return,
                Err((e, _)) => {
                    tracing::error!(topic, error = %e, retry_in = ?backoff, "failed to republish record");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_REPUBLISH_BACKOFF);
                }
            }
        }
    }

    fn commit(&self, message: &BorrowedMessage<'_>) {
        if let Err(e) = self.consumer.commit_message(message, CommitMode::Async) {
            tracing::warn!(
                topic = message.topic(),
                partition = message.partition(),
                offset = message.offset(),
                error = %e,
                "failed to commit offset (record may be redelivered)"
            );
        }
    }
}

/// Reads the attempt header. Missing or unparseable values mean a first
/// delivery.
pub fn delivery_attempt<H: Headers>(headers: Option<&H>) -> u32 {
    headers
        .into_iter()
        .flat_map(|headers| headers.iter())
        .filter(|header| header.key == ATTEMPT_HEADER)
        .filter_map(|header| header.value)
        .filter_map(|value| std::str::from_utf8(value).ok())
        .filter_map(|value| value.trim().parse::<u32>().ok())
        .last()
        .filter(|&attempt| attempt >= 1)
        .unwrap_or(1)
}

fn redelivery_headers(delivery: &Delivery) -> OwnedHeaders {
    let attempt = delivery.attempt.to_string();
    OwnedHeaders::new().insert(Header {
        key: ATTEMPT_HEADER,
        value: Some(attempt.as_str()),
    })
}

fn dead_letter_headers(delivery: &Delivery, reason: &str) -> OwnedHeaders {
    redelivery_headers(delivery)
        .insert(Header {
            key: ORIGINAL_TOPIC_HEADER,
            value: Some(delivery.topic.as_str()),
        })
        .insert(Header {
            key: DEAD_LETTER_REASON_HEADER,
            value: Some(reason),
        })
}
