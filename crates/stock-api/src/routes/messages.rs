//! Order message ingress.
//!
//! `POST /messages/{topic}` handles the body synchronously and answers with a
//! status a push-subscription broker can act on: 200 settles, 503 asks for
//! redelivery, 422 drops the message. Once the attempt header reaches
//! `SAGA_MAX_ATTEMPTS`, a delivery that would ask for redelivery is dropped. `POST /queue/{topic}` hands the body to
//! the in-process broker drained by the consumer pool.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use saga::{ATTEMPT_HEADER, Delivery, Disposition, Topic};
use serde::Serialize;
use stock_ledger::StockLedger;
use stock_store::StockStore;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct PushResponse {
    pub topic: &'static str,
    pub disposition: &'static str,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub topic: &'static str,
    pub unsettled: usize,
}

#[derive(Debug, Serialize)]
pub struct DeadLetterView {
    pub topic: &'static str,
    pub attempt: u32,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct QueueStatus {
    pub unsettled: usize,
    pub dead_letters: Vec<DeadLetterView>,
}

fn disposition_status(disposition: Disposition) -> StatusCode {
    match disposition {
        Disposition::Ack => StatusCode::OK,
        Disposition::Requeue => StatusCode::SERVICE_UNAVAILABLE,
        Disposition::Reject => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn attempt(headers: &HeaderMap) -> u32 {
    headers
        .get(ATTEMPT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .filter(|&n| n >= 1)
        .unwrap_or(1)
}

/// POST /messages/{topic}
pub async fn push<S: StockStore + 'static, L: StockLedger + 'static>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(topic): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<PushResponse>), ApiError> {
    let topic: Topic = topic.parse()?;
    let delivery = Delivery {
        attempt: attempt(&headers),
        ..Delivery::new(topic, body.to_vec())
    };

    let disposition = delivery.settle(
        state.consumer.handle_delivery(&delivery).await,
        state.max_attempts,
    );

    Ok((
        disposition_status(disposition),
        Json(PushResponse {
            topic: topic.as_str(),
            disposition: disposition.as_str(),
        }),
    ))
}

/// POST /queue/{topic}
pub async fn enqueue<S: StockStore + 'static, L: StockLedger + 'static>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(topic): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<EnqueueResponse>), ApiError> {
    let topic: Topic = topic.parse()?;
    state.broker.publish(topic, body.to_vec());
    tracing::debug!(%topic, "message queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueResponse {
            topic: topic.as_str(),
            unsettled: state.broker.unsettled(),
        }),
    ))
}

/// GET /queue
pub async fn queue_status<S: StockStore + 'static, L: StockLedger + 'static>(
    State(state): State<Arc<AppState<S, L>>>,
) -> Json<QueueStatus> {
    let dead_letters = state
        .broker
        .dead_letters()
        .await
        .into_iter()
        .map(|dead| DeadLetterView {
            topic: dead.delivery.topic.as_str(),
            attempt: dead.delivery.attempt,
            reason: dead.reason,
        })
        .collect();

    Json(QueueStatus {
        unsettled: state.broker.unsettled(),
        dead_letters,
    })
}
