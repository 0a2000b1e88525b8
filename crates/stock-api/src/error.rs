//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inventory::StockError;
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Coordinator error.
    Stock(StockError),
    /// Message handling error.
    Saga(SagaError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Stock(err) => (stock_status(&err), err.kind(), err.to_string()),
            ApiError::Saga(err) => saga_error_to_response(err),
        };

        if status.is_server_error() {
            tracing::error!(error = %message, kind, "request failed");
        }

        let body = serde_json::json!({ "error": message, "kind": kind });
        (status, axum::Json(body)).into_response()
    }
}

fn stock_status(err: &StockError) -> StatusCode {
    match err {
        StockError::NotFound(_) => StatusCode::NOT_FOUND,
        StockError::InvalidQuantity(_) => StatusCode::BAD_REQUEST,
        StockError::AlreadyExists(_)
        | StockError::InsufficientStock { .. }
        | StockError::InsufficientReserved { .. }
        | StockError::DuplicateReservation { .. }
        | StockError::NoActiveReservation { .. }
        | StockError::AlreadyCancelled { .. }
        | StockError::AlreadyConfirmed { .. }
        | StockError::InvalidState { .. } => StatusCode::CONFLICT,
        StockError::TransientStore(_) | StockError::Ledger(_) => StatusCode::SERVICE_UNAVAILABLE,
        StockError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, &'static str, String) {
    match &err {
        SagaError::Malformed(_) => (StatusCode::UNPROCESSABLE_ENTITY, "malformed", err.to_string()),
        SagaError::UnknownTopic(_) => (StatusCode::NOT_FOUND, "unknown_topic", err.to_string()),
        SagaError::Stock { source, .. } => (stock_status(source), source.kind(), err.to_string()),
        SagaError::Serialization(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            err.to_string(),
        ),
    }
}

impl From<StockError> for ApiError {
    fn from(err: StockError) -> Self {
        ApiError::Stock(err)
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}
