//! Stock queries and admin writes.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::ArticleId;
use serde::Deserialize;
use stock_ledger::{StockEvent, StockLedger};
use stock_store::{NewStock, Stock, StockStore};

use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct EventsParams {
    /// Missing or 0 uses the configured default.
    #[serde(default)]
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    pub quantity: i64,
    #[serde(default)]
    pub reason: String,
}

// -- Handlers --

/// GET /stock: every article, newest first.
pub async fn list<S: StockStore + 'static, L: StockLedger + 'static>(
    State(state): State<Arc<AppState<S, L>>>,
) -> Result<Json<Vec<Stock>>, ApiError> {
    Ok(Json(state.service.list_stocks().await?))
}

/// GET /stock/low: articles at or below their minimum, most critical first.
pub async fn low<S: StockStore + 'static, L: StockLedger + 'static>(
    State(state): State<Arc<AppState<S, L>>>,
) -> Result<Json<Vec<Stock>>, ApiError> {
    Ok(Json(state.service.low_stocks().await?))
}

/// GET /stock/{article_id}: display read through the cache.
pub async fn get<S: StockStore + 'static, L: StockLedger + 'static>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(article_id): Path<String>,
) -> Result<Json<Stock>, ApiError> {
    let article_id = ArticleId::new(article_id);
    Ok(Json(state.service.get_stock_cached(&article_id).await?))
}

/// GET /stock/{article_id}/events?limit=: ledger entries, newest first.
pub async fn events<S: StockStore + 'static, L: StockLedger + 'static>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(article_id): Path<String>,
    Query(params): Query<EventsParams>,
) -> Result<Json<Vec<StockEvent>>, ApiError> {
    let article_id = ArticleId::new(article_id);
    let events = state
        .service
        .stock_events(&article_id, params.limit)
        .await?;
    Ok(Json(events))
}

/// POST /stock
#[tracing::instrument(skip(state, req), fields(article_id = %req.article_id))]
pub async fn create<S: StockStore + 'static, L: StockLedger + 'static>(
    State(state): State<Arc<AppState<S, L>>>,
    Json(req): Json<NewStock>,
) -> Result<(StatusCode, Json<Stock>), ApiError> {
    let stock = state.service.create_stock(req).await?;
    Ok((StatusCode::CREATED, Json(stock)))
}

/// POST /stock/{article_id}/replenish
#[tracing::instrument(skip(state, req))]
pub async fn replenish<S: StockStore + 'static, L: StockLedger + 'static>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(article_id): Path<String>,
    Json(req): Json<AdjustRequest>,
) -> Result<Json<Stock>, ApiError> {
    let article_id = ArticleId::new(article_id);
    let stock = state
        .service
        .replenish(&article_id, req.quantity, &req.reason)
        .await?;
    Ok(Json(stock))
}

/// POST /stock/{article_id}/deduct
#[tracing::instrument(skip(state, req))]
pub async fn deduct<S: StockStore + 'static, L: StockLedger + 'static>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(article_id): Path<String>,
    Json(req): Json<AdjustRequest>,
) -> Result<Json<Stock>, ApiError> {
    let article_id = ArticleId::new(article_id);
    let stock = state
        .service
        .deduct(&article_id, req.quantity, &req.reason)
        .await?;
    Ok(Json(stock))
}
