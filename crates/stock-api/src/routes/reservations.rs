//! Reservation protocol endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{ArticleId, OrderId};
use serde::{Deserialize, Serialize};
use stock_ledger::{ReservationState, StockLedger};
use stock_store::{Stock, StockStore};

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    pub order_id: OrderId,
    pub article_id: ArticleId,
    pub quantity: i64,
}

/// Confirm and cancel take the quantity from the live reservation.
#[derive(Debug, Deserialize)]
pub struct SettleRequest {
    pub order_id: OrderId,
    pub article_id: ArticleId,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct OrderReservationsResponse {
    pub order_id: OrderId,
    pub reservations: BTreeMap<ArticleId, ReservationState>,
}

/// POST /reservations
#[tracing::instrument(skip(state, req), fields(order_id = %req.order_id, article_id = %req.article_id))]
pub async fn reserve<S: StockStore + 'static, L: StockLedger + 'static>(
    State(state): State<Arc<AppState<S, L>>>,
    Json(req): Json<ReserveRequest>,
) -> Result<(StatusCode, Json<Stock>), ApiError> {
    let stock = state
        .service
        .reserve(&req.order_id, &req.article_id, req.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(stock)))
}

/// POST /reservations/confirm
#[tracing::instrument(skip(state, req), fields(order_id = %req.order_id, article_id = %req.article_id))]
pub async fn confirm<S: StockStore + 'static, L: StockLedger + 'static>(
    State(state): State<Arc<AppState<S, L>>>,
    Json(req): Json<SettleRequest>,
) -> Result<Json<Stock>, ApiError> {
    let stock = state
        .service
        .confirm(&req.order_id, &req.article_id, &req.reason)
        .await?;
    Ok(Json(stock))
}

/// POST /reservations/cancel
#[tracing::instrument(skip(state, req), fields(order_id = %req.order_id, article_id = %req.article_id))]
pub async fn cancel<S: StockStore + 'static, L: StockLedger + 'static>(
    State(state): State<Arc<AppState<S, L>>>,
    Json(req): Json<SettleRequest>,
) -> Result<Json<Stock>, ApiError> {
    let stock = state
        .service
        .cancel(&req.order_id, &req.article_id, &req.reason)
        .await?;
    Ok(Json(stock))
}

/// GET /orders/{order_id}/reservations: derived state per article.
pub async fn for_order<S: StockStore + 'static, L: StockLedger + 'static>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderReservationsResponse>, ApiError> {
    let order_id = OrderId::new(order_id);
    let reservations = state.service.order_reservations(&order_id).await?;
    Ok(Json(OrderReservationsResponse {
        order_id,
        reservations,
    }))
}
