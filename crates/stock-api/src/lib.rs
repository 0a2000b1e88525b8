//! HTTP surface of the stock reservation engine.
//!
//! Exposes stock queries and admin writes, the reservation protocol, and two
//! HTTP message ingress paths for the order saga: a synchronous push endpoint
//! whose status code tells the broker whether to redeliver, and a queued one
//! feeding the in-process consumer pool. The `stockd` binary additionally
//! consumes the order topics from Kafka when `KAFKA_BROKERS` is set.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use inventory::{AlertPublisher, StockService};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{InMemoryBroker, OrderSagaConsumer};
use stock_ledger::StockLedger;
use stock_store::{CachedStockStore, InMemoryStockCache, StockStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Store as seen by the service: the backend behind the display cache.
pub type AppStore<S> = CachedStockStore<S, InMemoryStockCache>;

pub type AppService<S, L> = StockService<AppStore<S>, L, Arc<dyn AlertPublisher>>;

pub type AppConsumer<S, L> = OrderSagaConsumer<AppStore<S>, L, Arc<dyn AlertPublisher>>;

/// Shared application state accessible from all handlers.
pub struct AppState<S, L> {
    pub service: Arc<AppService<S, L>>,
    pub consumer: AppConsumer<S, L>,
    pub broker: InMemoryBroker,
    /// Attempt at which a pushed delivery that asks for redelivery is
    /// rejected instead.
    pub max_attempts: u32,
}

/// Wires the coordinator, the saga consumer and the in-process broker over
/// one store and ledger.
pub fn create_state<S, L>(
    store: S,
    ledger: L,
    publisher: Arc<dyn AlertPublisher>,
    config: &Config,
) -> Arc<AppState<S, L>>
where
    S: StockStore + 'static,
    L: StockLedger + 'static,
{
    let store = CachedStockStore::new(store, InMemoryStockCache::new(config.cache_ttl));
    let service = Arc::new(
        StockService::new(store, ledger, publisher)
            .with_events_default_limit(config.events_default_limit),
    );

    Arc::new(AppState {
        consumer: OrderSagaConsumer::new(Arc::clone(&service)),
        service,
        broker: InMemoryBroker::new(),
        max_attempts: config.saga_max_attempts.max(1),
    })
}

/// Registers help text for every metric the engine records.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "stock_reservations_total",
        "Successful reserve, confirm and cancel operations"
    );
    metrics::describe_counter!(
        "stock_reservation_failures_total",
        "Rejected reservations by reason"
    );
    metrics::describe_counter!(
        "stock_ledger_append_failures_total",
        "Store mutations whose ledger entry was lost"
    );
    metrics::describe_counter!(
        "stock_low_stock_alerts_total",
        "Low-stock alerts raised after confirm or deduct"
    );
    metrics::describe_counter!(
        "saga_messages_total",
        "Order messages handled, by topic and disposition"
    );
    metrics::describe_counter!(
        "saga_compensations_total",
        "Reservations released while compensating failed placements"
    );
    metrics::describe_counter!(
        "bus_settlements_total",
        "Bus records settled, by topic and settlement"
    );
    metrics::describe_histogram!(
        "saga_message_duration_seconds",
        metrics::Unit::Seconds,
        "Time to handle one order message"
    );
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, L>(state: Arc<AppState<S, L>>, metrics_handle: PrometheusHandle) -> Router
where
    S: StockStore + 'static,
    L: StockLedger + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/stock",
            get(routes::stock::list::<S, L>).post(routes::stock::create::<S, L>),
        )
        .route("/stock/low", get(routes::stock::low::<S, L>))
        .route("/stock/{article_id}", get(routes::stock::get::<S, L>))
        .route("/stock/{article_id}/events", get(routes::stock::events::<S, L>))
        .route(
            "/stock/{article_id}/replenish",
            post(routes::stock::replenish::<S, L>),
        )
        .route("/stock/{article_id}/deduct", post(routes::stock::deduct::<S, L>))
        .route("/reservations", post(routes::reservations::reserve::<S, L>))
        .route(
            "/reservations/confirm",
            post(routes::reservations::confirm::<S, L>),
        )
        .route(
            "/reservations/cancel",
            post(routes::reservations::cancel::<S, L>),
        )
        .route(
            "/orders/{order_id}/reservations",
            get(routes::reservations::for_order::<S, L>),
        )
        .route("/messages/{topic}", post(routes::messages::push::<S, L>))
        .route("/queue", get(routes::messages::queue_status::<S, L>))
        .route("/queue/{topic}", post(routes::messages::enqueue::<S, L>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
