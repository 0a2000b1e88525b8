//! `stockd` entry point.

use std::error::Error;
use std::sync::Arc;

use inventory::{AlertPublisher, LoggingAlertPublisher};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::ConsumerPool;
use sqlx::postgres::PgPoolOptions;
use stock_api::config::Config;
use stock_bus::{KafkaAlertPublisher, KafkaOrderConsumer};
use stock_ledger::{InMemoryStockLedger, PostgresStockLedger, StockLedger};
use stock_store::{InMemoryStockStore, PostgresStockStore, StockStore};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Serves HTTP, drains the in-process queue and, when a broker is
/// configured, consumes the order topics until a shutdown signal.
async fn serve<S, L>(
    store: S,
    ledger: L,
    config: Config,
    metrics_handle: PrometheusHandle,
) -> Result<(), BoxError>
where
    S: StockStore + 'static,
    L: StockLedger + 'static,
{
    let bus = config.bus();
    let publisher: Arc<dyn AlertPublisher> = match &bus {
        Some(bus) => Arc::new(KafkaAlertPublisher::new(bus)?),
        None => {
            tracing::warn!("KAFKA_BROKERS not set, alerts are only logged");
            Arc::new(LoggingAlertPublisher)
        }
    };
    let state = stock_api::create_state(store, ledger, publisher, &config);
    let handler = Arc::new(state.consumer.clone());

    let (stop_tx, stop_rx) = watch::channel(false);
    let stopped = |mut rx: watch::Receiver<bool>| async move {
        let _ = rx.changed().await;
    };

    let pool = ConsumerPool::new(Arc::clone(&handler))
        .workers(config.saga_workers)
        .max_attempts(config.saga_max_attempts);
    let broker = state.broker.clone();
    let pool_stop = stopped(stop_rx.clone());
    let pool_task = tokio::spawn(async move { pool.run(&broker, pool_stop).await });

    let bus_task = match &bus {
        Some(bus) => {
            let consumer = KafkaOrderConsumer::new(bus, Arc::clone(&handler))?
                .max_attempts(config.saga_max_attempts);
            let bus_stop = stopped(stop_rx.clone());
            Some(tokio::spawn(async move { consumer.run(bus_stop).await }))
        }
        None => None,
    };

    let app = stock_api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting stock API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = stop_tx.send(true);
    let report = pool_task.await?;
    tracing::info!(?report, "queue consumer stopped");
    if let Some(task) = bus_task {
        let report = task.await?;
        tracing::info!(?report, "bus consumer stopped");
    }
    tracing::info!("server shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = Config::from_env()?;

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
    stock_api::describe_metrics();

    // 3. Pick backends and serve
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(&url)
                .await?;
            let ledger = PostgresStockLedger::new(pool.clone());
            ledger.run_migrations().await?;
            tracing::info!(
                max_connections = config.database_max_connections,
                "using PostgreSQL store and ledger"
            );
            serve(PostgresStockStore::new(pool), ledger, config, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store and ledger");
            serve(
                InMemoryStockStore::new(),
                InMemoryStockLedger::new(),
                config,
                metrics_handle,
            )
            .await
        }
    }
}
