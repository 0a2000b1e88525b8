//! Kafka bus adapter tests
//!
//! Ignored by default because they need Docker. Run with:
//!
//! ```bash
//! cargo test -p stock-bus --test kafka_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use common::{ArticleId, OrderId};
use inventory::{AlertPublisher, InMemoryAlertPublisher, InsufficientStockAlert, StockService};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Headers, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use saga::OrderSagaConsumer;
use serial_test::serial;
use stock_bus::{BusConfig, KafkaAlertPublisher, KafkaOrderConsumer};
use stock_ledger::InMemoryStockLedger;
use stock_store::{InMemoryStockStore, NewStock};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Kafka>,
    brokers: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Kafka::default().start().await.unwrap();
            let port = container.get_host_port_ipv4(KAFKA_PORT).await.unwrap();
            Arc::new(ContainerInfo {
                container,
                brokers: format!("127.0.0.1:{port}"),
            })
        })
        .await
        .clone()
}

fn producer(brokers: &str) -> FutureProducer {
    ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("message.timeout.ms", "10000")
        .create()
        .unwrap()
}

fn reader(brokers: &str, group: &str, topic: &str) -> StreamConsumer {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("group.id", group)
        .set("auto.offset.reset", "earliest")
        .create()
        .unwrap();
    consumer.subscribe(&[topic]).unwrap();
    consumer
}

async fn produce(brokers: &str, topic: &str, payload: &str) {
    producer(brokers)
        .send(
            FutureRecord::<(), str>::to(topic).payload(payload),
            Timeout::After(Duration::from_secs(10)),
        )
        .await
        .unwrap();
}

type Service = StockService<InMemoryStockStore, InMemoryStockLedger, InMemoryAlertPublisher>;

async fn service_with(article: &str, quantity: i64) -> Arc<Service> {
    let service = Arc::new(StockService::new(
        InMemoryStockStore::new(),
        InMemoryStockLedger::new(),
        InMemoryAlertPublisher::new(),
    ));
    service
        .create_stock(NewStock::new(article, quantity))
        .await
        .unwrap();
    service
}

/// Polls until `check` holds or the deadline passes.
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..150 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    false
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn placed_order_from_the_bus_is_reserved() {
    let info = get_container_info().await;
    let service = service_with("A1", 10).await;
    let handler = Arc::new(OrderSagaConsumer::new(Arc::clone(&service)));

    let config = BusConfig::new(&info.brokers).group_id("stock-placed");
    let consumer = KafkaOrderConsumer::new(&config, handler).unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(async move {
        consumer
            .run(async {
                let _ = stop_rx.await;
            })
            .await
    });

    produce(
        &info.brokers,
        "orders_placed",
        r#"{"orderId": "O1", "articles": [{"articleId": "A1", "quantity": 3}]}"#,
    )
    .await;

    let reserved = eventually(|| {
        let service = Arc::clone(&service);
        async move { service.get_stock(&ArticleId::new("A1")).await.unwrap().reserved == 3 }
    })
    .await;
    let _ = stop_tx.send(());
    let report = running.await.unwrap();

    assert!(reserved, "order was never reserved");
    assert!(report.committed >= 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn rejected_order_lands_on_the_dead_letter_topic() {
    let info = get_container_info().await;
    let service = service_with("A1", 10).await;
    let handler = Arc::new(OrderSagaConsumer::new(Arc::clone(&service)));

    let config = BusConfig::new(&info.brokers)
        .group_id("stock-dead-letter")
        .dead_letter_topic("stock.orders.dead_letter.test");
    let consumer = KafkaOrderConsumer::new(&config, handler).unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(async move {
        consumer
            .run(async {
                let _ = stop_rx.await;
            })
            .await
    });

    produce(&info.brokers, "order.canceled", r#"{"orderId": ""}"#).await;

    let dead_letters = reader(&info.brokers, "dlq-reader", "stock.orders.dead_letter.test");
    let record = tokio::time::timeout(Duration::from_secs(30), dead_letters.recv())
        .await
        .unwrap()
        .unwrap();
    let _ = stop_tx.send(());
    running.await.unwrap();

    assert_eq!(record.payload().unwrap(), br#"{"orderId": ""}"#);
    let origin = record
        .headers()
        .unwrap()
        .iter()
        .find(|h| h.key == "x-original-topic")
        .and_then(|h| h.value)
        .unwrap();
    assert_eq!(origin, b"order.canceled");
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn alerts_are_published_under_their_routing_key() {
    let info = get_container_info().await;
    let publisher = KafkaAlertPublisher::new(&BusConfig::new(&info.brokers)).unwrap();

    publisher
        .publish_insufficient_stock(InsufficientStockAlert {
            order_id: OrderId::new("O7"),
            article_ids: vec![ArticleId::new("A2")],
        })
        .await
        .unwrap();

    let alerts = reader(&info.brokers, "alert-reader", "insufficient_stock");
    let record = tokio::time::timeout(Duration::from_secs(30), alerts.recv())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(record.key(), Some(&b"O7"[..]));
    let alert: InsufficientStockAlert = serde_json::from_slice(record.payload().unwrap()).unwrap();
    assert_eq!(alert.article_ids, vec![ArticleId::new("A2")]);
}
