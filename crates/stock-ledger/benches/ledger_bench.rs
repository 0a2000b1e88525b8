use chrono::Utc;
use common::{ArticleId, OrderId};
use criterion::{Criterion, criterion_group, criterion_main};
use stock_ledger::{
    InMemoryStockLedger, NewStockEvent, Sequence, StockEvent, StockLedger, StockLedgerExt,
    derive_reservation,
};

fn order_history(order_id: &OrderId, article_id: &ArticleId, cycles: i64) -> Vec<StockEvent> {
    let mut events = Vec::new();
    let mut seq = Sequence::initial();
    for _ in 0..cycles {
        for new in [
            NewStockEvent::reserve(order_id.clone(), article_id.clone(), 2),
            NewStockEvent::cancel_reservation(order_id.clone(), article_id.clone(), 2),
        ] {
            seq = seq.next();
            events.push(new.into_event(seq, Utc::now()));
        }
    }
    events
}

fn bench_append_single_event(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("ledger/append_single_event", |b| {
        b.iter(|| {
            rt.block_on(async {
                let ledger = InMemoryStockLedger::new();
                ledger
                    .append(NewStockEvent::add(ArticleId::new("A1"), 10))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_derive_reservation(c: &mut Criterion) {
    let order_id = OrderId::new("O1");
    let article_id = ArticleId::new("A1");
    let events = order_history(&order_id, &article_id, 50);

    c.bench_function("ledger/derive_reservation_100_events", |b| {
        b.iter(|| derive_reservation(&events, &order_id, &article_id));
    });
}

fn bench_has_active_reservation(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = InMemoryStockLedger::new();
    let order_id = OrderId::new("O1");
    let article_id = ArticleId::new("A1");

    // Pre-populate with unrelated traffic around the pair of interest
    rt.block_on(async {
        for i in 0..500 {
            ledger
                .append(NewStockEvent::reserve(
                    OrderId::new(format!("O{i}")),
                    ArticleId::new(format!("A{}", i % 20)),
                    1,
                ))
                .await
                .unwrap();
        }
    });

    c.bench_function("ledger/has_active_reservation_500_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                ledger
                    .has_active_reservation(&order_id, &article_id)
                    .await
                    .unwrap()
            })
        });
    });
}

criterion_group!(
    benches,
    bench_append_single_event,
    bench_derive_reservation,
    bench_has_active_reservation,
);
criterion_main!(benches);
