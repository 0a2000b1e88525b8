//! Reservation coordinator.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use common::{ArticleId, OrderId};
use stock_ledger::{
    NewStockEvent, ReservationState, StockEvent, StockLedger, StockLedgerExt,
};
use stock_store::{CachedStockStore, NewStock, Stock, StockCache, StockStore};
use tokio::sync::{Mutex, MutexGuard};

use crate::error::{Result, StockError};
use crate::notifications::{AlertPublisher, LowStockAlert};

/// Number of ledger entries returned when a caller asks for limit 0.
pub const DEFAULT_EVENTS_LIMIT: usize = 50;

const PAIR_LOCK_STRIPES: usize = 64;

/// Business-rule layer over the stock store and ledger.
///
/// The store holds the authoritative counters; the ledger records every
/// change and is the only place reservation lifecycle is derived from.
/// A store mutation is never rolled back because its ledger append failed.
/// The failure is logged and counted in `stock_ledger_append_failures_total`,
/// and lifecycle derivation for that pair may be incomplete afterwards.
///
/// Reserve, confirm and cancel for one order/article pair are serialized
/// inside this process, so the lifecycle check and the ledger append that
/// follows it cannot interleave with a concurrent redelivery.
pub struct StockService<S, L, P> {
    store: S,
    ledger: L,
    publisher: P,
    events_default_limit: usize,
    pair_locks: Vec<Mutex<()>>,
}

impl<S, L, P> StockService<S, L, P>
where
    S: StockStore,
    L: StockLedger,
    P: AlertPublisher,
{
    pub fn new(store: S, ledger: L, publisher: P) -> Self {
        Self {
            store,
            ledger,
            publisher,
            events_default_limit: DEFAULT_EVENTS_LIMIT,
            pair_locks: (0..PAIR_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Overrides the limit used when `stock_events` is called with 0.
    pub fn with_events_default_limit(mut self, limit: usize) -> Self {
        self.events_default_limit = limit.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Creates an article's row and records the initial quantity as ADD.
    #[tracing::instrument(skip(self, new_stock), fields(article_id = %new_stock.article_id))]
    pub async fn create_stock(&self, new_stock: NewStock) -> Result<Stock> {
        let stock = self.store.create(new_stock).await?;
        self.record(NewStockEvent::add(stock.article_id.clone(), stock.quantity))
            .await;

        tracing::info!(quantity = stock.quantity, "stock created");
        Ok(stock)
    }

    /// Authoritative read.
    pub async fn get_stock(&self, article_id: &ArticleId) -> Result<Stock> {
        Ok(self.store.get(article_id).await?)
    }

    pub async fn list_stocks(&self) -> Result<Vec<Stock>> {
        Ok(self.store.list().await?)
    }

    pub async fn low_stocks(&self) -> Result<Vec<Stock>> {
        Ok(self.store.list_low_stock().await?)
    }

    /// Most recent ledger entries for an article, newest first.
    pub async fn stock_events(&self, article_id: &ArticleId, limit: usize) -> Result<Vec<StockEvent>> {
        let limit = if limit == 0 {
            self.events_default_limit
        } else {
            limit
        };
        Ok(self.ledger.events_for_article(article_id, limit).await?)
    }

    /// Adds delivered units to the on-hand quantity.
    ///
    /// The addition happens under the article's row lock, so it composes
    /// with concurrent confirmations instead of overwriting them.
    #[tracing::instrument(skip(self))]
    pub async fn replenish(
        &self,
        article_id: &ArticleId,
        quantity: i64,
        reason: &str,
    ) -> Result<Stock> {
        ensure_positive(quantity)?;

        let stock = self.store.adjust_quantity(article_id, quantity).await?;

        self.record(NewStockEvent::replenish(article_id.clone(), quantity).reason(reason))
            .await;

        tracing::info!(new_quantity = stock.quantity, "stock replenished");
        Ok(stock)
    }

    /// Removes units outside any reservation (damage, shrinkage, manual sale).
    ///
    /// Units held by reservations cannot be deducted. Availability is checked
    /// under the same row lock that applies the deduction.
    #[tracing::instrument(skip(self))]
    pub async fn deduct(&self, article_id: &ArticleId, quantity: i64, reason: &str) -> Result<Stock> {
        ensure_positive(quantity)?;

        let stock = self.store.adjust_quantity(article_id, -quantity).await?;

        self.record(NewStockEvent::deduct(article_id.clone(), quantity).reason(reason))
            .await;
        self.check_low_stock(&stock).await;

        tracing::info!(new_quantity = stock.quantity, "stock deducted");
        Ok(stock)
    }

    /// Holds units for an order.
    ///
    /// Fails with `DuplicateReservation` while the order already holds a live
    /// reservation on the article, which makes redelivered placements harmless.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(
        &self,
        order_id: &OrderId,
        article_id: &ArticleId,
        quantity: i64,
    ) -> Result<Stock> {
        ensure_positive(quantity)?;
        let _pair = self.lock_pair(order_id, article_id).await;

        if self
            .ledger
            .has_active_reservation(order_id, article_id)
            .await?
        {
            metrics::counter!("stock_reservation_failures_total", "reason" => "duplicate_reservation")
                .increment(1);
            return Err(StockError::DuplicateReservation {
                order_id: order_id.clone(),
                article_id: article_id.clone(),
            });
        }

        let stock = match self.store.reserve(article_id, quantity).await {
            Ok(stock) => stock,
            Err(e) => {
                let err = StockError::from(e);
                metrics::counter!("stock_reservation_failures_total", "reason" => err.kind())
                    .increment(1);
                return Err(err);
            }
        };

        self.record(NewStockEvent::reserve(
            order_id.clone(),
            article_id.clone(),
            quantity,
        ))
        .await;

        metrics::counter!("stock_reservations_total", "operation" => "reserve").increment(1);
        tracing::info!(
            reserved = stock.reserved,
            available = stock.available_quantity(),
            "stock reserved"
        );
        Ok(stock)
    }

    /// Turns the order's live reservation into a deduction.
    ///
    /// The quantity comes from the reservation itself. An empty `reason` falls
    /// back to a generated one.
    #[tracing::instrument(skip(self))]
    pub async fn confirm(
        &self,
        order_id: &OrderId,
        article_id: &ArticleId,
        reason: &str,
    ) -> Result<Stock> {
        let _pair = self.lock_pair(order_id, article_id).await;
        let quantity = self.active_quantity(order_id, article_id).await?;

        let stock = self
            .store
            .confirm_reservation(article_id, quantity)
            .await?;

        self.record(
            NewStockEvent::confirm_reservation(order_id.clone(), article_id.clone(), quantity)
                .reason(reason),
        )
        .await;
        self.check_low_stock(&stock).await;

        metrics::counter!("stock_reservations_total", "operation" => "confirm").increment(1);
        tracing::info!(quantity, new_quantity = stock.quantity, "reservation confirmed");
        Ok(stock)
    }

    /// Releases the order's live reservation.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(
        &self,
        order_id: &OrderId,
        article_id: &ArticleId,
        reason: &str,
    ) -> Result<Stock> {
        let _pair = self.lock_pair(order_id, article_id).await;
        let quantity = self.active_quantity(order_id, article_id).await?;

        let stock = self.store.cancel_reservation(article_id, quantity).await?;

        self.record(
            NewStockEvent::cancel_reservation(order_id.clone(), article_id.clone(), quantity)
                .reason(reason),
        )
        .await;

        metrics::counter!("stock_reservations_total", "operation" => "cancel").increment(1);
        tracing::info!(quantity, reserved = stock.reserved, "reservation cancelled");
        Ok(stock)
    }

    /// Derived lifecycle state of one order/article pair.
    pub async fn reservation_state(
        &self,
        order_id: &OrderId,
        article_id: &ArticleId,
    ) -> Result<ReservationState> {
        Ok(self.ledger.reservation_state(order_id, article_id).await?)
    }

    /// Derived lifecycle state of every article an order touched.
    pub async fn order_reservations(
        &self,
        order_id: &OrderId,
    ) -> Result<BTreeMap<ArticleId, ReservationState>> {
        Ok(self.ledger.order_reservations(order_id).await?)
    }

    async fn lock_pair(&self, order_id: &OrderId, article_id: &ArticleId) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        (order_id, article_id).hash(&mut hasher);
        let stripe = (hasher.finish() as usize) % self.pair_locks.len();
        self.pair_locks[stripe].lock().await
    }

    async fn active_quantity(&self, order_id: &OrderId, article_id: &ArticleId) -> Result<i64> {
        let state = self.ledger.reservation_state(order_id, article_id).await?;
        match state {
            ReservationState::Active { quantity, .. } => Ok(quantity),
            ReservationState::None => Err(StockError::NoActiveReservation {
                order_id: order_id.clone(),
                article_id: article_id.clone(),
            }),
            ReservationState::Cancelled { .. } => Err(StockError::AlreadyCancelled {
                order_id: order_id.clone(),
                article_id: article_id.clone(),
            }),
            ReservationState::Confirmed { .. } => Err(StockError::AlreadyConfirmed {
                order_id: order_id.clone(),
                article_id: article_id.clone(),
            }),
        }
    }

    async fn record(&self, event: NewStockEvent) {
        let article_id = event.article_id.clone();
        let event_type = event.event_type;

        if let Err(e) = self.ledger.append(event).await {
            metrics::counter!(
                "stock_ledger_append_failures_total",
                "event_type" => event_type.as_str()
            )
            .increment(1);
            tracing::error!(
                %article_id,
                %event_type,
                error = %e,
                "failed to append stock event; store mutation kept"
            );
        }
    }

    async fn check_low_stock(&self, stock: &Stock) {
        if !stock.is_low_stock() {
            return;
        }

        metrics::counter!("stock_low_stock_alerts_total").increment(1);
        let alert = LowStockAlert::from_stock(stock);
        if let Err(e) = self.publisher.publish_low_stock(alert).await {
            tracing::warn!(
                article_id = %stock.article_id,
                error = %e,
                "failed to publish low stock alert"
            );
        }
    }
}

impl<S, C, L, P> StockService<CachedStockStore<S, C>, L, P>
where
    S: StockStore,
    C: StockCache,
    L: StockLedger,
    P: AlertPublisher,
{
    /// Display read through the cache. Never use the result for reservation
    /// decisions.
    pub async fn get_stock_cached(&self, article_id: &ArticleId) -> Result<Stock> {
        Ok(self.store.get_cached(article_id).await?)
    }
}

fn ensure_positive(quantity: i64) -> Result<()> {
    if quantity <= 0 {
        return Err(StockError::InvalidQuantity(quantity));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use stock_ledger::{InMemoryStockLedger, ReservationStatus, StockEventType};
    use stock_store::{InMemoryStockStore, StoreError};

    use super::*;
    use crate::notifications::InMemoryAlertPublisher;

    type TestService = StockService<InMemoryStockStore, InMemoryStockLedger, InMemoryAlertPublisher>;

    fn a(id: &str) -> ArticleId {
        ArticleId::new(id)
    }

    fn o(id: &str) -> OrderId {
        OrderId::new(id)
    }

    async fn service_with(article: &str, quantity: i64, min_stock: i64) -> TestService {
        let service = StockService::new(
            InMemoryStockStore::new(),
            InMemoryStockLedger::new(),
            InMemoryAlertPublisher::new(),
        );
        service
            .create_stock(NewStock::new(article, quantity).min_stock(min_stock))
            .await
            .unwrap();
        service
    }

    #[tokio::test]
    async fn create_records_add_event() {
        let service = service_with("A1", 10, 5).await;
        let events = service.stock_events(&a("A1"), 0).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, StockEventType::Add);
        assert_eq!(events[0].quantity, 10);
    }

    #[tokio::test]
    async fn reserve_then_confirm_fires_low_stock() {
        let service = service_with("A1", 10, 5).await;

        let stock = service.reserve(&o("O1"), &a("A1"), 6).await.unwrap();
        assert_eq!((stock.reserved, stock.available_quantity()), (6, 4));
        assert!(service.publisher().low_stock_alerts().await.is_empty());

        let stock = service.confirm(&o("O1"), &a("A1"), "").await.unwrap();
        assert_eq!((stock.quantity, stock.reserved), (4, 0));

        let alerts = service.publisher().low_stock_alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].current_quantity, 4);
        assert_eq!(alerts[0].min_quantity, 5);
    }

    #[tokio::test]
    async fn insufficient_reserve_changes_nothing() {
        let service = service_with("A1", 3, 0).await;

        let err = service.reserve(&o("O2"), &a("A1"), 5).await.unwrap_err();
        assert!(matches!(err, StockError::InsufficientStock { available: 3, .. }));

        let stock = service.get_stock(&a("A1")).await.unwrap();
        assert_eq!((stock.quantity, stock.reserved), (3, 0));
        assert_eq!(
            service.reservation_state(&o("O2"), &a("A1")).await.unwrap(),
            ReservationState::None
        );
    }

    #[tokio::test]
    async fn second_reserve_for_same_pair_is_duplicate() {
        let service = service_with("A1", 10, 0).await;
        service.reserve(&o("O1"), &a("A1"), 2).await.unwrap();

        let err = service.reserve(&o("O1"), &a("A1"), 2).await.unwrap_err();
        assert!(matches!(err, StockError::DuplicateReservation { .. }));
        assert_eq!(service.get_stock(&a("A1")).await.unwrap().reserved, 2);
    }

    #[tokio::test]
    async fn reserve_again_after_cancel_is_allowed() {
        let service = service_with("A1", 10, 0).await;
        service.reserve(&o("O1"), &a("A1"), 2).await.unwrap();
        service.cancel(&o("O1"), &a("A1"), "").await.unwrap();

        service.reserve(&o("O1"), &a("A1"), 3).await.unwrap();
        let state = service.reservation_state(&o("O1"), &a("A1")).await.unwrap();
        assert_eq!(state.status(), ReservationStatus::Active);
        assert_eq!(state.quantity(), Some(3));
    }

    #[tokio::test]
    async fn confirm_and_cancel_report_lifecycle_errors() {
        let service = service_with("A1", 10, 0).await;

        assert!(matches!(
            service.cancel(&o("O1"), &a("A1"), "").await,
            Err(StockError::NoActiveReservation { .. })
        ));

        service.reserve(&o("O1"), &a("A1"), 2).await.unwrap();
        service.confirm(&o("O1"), &a("A1"), "").await.unwrap();
        assert!(matches!(
            service.confirm(&o("O1"), &a("A1"), "").await,
            Err(StockError::AlreadyConfirmed { .. })
        ));
        assert!(matches!(
            service.cancel(&o("O1"), &a("A1"), "").await,
            Err(StockError::AlreadyConfirmed { .. })
        ));

        service.reserve(&o("O2"), &a("A1"), 1).await.unwrap();
        service.cancel(&o("O2"), &a("A1"), "").await.unwrap();
        assert!(matches!(
            service.confirm(&o("O2"), &a("A1"), "").await,
            Err(StockError::AlreadyCancelled { .. })
        ));
    }

    #[tokio::test]
    async fn deduct_cannot_touch_reserved_units() {
        let service = service_with("A1", 10, 0).await;
        service.reserve(&o("O1"), &a("A1"), 8).await.unwrap();

        let err = service.deduct(&a("A1"), 3, "damaged").await.unwrap_err();
        assert!(matches!(err, StockError::InsufficientStock { available: 2, .. }));

        let stock = service.deduct(&a("A1"), 2, "damaged").await.unwrap();
        assert_eq!((stock.quantity, stock.reserved), (8, 8));
    }

    #[tokio::test]
    async fn replenish_and_deduct_record_reasons() {
        let service = service_with("A1", 10, 0).await;
        service.replenish(&a("A1"), 5, "delivery").await.unwrap();
        service.deduct(&a("A1"), 1, "").await.unwrap();

        let events = service.stock_events(&a("A1"), 2).await.unwrap();
        assert_eq!(events[0].event_type, StockEventType::Deduct);
        assert!(!events[0].reason.is_empty());
        assert_eq!(events[1].event_type, StockEventType::Replenish);
        assert_eq!(events[1].reason, "delivery");
        assert_eq!(service.get_stock(&a("A1")).await.unwrap().quantity, 14);
    }

    #[tokio::test]
    async fn replenish_overflow_is_invalid_quantity() {
        let service = service_with("A1", 10, 0).await;

        let err = service.replenish(&a("A1"), i64::MAX, "").await.unwrap_err();
        assert!(matches!(err, StockError::InvalidQuantity(_)));
        assert_eq!(service.get_stock(&a("A1")).await.unwrap().quantity, 10);

        let events = service.stock_events(&a("A1"), 0).await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn non_positive_quantities_are_rejected() {
        let service = service_with("A1", 10, 0).await;
        assert!(matches!(
            service.reserve(&o("O1"), &a("A1"), 0).await,
            Err(StockError::InvalidQuantity(0))
        ));
        assert!(matches!(
            service.replenish(&a("A1"), -2, "").await,
            Err(StockError::InvalidQuantity(-2))
        ));
    }

    #[tokio::test]
    async fn lost_ledger_append_keeps_store_mutation() {
        let service = service_with("A1", 10, 0).await;
        service.ledger().set_fail_on_append(true);

        let stock = service.replenish(&a("A1"), 5, "").await.unwrap();
        assert_eq!(stock.quantity, 15);
        assert_eq!(service.ledger().event_count().await, 1);
    }

    #[tokio::test]
    async fn publish_failure_does_not_fail_confirm() {
        let service = service_with("A1", 2, 5).await;
        service.publisher().set_fail_on_publish(true);

        service.reserve(&o("O1"), &a("A1"), 1).await.unwrap();
        let stock = service.confirm(&o("O1"), &a("A1"), "").await.unwrap();
        assert_eq!(stock.quantity, 1);

        let stock = service.deduct(&a("A1"), 1, "").await.unwrap();
        assert_eq!(stock.quantity, 0);
    }

    #[tokio::test]
    async fn unavailable_store_is_retryable() {
        let service = service_with("A1", 10, 0).await;
        service.store().set_unavailable(true);

        let err = service.reserve(&o("O1"), &a("A1"), 1).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            StockError::TransientStore(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn events_limit_zero_uses_default() {
        let service = service_with("A1", 10, 0)
            .await
            .with_events_default_limit(3);
        for _ in 0..5 {
            service.replenish(&a("A1"), 1, "").await.unwrap();
        }

        assert_eq!(service.stock_events(&a("A1"), 0).await.unwrap().len(), 3);
        assert_eq!(service.stock_events(&a("A1"), 10).await.unwrap().len(), 6);
    }
}
