//! Reconciliation sweep: SHIPPING orders that have sat long enough are
//! marked DELIVERED.
//!
//! The scheduler is an owned background task with an explicit start/stop
//! lifecycle. Only one sweep runs at a time, whether it came from the
//! periodic tick or from a manual trigger. Shutdown is honoured between
//! orders, never in the middle of a transition.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use crate::clock::Clock;
use crate::domain::errors::DomainError;
use crate::domain::order::OrderStatus;
use crate::domain::ports::OrderLedger;

use super::lifecycle::{Initiator, OrderLifecycle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepConfig {
    pub period: Duration,
    pub threshold: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            threshold: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SweepReport {
    pub scanned: usize,
    pub delivered: usize,
    /// Orders that left SHIPPING before we got to them.
    pub skipped: usize,
    pub failed: usize,
    pub interrupted: bool,
}

pub struct ReconciliationScheduler {
    ledger: Arc<dyn OrderLedger>,
    lifecycle: Arc<OrderLifecycle>,
    clock: Arc<dyn Clock>,
    config: SweepConfig,
    in_flight: Mutex<()>,
}

/// Handle to a running scheduler task.
pub struct SchedulerHandle {
    shutdown: CancellationToken,
    join: JoinHandle<()>,
}

impl ReconciliationScheduler {
    pub fn new(
        ledger: Arc<dyn OrderLedger>,
        lifecycle: Arc<OrderLifecycle>,
        clock: Arc<dyn Clock>,
        config: SweepConfig,
    ) -> Self {
        Self {
            ledger,
            lifecycle,
            clock,
            config,
            in_flight: Mutex::new(()),
        }
    }

    pub fn config(&self) -> SweepConfig {
        self.config
    }

    /// Spawns the periodic loop on the current tokio runtime.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> SchedulerHandle {
        let token = shutdown.clone();
        let join = tokio::spawn(async move { self.run(token).await });
        SchedulerHandle { shutdown, join }
    }

    async fn run(&self, shutdown: CancellationToken) {
        log::info!(
            "Reconciliation scheduler started (period {:?}, threshold {:?})",
            self.config.period,
            self.config.threshold
        );

        let mut ticker = tokio::time::interval(self.config.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.cancelled() => break,
            }

            match self.sweep_guarded(shutdown.clone()).await {
                Ok(Some(report)) if report.delivered > 0 || report.failed > 0 => {
                    log::info!("Reconciliation sweep finished: {:?}", report)
                }
                Ok(Some(report)) => log::debug!("Reconciliation sweep finished: {:?}", report),
                Ok(None) => log::debug!("Reconciliation sweep already running, tick skipped"),
                Err(e) => log::warn!("Reconciliation sweep failed, retrying next tick: {}", e),
            }
        }

        log::info!("Reconciliation scheduler stopped");
    }

    /// Runs one sweep now. Returns `None` if a sweep is already in flight.
    pub async fn run_once(&self) -> Result<Option<SweepReport>, DomainError> {
        self.sweep_guarded(CancellationToken::new()).await
    }

    async fn sweep_guarded(
        &self,
        cancel: CancellationToken,
    ) -> Result<Option<SweepReport>, DomainError> {
        let Ok(_flight) = self.in_flight.try_lock() else {
            return Ok(None);
        };

        let ledger = Arc::clone(&self.ledger);
        let lifecycle = Arc::clone(&self.lifecycle);
        let threshold = self.config.threshold;
        let now = self.clock.now();

        // Storage calls block, so the scan runs off the async workers. It is
        // awaited to completion even when shutdown fires mid-scan.
        let report = tokio::task::spawn_blocking(move || {
            sweep(ledger.as_ref(), &lifecycle, now, threshold, &cancel)
        })
        .await
        .map_err(|e| DomainError::Internal(format!("sweep task failed: {}", e)))??;

        Ok(Some(report))
    }

    /// Synchronous sweep against an explicit `now`, bypassing the
    /// single-flight guard.
    #[cfg(test)]
    pub(crate) fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, DomainError> {
        sweep(
            self.ledger.as_ref(),
            &self.lifecycle,
            now,
            self.config.threshold,
            &CancellationToken::new(),
        )
    }
}

fn sweep(
    ledger: &dyn OrderLedger,
    lifecycle: &OrderLifecycle,
    now: DateTime<Utc>,
    threshold: Duration,
    cancel: &CancellationToken,
) -> Result<SweepReport, DomainError> {
    let threshold = chrono::Duration::from_std(threshold)
        .map_err(|e| DomainError::Internal(format!("invalid threshold: {}", e)))?;
    let shipping = ledger.list_by_status(OrderStatus::Shipping)?;
    let mut report = SweepReport {
        scanned: shipping.len(),
        ..SweepReport::default()
    };

    for order in shipping {
        if cancel.is_cancelled() {
            log::info!("Reconciliation sweep interrupted by shutdown");
            report.interrupted = true;
            break;
        }
        if now - order.updated_at < threshold {
            continue;
        }

        match lifecycle.transition(order.id, OrderStatus::Delivered, Initiator::Sweep) {
            Ok(_) => {
                log::info!("Auto-delivered order {}", order.id);
                report.delivered += 1;
            }
            Err(DomainError::InvalidTransition { from, .. }) => {
                log::debug!("Order {} already {}, skipping", order.id, from);
                report.skipped += 1;
            }
            Err(e) => {
                log::warn!("Failed to auto-deliver order {}: {}", order.id, e);
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

impl SchedulerHandle {
    /// Signals shutdown and waits for the loop to exit.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.join.await {
            log::error!("Reconciliation scheduler task panicked: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bigdecimal::BigDecimal;
    use chrono::Duration as ChronoDuration;
    use uuid::Uuid;

    use crate::clock::ManualClock;
    use crate::domain::auth::Actor;
    use crate::domain::order::{DeliveryDetails, NewOrder, Order, PaymentMethod};
    use crate::infrastructure::memory::InMemoryLedger;

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        clock: Arc<ManualClock>,
        lifecycle: Arc<OrderLifecycle>,
        scheduler: Arc<ReconciliationScheduler>,
        admin: Actor,
    }

    fn fixture_with(ledger: Arc<dyn OrderLedger>, memory: Arc<InMemoryLedger>) -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let lifecycle = Arc::new(OrderLifecycle::new(
            ledger.clone(),
            clock.clone(),
            Duration::from_secs(2),
        ));
        let scheduler = Arc::new(ReconciliationScheduler::new(
            ledger,
            lifecycle.clone(),
            clock.clone(),
            SweepConfig {
                period: Duration::from_millis(10),
                threshold: Duration::from_secs(120),
            },
        ));
        Fixture {
            ledger: memory,
            clock,
            lifecycle,
            scheduler,
            admin: Actor::admin(Uuid::new_v4()),
        }
    }

    fn fixture() -> Fixture {
        let memory = Arc::new(InMemoryLedger::new());
        fixture_with(memory.clone(), memory)
    }

    impl Fixture {
        fn shipping_order(&self, minutes_ago: i64) -> Order {
            let order = self
                .lifecycle
                .open(NewOrder {
                    user_id: Uuid::new_v4(),
                    delivery: DeliveryDetails {
                        customer_name: "Cy".into(),
                        phone: "555-0102".into(),
                        address: "3 Hill Rd".into(),
                    },
                    payment_method: PaymentMethod::Qr,
                    items: vec![],
                    total_amount: BigDecimal::from(9),
                    currency: "USD".into(),
                    created_at: self.clock.now(),
                })
                .unwrap();
            for status in [OrderStatus::Confirmed, OrderStatus::Shipping] {
                self.lifecycle
                    .transition(order.id, status, Initiator::Admin(&self.admin))
                    .unwrap();
            }
            self.ledger
                .touch(order.id, self.clock.now() - ChronoDuration::minutes(minutes_ago));
            order
        }

        fn status_of(&self, id: Uuid) -> OrderStatus {
            self.ledger.find_by_id(id).unwrap().unwrap().status
        }
    }

    #[test]
    fn overdue_shipping_order_is_delivered() {
        let f = fixture();
        let order = f.shipping_order(3);

        let report = f.scheduler.sweep_at(f.clock.now()).unwrap();
        assert_eq!(report.delivered, 1);

        let stored = f.ledger.find_by_id(order.id).unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Delivered);
        assert_eq!(stored.updated_at, f.clock.now());
    }

    #[test]
    fn recent_shipping_order_is_left_alone() {
        let f = fixture();
        let order = f.shipping_order(1);

        let report = f.scheduler.sweep_at(f.clock.now()).unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.delivered, 0);
        assert_eq!(f.status_of(order.id), OrderStatus::Shipping);
    }

    #[test]
    fn threshold_is_inclusive() {
        let f = fixture();
        let order = f.shipping_order(2);

        f.scheduler.sweep_at(f.clock.now()).unwrap();
        assert_eq!(f.status_of(order.id), OrderStatus::Delivered);
    }

    #[test]
    fn back_to_back_sweeps_deliver_once() {
        let f = fixture();
        let order = f.shipping_order(3);

        let first = f.scheduler.sweep_at(f.clock.now()).unwrap();
        let second = f.scheduler.sweep_at(f.clock.now()).unwrap();
        assert_eq!(first.delivered, 1);
        assert_eq!(second, SweepReport::default());
        assert_eq!(f.status_of(order.id), OrderStatus::Delivered);
    }

    #[test]
    fn other_statuses_are_ignored() {
        let f = fixture();
        let pending = f
            .lifecycle
            .open(NewOrder {
                user_id: Uuid::new_v4(),
                delivery: DeliveryDetails {
                    customer_name: "Di".into(),
                    phone: "555-0103".into(),
                    address: "4 Low Rd".into(),
                },
                payment_method: PaymentMethod::Cod,
                items: vec![],
                total_amount: BigDecimal::from(1),
                currency: "USD".into(),
                created_at: f.clock.now() - ChronoDuration::hours(1),
            })
            .unwrap();

        let report = f.scheduler.sweep_at(f.clock.now()).unwrap();
        assert_eq!(report.scanned, 0);
        assert_eq!(f.status_of(pending.id), OrderStatus::Pending);
    }

    /// Fails status writes for one order, delegating everything else.
    struct FailingLedger {
        inner: Arc<InMemoryLedger>,
        poisoned: parking_lot::Mutex<Option<Uuid>>,
    }

    impl OrderLedger for FailingLedger {
        fn create(&self, order: NewOrder) -> Result<Order, DomainError> {
            self.inner.create(order)
        }
        fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DomainError> {
            self.inner.find_by_id(id)
        }
        fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Order>, DomainError> {
            self.inner.list_by_user(user_id)
        }
        fn list_all(&self) -> Result<Vec<Order>, DomainError> {
            self.inner.list_all()
        }
        fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, DomainError> {
            self.inner.list_by_status(status)
        }
        fn update_status(
            &self,
            id: Uuid,
            expected: OrderStatus,
            next: OrderStatus,
            at: DateTime<Utc>,
        ) -> Result<Option<Order>, DomainError> {
            if *self.poisoned.lock() == Some(id) {
                return Err(DomainError::StorageUnavailable("connection reset".into()));
            }
            self.inner.update_status(id, expected, next, at)
        }
    }

    #[test]
    fn one_failing_order_does_not_stop_the_scan() {
        let memory = Arc::new(InMemoryLedger::new());
        let failing = Arc::new(FailingLedger {
            inner: memory.clone(),
            poisoned: parking_lot::Mutex::new(None),
        });
        let f = fixture_with(failing.clone(), memory);

        let bad = f.shipping_order(5);
        let good = f.shipping_order(4);
        *failing.poisoned.lock() = Some(bad.id);

        let report = f.scheduler.sweep_at(f.clock.now()).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(f.status_of(bad.id), OrderStatus::Shipping);
        assert_eq!(f.status_of(good.id), OrderStatus::Delivered);

        // The next tick picks the failed order up again.
        *failing.poisoned.lock() = None;
        let retry = f.scheduler.sweep_at(f.clock.now()).unwrap();
        assert_eq!(retry.delivered, 1);
        assert_eq!(f.status_of(bad.id), OrderStatus::Delivered);
    }

    #[test]
    fn cancelled_token_interrupts_between_orders() {
        let f = fixture();
        f.shipping_order(3);
        f.shipping_order(3);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = sweep(
            f.ledger.as_ref(),
            &f.lifecycle,
            f.clock.now(),
            Duration::from_secs(120),
            &cancel,
        )
        .unwrap();
        assert!(report.interrupted);
        assert_eq!(report.delivered, 0);
    }

    #[tokio::test]
    async fn run_once_reports_deliveries() {
        let f = fixture();
        f.shipping_order(10);

        let report = f.scheduler.run_once().await.unwrap().expect("not in flight");
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn concurrent_trigger_is_skipped_while_in_flight() {
        let f = fixture();
        let _flight = f.scheduler.in_flight.lock().await;

        assert!(f.scheduler.run_once().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn background_loop_delivers_and_stops_cleanly() {
        let f = fixture();
        let order = f.shipping_order(3);

        let handle = f.scheduler.clone().start(CancellationToken::new());
        let mut delivered = false;
        for _ in 0..100 {
            if f.status_of(order.id) == OrderStatus::Delivered {
                delivered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.stop().await;

        assert!(delivered, "scheduler should have delivered the order");
    }
}
