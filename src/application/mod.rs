pub mod catalog_service;
pub mod lifecycle;
pub mod locks;
pub mod order_service;
pub mod reservation;
pub mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::domain::ports::{CatalogStore, OrderLedger};

use catalog_service::CatalogService;
use lifecycle::OrderLifecycle;
use locks::KeyedLocks;
use order_service::OrderService;
use reservation::InventoryReservation;
use scheduler::{ReconciliationScheduler, SweepConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreSettings {
    pub lock_timeout: Duration,
    pub sweep: SweepConfig,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(2),
            sweep: SweepConfig::default(),
        }
    }
}

/// Everything the HTTP layer and the background task need, wired once.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub catalog: Arc<CatalogService>,
    pub scheduler: Arc<ReconciliationScheduler>,
}

impl AppServices {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        ledger: Arc<dyn OrderLedger>,
        clock: Arc<dyn Clock>,
        settings: CoreSettings,
    ) -> Self {
        let product_locks = KeyedLocks::new("product");
        let lifecycle = Arc::new(OrderLifecycle::new(
            Arc::clone(&ledger),
            Arc::clone(&clock),
            settings.lock_timeout,
        ));
        let inventory = InventoryReservation::new(
            Arc::clone(&catalog),
            product_locks.clone(),
            settings.lock_timeout,
        );

        Self {
            orders: Arc::new(OrderService::new(
                Arc::clone(&ledger),
                inventory,
                Arc::clone(&lifecycle),
                Arc::clone(&clock),
            )),
            catalog: Arc::new(CatalogService::new(
                catalog,
                product_locks,
                settings.lock_timeout,
            )),
            scheduler: Arc::new(ReconciliationScheduler::new(
                ledger,
                lifecycle,
                clock,
                settings.sweep,
            )),
        }
    }
}
