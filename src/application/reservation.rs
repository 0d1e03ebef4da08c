use std::sync::Arc;
use std::time::Duration;

use bigdecimal::BigDecimal;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::order::{CartLine, OrderItem};
use crate::domain::ports::CatalogStore;

use super::locks::{KeyGuard, KeyedLocks};

/// Validates carts against the catalog and takes the stock out.
pub struct InventoryReservation {
    catalog: Arc<dyn CatalogStore>,
    locks: KeyedLocks,
    lock_timeout: Duration,
}

/// Stock taken for one cart.
///
/// Until [`Reservation::commit`] is called the decrements are provisional:
/// dropping the value puts every unit back, whatever the reason the caller
/// went away. The product locks are held for the reservation's lifetime and
/// are released only after any rollback has run.
pub struct Reservation {
    catalog: Arc<dyn CatalogStore>,
    applied: Vec<(Uuid, i32)>,
    items: Vec<OrderItem>,
    total: BigDecimal,
    currency: Option<String>,
    committed: bool,
    _locks: Vec<KeyGuard>,
}

impl InventoryReservation {
    /// `locks` must be the same product lock map every other stock writer
    /// in this process uses.
    pub fn new(catalog: Arc<dyn CatalogStore>, locks: KeyedLocks, lock_timeout: Duration) -> Self {
        Self {
            catalog,
            locks,
            lock_timeout,
        }
    }

    /// Reserves every line in request order, or none of them.
    pub fn reserve(&self, lines: &[CartLine]) -> Result<Reservation, DomainError> {
        if lines.is_empty() {
            return Err(DomainError::InvalidInput("cart is empty".into()));
        }
        if let Some(line) = lines.iter().find(|l| l.quantity <= 0) {
            return Err(DomainError::InvalidInput(format!(
                "quantity for product {} must be positive, got {}",
                line.product_id, line.quantity
            )));
        }

        let locks = self
            .locks
            .lock_all(lines.iter().map(|l| l.product_id), self.lock_timeout)?;

        let mut reservation = Reservation {
            catalog: Arc::clone(&self.catalog),
            applied: Vec::with_capacity(lines.len()),
            items: Vec::with_capacity(lines.len()),
            total: BigDecimal::from(0),
            currency: None,
            committed: false,
            _locks: locks,
        };

        for line in lines {
            if let Err(e) = reservation.take(line) {
                // A restore failure outranks the original error: the caller
                // must learn that stock is still held.
                reservation.release()?;
                return Err(e);
            }
        }

        log::info!(
            "Reserved {} line(s) totalling {} {}",
            reservation.items.len(),
            reservation.total,
            reservation.currency()
        );
        Ok(reservation)
    }
}

impl Reservation {
    fn take(&mut self, line: &CartLine) -> Result<(), DomainError> {
        let product = self
            .catalog
            .find_by_id(line.product_id)?
            .ok_or_else(|| DomainError::product_not_found(line.product_id))?;

        if !product.is_active {
            return Err(DomainError::InvalidInput(format!(
                "product {} is not available for sale",
                product.id
            )));
        }
        match &self.currency {
            Some(currency) if *currency != product.currency => {
                return Err(DomainError::InvalidInput(format!(
                    "product {} is priced in {}, the cart in {}",
                    product.id, product.currency, currency
                )));
            }
            Some(_) => {}
            None => self.currency = Some(product.currency.clone()),
        }
        if line.quantity > product.stock_quantity {
            return Err(DomainError::InsufficientStock {
                product_id: product.id,
                requested: line.quantity,
                available: product.stock_quantity,
            });
        }

        // The storage layer re-checks the quantity, so a writer outside this
        // process still cannot push stock below zero.
        self.catalog.decrement_stock(product.id, line.quantity)?;
        self.applied.push((product.id, line.quantity));

        let item = OrderItem {
            product_id: product.id,
            product_name: product.name.clone(),
            unit_price: product.price.clone(),
            quantity: line.quantity,
            image: product.representative_image(),
        };
        self.total += item.line_total();
        self.items.push(item);
        Ok(())
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn total(&self) -> &BigDecimal {
        &self.total
    }

    pub fn currency(&self) -> &str {
        self.currency.as_deref().unwrap_or_default()
    }

    /// Makes the decrements permanent. Call once the order is stored.
    pub fn commit(mut self) {
        self.committed = true;
    }

    /// Puts every taken unit back. Fails with `StorageUnavailable` naming
    /// whatever could not be restored after retrying.
    pub fn release(mut self) -> Result<(), DomainError> {
        self.committed = true;
        self.restore_all()
    }

    fn restore_all(&mut self) -> Result<(), DomainError> {
        let mut stranded = Vec::new();
        for (product_id, quantity) in self.applied.drain(..).rev() {
            match restore_with_retry(self.catalog.as_ref(), product_id, quantity) {
                Ok(stock) => log::info!(
                    "Rolled back {} unit(s) of product {} (stock now {})",
                    quantity,
                    product_id,
                    stock
                ),
                Err(e) => {
                    log::error!(
                        "Failed to restore {} unit(s) of product {}: {}",
                        quantity,
                        product_id,
                        e
                    );
                    stranded.push(format!("{} unit(s) of product {}", quantity, product_id));
                }
            }
        }

        if stranded.is_empty() {
            Ok(())
        } else {
            Err(DomainError::StorageUnavailable(format!(
                "reservation rollback incomplete, not restored: {}",
                stranded.join(", ")
            )))
        }
    }
}

const RESTORE_ATTEMPTS: u32 = 3;
const RESTORE_BACKOFF: Duration = Duration::from_millis(20);

fn restore_with_retry(
    catalog: &dyn CatalogStore,
    product_id: Uuid,
    quantity: i32,
) -> Result<i32, DomainError> {
    let mut attempt = 1;
    loop {
        match catalog.restore_stock(product_id, quantity) {
            Ok(stock) => return Ok(stock),
            Err(e) if e.is_retryable() && attempt < RESTORE_ATTEMPTS => {
                log::warn!(
                    "Restore of product {} failed (attempt {}/{}): {}",
                    product_id,
                    attempt,
                    RESTORE_ATTEMPTS,
                    e
                );
                std::thread::sleep(RESTORE_BACKOFF * attempt);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.committed {
            // Nobody is left to report to; restore_all already logged.
            let _ = self.restore_all();
        }
    }
}
