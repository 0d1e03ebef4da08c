use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::errors::DomainError;
use super::order::{NewOrder, Order, OrderStatus};
use super::product::{NewProduct, Product};

/// Product storage. Stock only moves through the conditional decrement,
/// the restore used by rollbacks, and the clamped administrative delta.
pub trait CatalogStore: Send + Sync + 'static {
    fn insert(&self, product: NewProduct) -> Result<Product, DomainError>;
    fn find_by_id(&self, id: Uuid) -> Result<Option<Product>, DomainError>;
    fn list_active(&self) -> Result<Vec<Product>, DomainError>;

    /// Decrements only when at least `quantity` units are on hand.
    /// Returns the remaining stock.
    fn decrement_stock(&self, id: Uuid, quantity: i32) -> Result<i32, DomainError>;
    fn restore_stock(&self, id: Uuid, quantity: i32) -> Result<i32, DomainError>;
    fn adjust_stock(&self, id: Uuid, delta: i32) -> Result<Product, DomainError>;
}

pub trait OrderLedger: Send + Sync + 'static {
    fn create(&self, order: NewOrder) -> Result<Order, DomainError>;
    fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DomainError>;
    fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Order>, DomainError>;
    fn list_all(&self) -> Result<Vec<Order>, DomainError>;
    fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, DomainError>;

    /// Compare-and-set on the status column. `Ok(None)` means the order is
    /// no longer in `expected`. Only the lifecycle state machine calls this.
    fn update_status(
        &self,
        id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Order>, DomainError>;
}
