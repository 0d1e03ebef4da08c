//! In-process storage adapters. Used by the test suites and when the service
//! runs without `DATABASE_URL`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::order::{sort_by_recency, NewOrder, Order, OrderStatus};
use crate::domain::ports::{CatalogStore, OrderLedger};
use crate::domain::product::{clamped_stock, NewProduct, Product};

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<Uuid, Product>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stock, or `None` for an unknown product.
    pub fn stock_of(&self, id: Uuid) -> Option<i32> {
        self.products.read().get(&id).map(|p| p.stock_quantity)
    }

    pub fn set_active(&self, id: Uuid, active: bool) {
        if let Some(product) = self.products.write().get_mut(&id) {
            product.is_active = active;
        }
    }
}

impl CatalogStore for InMemoryCatalog {
    fn insert(&self, product: NewProduct) -> Result<Product, DomainError> {
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: product.name,
            price: product.price,
            currency: product.currency,
            stock_quantity: product.stock_quantity,
            is_active: true,
            images: product.images,
            created_at: now,
            updated_at: now,
        };
        self.products.write().insert(product.id, product.clone());
        Ok(product)
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Product>, DomainError> {
        Ok(self.products.read().get(&id).cloned())
    }

    fn list_active(&self) -> Result<Vec<Product>, DomainError> {
        let mut products: Vec<Product> = self
            .products
            .read()
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(products)
    }

    fn decrement_stock(&self, id: Uuid, quantity: i32) -> Result<i32, DomainError> {
        let mut products = self.products.write();
        let product = products
            .get_mut(&id)
            .ok_or_else(|| DomainError::product_not_found(id))?;
        if product.stock_quantity < quantity {
            return Err(DomainError::InsufficientStock {
                product_id: id,
                requested: quantity,
                available: product.stock_quantity,
            });
        }
        product.stock_quantity -= quantity;
        product.updated_at = Utc::now();
        Ok(product.stock_quantity)
    }

    fn restore_stock(&self, id: Uuid, quantity: i32) -> Result<i32, DomainError> {
        let mut products = self.products.write();
        let product = products
            .get_mut(&id)
            .ok_or_else(|| DomainError::product_not_found(id))?;
        product.stock_quantity = product.stock_quantity.saturating_add(quantity);
        product.updated_at = Utc::now();
        Ok(product.stock_quantity)
    }

    fn adjust_stock(&self, id: Uuid, delta: i32) -> Result<Product, DomainError> {
        let mut products = self.products.write();
        let product = products
            .get_mut(&id)
            .ok_or_else(|| DomainError::product_not_found(id))?;
        product.stock_quantity = clamped_stock(product.stock_quantity, delta);
        product.updated_at = Utc::now();
        Ok(product.clone())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backdates an order's `updated_at`, standing in for time having passed.
    pub fn touch(&self, id: Uuid, updated_at: DateTime<Utc>) {
        if let Some(order) = self.orders.write().get_mut(&id) {
            order.updated_at = updated_at;
        }
    }

    fn collect<F>(&self, keep: F) -> Vec<Order>
    where
        F: Fn(&Order) -> bool,
    {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .values()
            .filter(|o| keep(*o))
            .cloned()
            .collect();
        sort_by_recency(&mut orders);
        orders
    }
}

impl OrderLedger for InMemoryLedger {
    fn create(&self, order: NewOrder) -> Result<Order, DomainError> {
        let order = Order::open(Uuid::new_v4(), order);
        self.orders.write().insert(order.id, order.clone());
        Ok(order)
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DomainError> {
        Ok(self.orders.read().get(&id).cloned())
    }

    fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Order>, DomainError> {
        Ok(self.collect(|o| o.user_id == user_id))
    }

    fn list_all(&self) -> Result<Vec<Order>, DomainError> {
        Ok(self.collect(|_| true))
    }

    fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, DomainError> {
        Ok(self.collect(|o| o.status == status))
    }

    fn update_status(
        &self,
        id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Order>, DomainError> {
        let mut orders = self.orders.write();
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| DomainError::order_not_found(id))?;
        if order.status != expected {
            return Ok(None);
        }
        order.status = next;
        order.updated_at = at;
        Ok(Some(order.clone()))
    }
}
