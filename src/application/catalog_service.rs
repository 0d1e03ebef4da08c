use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::domain::auth::Actor;
use crate::domain::errors::DomainError;
use crate::domain::ports::CatalogStore;
use crate::domain::product::{NewProduct, Product};

use super::locks::KeyedLocks;

/// The slice of the catalog the order core exposes.
pub struct CatalogService {
    catalog: Arc<dyn CatalogStore>,
    locks: KeyedLocks,
    lock_timeout: Duration,
}

impl CatalogService {
    pub fn new(catalog: Arc<dyn CatalogStore>, locks: KeyedLocks, lock_timeout: Duration) -> Self {
        Self {
            catalog,
            locks,
            lock_timeout,
        }
    }

    pub fn create_product(&self, actor: &Actor, product: NewProduct) -> Result<Product, DomainError> {
        actor.require_admin()?;
        product.validate()?;
        let product = self.catalog.insert(product)?;
        log::info!("Product {} created with stock {}", product.id, product.stock_quantity);
        Ok(product)
    }

    pub fn get_product(&self, id: Uuid) -> Result<Product, DomainError> {
        self.catalog
            .find_by_id(id)?
            .ok_or_else(|| DomainError::product_not_found(id))
    }

    pub fn list_active(&self) -> Result<Vec<Product>, DomainError> {
        self.catalog.list_active()
    }

    /// Administrative stock correction; the result is clamped at zero.
    pub fn adjust_stock(&self, actor: &Actor, id: Uuid, delta: i32) -> Result<Product, DomainError> {
        actor.require_admin()?;
        let _guard = self.locks.lock(id, self.lock_timeout)?;
        let product = self.catalog.adjust_stock(id, delta)?;
        log::info!(
            "Stock of product {} adjusted by {} to {}",
            id,
            delta,
            product.stock_quantity
        );
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    use crate::infrastructure::memory::InMemoryCatalog;

    fn service() -> CatalogService {
        CatalogService::new(
            Arc::new(InMemoryCatalog::new()),
            KeyedLocks::new("product"),
            Duration::from_secs(1),
        )
    }

    fn pan() -> NewProduct {
        NewProduct {
            name: "Wok".into(),
            price: BigDecimal::from(35),
            currency: "USD".into(),
            stock_quantity: 4,
            images: vec![],
        }
    }

    #[test]
    fn only_admins_create_products() {
        let service = service();
        assert!(matches!(
            service.create_product(&Actor::user(Uuid::new_v4()), pan()),
            Err(DomainError::Forbidden(_))
        ));
        let product = service
            .create_product(&Actor::admin(Uuid::new_v4()), pan())
            .unwrap();
        assert!(product.is_active);
        assert_eq!(service.get_product(product.id).unwrap(), product);
    }

    #[test]
    fn adjust_stock_clamps_and_requires_admin() {
        let service = service();
        let admin = Actor::admin(Uuid::new_v4());
        let product = service.create_product(&admin, pan()).unwrap();

        assert!(service
            .adjust_stock(&Actor::user(Uuid::new_v4()), product.id, 5)
            .is_err());
        assert_eq!(
            service.adjust_stock(&admin, product.id, -10).unwrap().stock_quantity,
            0
        );
    }

    #[test]
    fn unknown_product_is_not_found() {
        assert!(matches!(
            service().get_product(Uuid::new_v4()),
            Err(DomainError::NotFound { .. })
        ));
    }
}
