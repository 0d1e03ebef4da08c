use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::errors::DomainError;

#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price: BigDecimal,
    pub currency: String,
    pub stock_quantity: i32,
    pub is_active: bool,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Image copied into order snapshots.
    pub fn representative_image(&self) -> String {
        self.images.first().cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub price: BigDecimal,
    pub currency: String,
    pub stock_quantity: i32,
    pub images: Vec<String>,
}

impl NewProduct {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvalidInput("product name must not be empty".into()));
        }
        if self.price < BigDecimal::from(0) {
            return Err(DomainError::InvalidInput("price must not be negative".into()));
        }
        if self.stock_quantity < 0 {
            return Err(DomainError::InvalidInput(
                "stock_quantity must not be negative".into(),
            ));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(DomainError::InvalidInput(format!(
                "currency '{}' is not an ISO 4217 code",
                self.currency
            )));
        }
        Ok(())
    }
}

/// Stock after applying an administrative delta, clamped at zero.
pub fn clamped_stock(current: i32, delta: i32) -> i32 {
    current.saturating_add(delta).max(0)
}
