use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::ports::CatalogStore;
use crate::domain::product::{clamped_stock, NewProduct, Product};
use crate::schema::products;

use super::models::{db_timestamp, NewProductRow, ProductRow};

pub struct DieselCatalogStore {
    pool: DbPool,
}

impl DieselCatalogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl CatalogStore for DieselCatalogStore {
    fn insert(&self, product: NewProduct) -> Result<Product, DomainError> {
        let mut conn = self.pool.get()?;
        let now = db_timestamp(Utc::now());

        let row = diesel::insert_into(products::table)
            .values(&NewProductRow {
                id: Uuid::new_v4(),
                name: product.name,
                price: product.price,
                currency: product.currency,
                stock_quantity: product.stock_quantity,
                is_active: true,
                images: product.images,
                created_at: now,
                updated_at: now,
            })
            .returning(ProductRow::as_returning())
            .get_result(&mut conn)?;

        Ok(row.into())
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Product>, DomainError> {
        let mut conn = self.pool.get()?;

        let row = products::table
            .filter(products::id.eq(id))
            .select(ProductRow::as_select())
            .first(&mut conn)
            .optional()?;

        Ok(row.map(Product::from))
    }

    fn list_active(&self) -> Result<Vec<Product>, DomainError> {
        let mut conn = self.pool.get()?;

        let rows = products::table
            .filter(products::is_active.eq(true))
            .select(ProductRow::as_select())
            .order((products::created_at.desc(), products::id.asc()))
            .load(&mut conn)?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    fn decrement_stock(&self, id: Uuid, quantity: i32) -> Result<i32, DomainError> {
        let mut conn = self.pool.get()?;

        // The stock guard lives in the WHERE clause so concurrent writers,
        // including other processes, can never drive the count negative.
        let remaining = diesel::update(
            products::table
                .filter(products::id.eq(id))
                .filter(products::stock_quantity.ge(quantity)),
        )
        .set((
            products::stock_quantity.eq(products::stock_quantity - quantity),
            products::updated_at.eq(Utc::now()),
        ))
        .returning(products::stock_quantity)
        .get_result::<i32>(&mut conn)
        .optional()?;

        if let Some(remaining) = remaining {
            return Ok(remaining);
        }

        let available = products::table
            .filter(products::id.eq(id))
            .select(products::stock_quantity)
            .first::<i32>(&mut conn)
            .optional()?;

        match available {
            None => Err(DomainError::product_not_found(id)),
            Some(available) => Err(DomainError::InsufficientStock {
                product_id: id,
                requested: quantity,
                available,
            }),
        }
    }

    fn restore_stock(&self, id: Uuid, quantity: i32) -> Result<i32, DomainError> {
        let mut conn = self.pool.get()?;

        diesel::update(products::table.filter(products::id.eq(id)))
            .set((
                products::stock_quantity.eq(products::stock_quantity + quantity),
                products::updated_at.eq(Utc::now()),
            ))
            .returning(products::stock_quantity)
            .get_result::<i32>(&mut conn)
            .optional()?
            .ok_or_else(|| DomainError::product_not_found(id))
    }

    fn adjust_stock(&self, id: Uuid, delta: i32) -> Result<Product, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let current = products::table
                .filter(products::id.eq(id))
                .select(products::stock_quantity)
                .for_update()
                .first::<i32>(conn)
                .optional()?
                .ok_or_else(|| DomainError::product_not_found(id))?;

            let row = diesel::update(products::table.filter(products::id.eq(id)))
                .set((
                    products::stock_quantity.eq(clamped_stock(current, delta)),
                    products::updated_at.eq(Utc::now()),
                ))
                .returning(ProductRow::as_returning())
                .get_result(conn)?;

            Ok(row.into())
        })
    }
}
