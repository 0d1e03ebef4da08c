use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::order::{NewOrder, Order, OrderStatus};
use crate::domain::ports::OrderLedger;
use crate::schema::{order_items, orders};

use super::models::{db_timestamp, NewOrderItemRow, NewOrderRow, OrderItemRow, OrderRow};

// ── Error conversions (infrastructure concern only) ──────────────────────────

impl From<diesel::result::Error> for DomainError {
    fn from(e: diesel::result::Error) -> Self {
        use diesel::result::Error;
        match e {
            Error::DatabaseError(
                DatabaseErrorKind::SerializationFailure
                | DatabaseErrorKind::ClosedConnection
                | DatabaseErrorKind::UnableToSendCommand,
                info,
            ) => DomainError::StorageUnavailable(info.message().to_string()),
            Error::BrokenTransactionManager => {
                DomainError::StorageUnavailable("transaction manager is broken".to_string())
            }
            Error::DatabaseError(DatabaseErrorKind::CheckViolation, info) => {
                DomainError::InvalidInput(info.message().to_string())
            }
            other => DomainError::Internal(other.to_string()),
        }
    }
}

impl From<r2d2::Error> for DomainError {
    fn from(e: r2d2::Error) -> Self {
        DomainError::StorageUnavailable(e.to_string())
    }
}

// ── Ledger ───────────────────────────────────────────────────────────────────

pub struct DieselOrderLedger {
    pool: DbPool,
}

impl DieselOrderLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Loads items for `rows` and zips them back together, keeping row order.
fn with_items(conn: &mut PgConnection, rows: Vec<OrderRow>) -> Result<Vec<Order>, DomainError> {
    let items = OrderItemRow::belonging_to(&rows)
        .select(OrderItemRow::as_select())
        .order(order_items::position.asc())
        .load(conn)?;

    items
        .grouped_by(&rows)
        .into_iter()
        .zip(rows)
        .map(|(items, row)| row.into_order(items))
        .collect()
}

fn load_one(conn: &mut PgConnection, id: Uuid) -> Result<Option<Order>, DomainError> {
    let row = orders::table
        .filter(orders::id.eq(id))
        .select(OrderRow::as_select())
        .first(conn)
        .optional()?;

    match row {
        Some(row) => Ok(with_items(conn, vec![row])?.pop()),
        None => Ok(None),
    }
}

impl OrderLedger for DieselOrderLedger {
    fn create(&self, mut order: NewOrder) -> Result<Order, DomainError> {
        let mut conn = self.pool.get()?;
        order.created_at = db_timestamp(order.created_at);

        conn.transaction::<_, DomainError, _>(|conn| {
            // 1. Insert the order header
            let order_id = Uuid::new_v4();
            diesel::insert_into(orders::table)
                .values(&NewOrderRow {
                    id: order_id,
                    user_id: order.user_id,
                    customer_name: order.delivery.customer_name.clone(),
                    phone: order.delivery.phone.clone(),
                    address: order.delivery.address.clone(),
                    payment_method: order.payment_method.as_str().to_string(),
                    status: OrderStatus::Pending.as_str().to_string(),
                    total_amount: order.total_amount.clone(),
                    currency: order.currency.clone(),
                    created_at: order.created_at,
                    updated_at: order.created_at,
                })
                .execute(conn)?;

            // 2. Insert the item snapshots, keeping cart order
            let new_items: Vec<NewOrderItemRow> = order
                .items
                .iter()
                .enumerate()
                .map(|(position, item)| NewOrderItemRow {
                    id: Uuid::new_v4(),
                    order_id,
                    position: position as i32,
                    product_id: item.product_id,
                    product_name: item.product_name.clone(),
                    unit_price: item.unit_price.clone(),
                    quantity: item.quantity,
                    image: item.image.clone(),
                })
                .collect();
            diesel::insert_into(order_items::table)
                .values(&new_items)
                .execute(conn)?;

            Ok(Order::open(order_id, order))
        })
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DomainError> {
        let mut conn = self.pool.get()?;
        load_one(&mut conn, id)
    }

    fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Order>, DomainError> {
        let mut conn = self.pool.get()?;

        let rows = orders::table
            .filter(orders::user_id.eq(user_id))
            .select(OrderRow::as_select())
            .order((orders::created_at.desc(), orders::id.asc()))
            .load(&mut conn)?;

        with_items(&mut conn, rows)
    }

    fn list_all(&self) -> Result<Vec<Order>, DomainError> {
        let mut conn = self.pool.get()?;

        let rows = orders::table
            .select(OrderRow::as_select())
            .order((orders::created_at.desc(), orders::id.asc()))
            .load(&mut conn)?;

        with_items(&mut conn, rows)
    }

    fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, DomainError> {
        let mut conn = self.pool.get()?;

        let rows = orders::table
            .filter(orders::status.eq(status.as_str()))
            .select(OrderRow::as_select())
            .order((orders::updated_at.asc(), orders::id.asc()))
            .load(&mut conn)?;

        with_items(&mut conn, rows)
    }

    fn update_status(
        &self,
        id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Order>, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let updated = diesel::update(
                orders::table
                    .filter(orders::id.eq(id))
                    .filter(orders::status.eq(expected.as_str())),
            )
            .set((
                orders::status.eq(next.as_str()),
                orders::updated_at.eq(db_timestamp(at)),
            ))
            .execute(conn)?;

            if updated == 0 {
                let exists: i64 = orders::table
                    .filter(orders::id.eq(id))
                    .count()
                    .get_result(conn)?;
                if exists == 0 {
                    return Err(DomainError::order_not_found(id));
                }
                return Ok(None);
            }

            load_one(conn, id)
        })
    }
}
