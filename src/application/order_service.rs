use std::sync::Arc;

use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::auth::Actor;
use crate::domain::errors::DomainError;
use crate::domain::order::{CartLine, DeliveryDetails, NewOrder, Order, OrderStatus, PaymentMethod};
use crate::domain::ports::OrderLedger;

use super::lifecycle::{Initiator, OrderLifecycle};
use super::reservation::InventoryReservation;

#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub delivery: DeliveryDetails,
    pub payment_method: PaymentMethod,
    pub lines: Vec<CartLine>,
}

pub struct OrderService {
    ledger: Arc<dyn OrderLedger>,
    inventory: InventoryReservation,
    lifecycle: Arc<OrderLifecycle>,
    clock: Arc<dyn Clock>,
}

impl OrderService {
    pub fn new(
        ledger: Arc<dyn OrderLedger>,
        inventory: InventoryReservation,
        lifecycle: Arc<OrderLifecycle>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            inventory,
            lifecycle,
            clock,
        }
    }

    /// Reserves the cart and records the priced snapshot as a PENDING order.
    /// If the order cannot be stored the reservation is rolled back.
    pub fn place_order(&self, actor: &Actor, request: PlaceOrder) -> Result<Order, DomainError> {
        validate_delivery(&request.delivery)?;

        let reservation = self.inventory.reserve(&request.lines)?;
        let opened = self.lifecycle.open(NewOrder {
            user_id: actor.user_id,
            delivery: request.delivery,
            payment_method: request.payment_method,
            items: reservation.items().to_vec(),
            total_amount: reservation.total().clone(),
            currency: reservation.currency().to_string(),
            created_at: self.clock.now(),
        });
        let order = match opened {
            Ok(order) => order,
            Err(e) => {
                reservation.release()?;
                return Err(e);
            }
        };
        reservation.commit();

        Ok(order)
    }

    pub fn get_order(&self, actor: &Actor, id: Uuid) -> Result<Order, DomainError> {
        let order = self
            .ledger
            .find_by_id(id)?
            .ok_or_else(|| DomainError::order_not_found(id))?;
        actor.require_owner_or_admin(order.user_id)?;
        Ok(order)
    }

    pub fn my_orders(&self, actor: &Actor) -> Result<Vec<Order>, DomainError> {
        self.ledger.list_by_user(actor.user_id)
    }

    pub fn orders_for_user(&self, actor: &Actor, user_id: Uuid) -> Result<Vec<Order>, DomainError> {
        actor.require_owner_or_admin(user_id)?;
        self.ledger.list_by_user(user_id)
    }

    pub fn all_orders(&self, actor: &Actor) -> Result<Vec<Order>, DomainError> {
        actor.require_admin()?;
        self.ledger.list_all()
    }

    /// Administrative status change. Cancelling does not return stock.
    pub fn update_status(
        &self,
        actor: &Actor,
        id: Uuid,
        target: OrderStatus,
    ) -> Result<Order, DomainError> {
        self.lifecycle.transition(id, target, Initiator::Admin(actor))
    }
}

/// Matches the width of the `orders.phone` column.
pub const MAX_PHONE_LEN: usize = 50;

fn validate_delivery(delivery: &DeliveryDetails) -> Result<(), DomainError> {
    for (field, value) in [
        ("customer_name", &delivery.customer_name),
        ("phone", &delivery.phone),
        ("address", &delivery.address),
    ] {
        if value.trim().is_empty() {
            return Err(DomainError::InvalidInput(format!("{} must not be empty", field)));
        }
    }
    if delivery.phone.chars().count() > MAX_PHONE_LEN {
        return Err(DomainError::InvalidInput(format!(
            "phone must be at most {} characters",
            MAX_PHONE_LEN
        )));
    }
    Ok(())
}
