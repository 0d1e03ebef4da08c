use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::auth::Actor;
use crate::domain::errors::DomainError;
use crate::domain::order::{NewOrder, Order, OrderStatus, Trigger};
use crate::domain::ports::OrderLedger;

use super::locks::KeyedLocks;

/// Who is driving a transition.
#[derive(Debug, Clone, Copy)]
pub enum Initiator<'a> {
    Admin(&'a Actor),
    Sweep,
}

/// The single entry point for every order status change.
pub struct OrderLifecycle {
    ledger: Arc<dyn OrderLedger>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks,
    lock_timeout: Duration,
}

impl OrderLifecycle {
    pub fn new(ledger: Arc<dyn OrderLedger>, clock: Arc<dyn Clock>, lock_timeout: Duration) -> Self {
        Self {
            ledger,
            clock,
            locks: KeyedLocks::new("order"),
            lock_timeout,
        }
    }

    /// Stores a freshly reserved order. Orders are always born PENDING.
    pub fn open(&self, order: NewOrder) -> Result<Order, DomainError> {
        let order = self.ledger.create(order)?;
        log::info!(
            "Order {} opened for user {} ({} {})",
            order.id,
            order.user_id,
            order.total_amount,
            order.currency
        );
        Ok(order)
    }

    pub fn transition(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        initiator: Initiator<'_>,
    ) -> Result<Order, DomainError> {
        let trigger = match initiator {
            Initiator::Admin(actor) => {
                actor.require_admin()?;
                Trigger::Admin
            }
            Initiator::Sweep => Trigger::Sweep,
        };

        let _guard = self.locks.lock(order_id, self.lock_timeout)?;

        let current = self
            .ledger
            .find_by_id(order_id)?
            .ok_or_else(|| DomainError::order_not_found(order_id))?;

        if !current.status.can_transition_to(target, trigger) {
            return Err(DomainError::InvalidTransition {
                from: current.status,
                to: target,
            });
        }

        let now = self.clock.now();
        match self
            .ledger
            .update_status(order_id, current.status, target, now)?
        {
            Some(updated) => {
                log::info!(
                    "Order {} moved {} -> {} ({:?})",
                    order_id,
                    current.status,
                    target,
                    trigger
                );
                Ok(updated)
            }
            None => {
                // Another process changed the row between our read and write.
                let latest = self
                    .ledger
                    .find_by_id(order_id)?
                    .ok_or_else(|| DomainError::order_not_found(order_id))?;
                Err(DomainError::InvalidTransition {
                    from: latest.status,
                    to: target,
                })
            }
        }
    }
}
