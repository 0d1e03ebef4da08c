use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use uuid::Uuid;

use crate::domain::errors::DomainError;

type Slots = Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>;

/// A map of per-key mutexes with bounded waits.
///
/// Slots are created on first use and dropped again once the last holder
/// releases them, so the map only ever contains keys that are in use.
#[derive(Clone)]
pub struct KeyedLocks {
    label: &'static str,
    slots: Slots,
}

pub struct KeyGuard {
    key: Uuid,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
    slots: Slots,
}

impl KeyedLocks {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn lock(&self, key: Uuid, timeout: Duration) -> Result<KeyGuard, DomainError> {
        let slot = self.slot(key);
        let acquired = slot.try_lock_arc_for(timeout);
        match acquired {
            Some(guard) => Ok(KeyGuard {
                key,
                guard: Some(guard),
                slots: Arc::clone(&self.slots),
            }),
            None => {
                drop(slot);
                self.prune(key);
                Err(DomainError::Busy(format!(
                    "timed out waiting for {} {}",
                    self.label, key
                )))
            }
        }
    }

    /// Locks every key in ascending order so that two callers with
    /// overlapping key sets can never deadlock. The timeout bounds the
    /// whole acquisition.
    pub fn lock_all<I>(&self, keys: I, timeout: Duration) -> Result<Vec<KeyGuard>, DomainError>
    where
        I: IntoIterator<Item = Uuid>,
    {
        let ordered: BTreeSet<Uuid> = keys.into_iter().collect();
        let deadline = Instant::now() + timeout;
        let mut guards = Vec::with_capacity(ordered.len());
        for key in ordered {
            let remaining = deadline.saturating_duration_since(Instant::now());
            guards.push(self.lock(key, remaining)?);
        }
        Ok(guards)
    }

    /// Number of keys currently tracked.
    pub fn active(&self) -> usize {
        self.slots.lock().len()
    }

    fn slot(&self, key: Uuid) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock();
        Arc::clone(slots.entry(key).or_default())
    }

    fn prune(&self, key: Uuid) {
        prune_slot(&self.slots, key);
    }
}

// Clones of a slot are only taken while holding the map lock, so a strong
// count of one under that lock means nobody else can reach it.
fn prune_slot(slots: &Slots, key: Uuid) {
    let mut slots = slots.lock();
    if let Some(slot) = slots.get(&key) {
        if Arc::strong_count(slot) == 1 {
            slots.remove(&key);
        }
    }
}

impl KeyGuard {
    pub fn key(&self) -> Uuid {
        self.key
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        prune_slot(&self.slots, self.key);
    }
}
