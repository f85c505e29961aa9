//! Frequency Limiter
//!
//! Tracks the last response time per scope and enforces the configured
//! reply cap. Each scope has its own lock so that check-and-record is atomic
//! for one sender while different senders never contend.

use super::config::FrequencyPolicy;
use crate::store::StateStore;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

type CooldownSlot = Arc<Mutex<Option<DateTime<Utc>>>>;

/// Per-scope cooldown tracker with write-through persistence
pub struct FrequencyLimiter {
    slots: RwLock<HashMap<String, CooldownSlot>>,
    /// Floor applied to every policy window
    min_interval: Duration,
    store: Arc<dyn StateStore>,
}

impl std::fmt::Debug for FrequencyLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrequencyLimiter")
            .field("scopes", &self.slots.read().len())
            .field("min_interval", &self.min_interval)
            .finish()
    }
}

impl FrequencyLimiter {
    /// Create an empty limiter
    pub fn new(store: Arc<dyn StateStore>, min_interval: Duration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            min_interval: min_interval.max(Duration::zero()),
            store,
        }
    }

    /// Create a limiter seeded with the cooldown records already in `store`
    pub fn restore(
        store: Arc<dyn StateStore>,
        min_interval: Duration,
    ) -> Result<Self, crate::store::StoreError> {
        let records = store.load_cooldowns()?;
        let limiter = Self::new(store, min_interval);
        {
            let mut slots = limiter.slots.write();
            for (scope_id, at) in records {
                slots.insert(scope_id, Arc::new(Mutex::new(Some(at))));
            }
        }
        Ok(limiter)
    }

    /// Cooldown actually enforced for a policy
    pub fn effective_window(&self, policy: FrequencyPolicy) -> Duration {
        policy.window().max(self.min_interval)
    }

    fn slot(&self, scope_id: &str) -> CooldownSlot {
        if let Some(slot) = self.slots.read().get(scope_id) {
            return slot.clone();
        }
        self.slots
            .write()
            .entry(scope_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    fn permits(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>, policy: FrequencyPolicy) -> bool {
        match last {
            None => true,
            Some(last) => now - last >= self.effective_window(policy),
        }
    }

    /// Check whether a response to `scope_id` is allowed at `now`.
    ///
    /// Read-only; use [`try_acquire`](Self::try_acquire) when the answer is
    /// going to be acted on.
    pub fn allow(&self, scope_id: &str, now: DateTime<Utc>, policy: FrequencyPolicy) -> bool {
        let last = self
            .slots
            .read()
            .get(scope_id)
            .and_then(|slot| *slot.lock());
        self.permits(last, now, policy)
    }

    /// Upsert the last response time for `scope_id`
    pub fn record(&self, scope_id: &str, now: DateTime<Utc>) {
        let slot = self.slot(scope_id);
        let mut last = slot.lock();
        *last = Some(now);
        self.persist(scope_id, now);
    }

    /// Check and record in one step under the scope's lock.
    ///
    /// Returns `true` if the caller won the slot and should respond.
    pub fn try_acquire(&self, scope_id: &str, now: DateTime<Utc>, policy: FrequencyPolicy) -> bool {
        let slot = self.slot(scope_id);
        let mut last = slot.lock();
        if !self.permits(*last, now, policy) {
            return false;
        }
        *last = Some(now);
        self.persist(scope_id, now);
        true
    }

    fn persist(&self, scope_id: &str, at: DateTime<Utc>) {
        if let Err(e) = self.store.put_cooldown(scope_id, at) {
            tracing::warn!(scope_id, error = %e, "failed to persist cooldown record");
        }
    }

    /// Last recorded response time for `scope_id`
    pub fn last_response_at(&self, scope_id: &str) -> Option<DateTime<Utc>> {
        self.slots
            .read()
            .get(scope_id)
            .and_then(|slot| *slot.lock())
    }

    /// Number of scopes with a cooldown record
    pub fn tracked_scopes(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| slot.lock().is_some())
            .count()
    }

    /// Forget every cooldown record.
    ///
    /// Slots are emptied in place rather than removed, so a decision already
    /// holding a slot keeps writing to the one later decisions will see.
    pub fn clear(&self) -> Result<(), crate::store::StoreError> {
        let slots = self.slots.write();
        for slot in slots.values() {
            *slot.lock() = None;
        }
        self.store.clear_cooldowns()
    }
}
