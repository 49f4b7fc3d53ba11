//! Keyed slots with their own locks.
//!
//! The map lock is held only long enough to find or create a slot; writes to
//! a value take that slot's mutex, so writers on disjoint keys never contend.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use super::{CacheError, CachedValue, FetchTicket};

pub(super) struct Slot<T> {
    value: Option<T>,
    version: u64,
    stale: bool,
    fetch_failed: bool,
    /// Bumped on every invalidation. A fetch that started under an older
    /// epoch leaves the slot stale when it commits.
    epoch: u64,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Slot {
            value: None,
            version: 0,
            stale: false,
            fetch_failed: false,
            epoch: 0,
        }
    }
}

pub(super) struct SlotMap<K, T> {
    slots: RwLock<HashMap<K, Arc<Mutex<Slot<T>>>>>,
}

impl<K: Eq + Hash + Clone, T: Clone> SlotMap<K, T> {
    pub(super) fn new() -> Self {
        SlotMap {
            slots: RwLock::new(HashMap::new()),
        }
    }

    fn existing(&self, key: &K) -> Result<Option<Arc<Mutex<Slot<T>>>>, CacheError> {
        let slots = self
            .slots
            .read()
            .map_err(|_| CacheError::LockPoisoned("slot lookup"))?;
        Ok(slots.get(key).cloned())
    }

    fn get_or_create(&self, key: &K) -> Result<Arc<Mutex<Slot<T>>>, CacheError> {
        if let Some(slot) = self.existing(key)? {
            return Ok(slot);
        }
        let mut slots = self
            .slots
            .write()
            .map_err(|_| CacheError::LockPoisoned("slot insert"))?;
        Ok(slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Slot::new())))
            .clone())
    }

    fn lock<'a>(
        slot: &'a Arc<Mutex<Slot<T>>>,
        operation: &'static str,
    ) -> Result<MutexGuard<'a, Slot<T>>, CacheError> {
        slot.lock().map_err(|_| CacheError::LockPoisoned(operation))
    }

    pub(super) fn value(&self, key: &K) -> Result<Option<T>, CacheError> {
        match self.existing(key)? {
            Some(slot) => {
                let slot = Self::lock(&slot, "slot read")?;
                Ok(slot.value.clone())
            }
            None => Ok(None),
        }
    }

    pub(super) fn entry(&self, key: &K) -> Result<Option<CachedValue<T>>, CacheError> {
        let Some(slot) = self.existing(key)? else {
            return Ok(None);
        };
        let slot = Self::lock(&slot, "slot read")?;
        Ok(slot.value.clone().map(|value| CachedValue {
            value,
            version: slot.version,
            stale: slot.stale,
            fetch_failed: slot.fetch_failed,
        }))
    }

    pub(super) fn put(&self, key: &K, value: T) -> Result<u64, CacheError> {
        let slot = self.get_or_create(key)?;
        let mut slot = Self::lock(&slot, "slot write")?;
        slot.value = Some(value);
        slot.version += 1;
        slot.stale = false;
        slot.fetch_failed = false;
        Ok(slot.version)
    }

    pub(super) fn begin_fetch(&self, key: &K) -> Result<FetchTicket, CacheError> {
        let slot = self.get_or_create(key)?;
        let slot = Self::lock(&slot, "slot read")?;
        Ok(FetchTicket { epoch: slot.epoch })
    }

    pub(super) fn commit(&self, key: &K, value: T, ticket: FetchTicket) -> Result<u64, CacheError> {
        let slot = self.get_or_create(key)?;
        let mut slot = Self::lock(&slot, "slot write")?;
        slot.value = Some(value);
        slot.version += 1;
        slot.fetch_failed = false;
        slot.stale = slot.epoch != ticket.epoch;
        Ok(slot.version)
    }

    pub(super) fn fail(&self, key: &K) -> Result<bool, CacheError> {
        let slot = self.get_or_create(key)?;
        let mut slot = Self::lock(&slot, "slot write")?;
        slot.fetch_failed = true;
        Ok(slot.value.is_some())
    }

    /// The latest fetch failed, whether or not an earlier value exists.
    pub(super) fn fetch_failed(&self, key: &K) -> Result<bool, CacheError> {
        match self.existing(key)? {
            Some(slot) => {
                let slot = Self::lock(&slot, "slot read")?;
                Ok(slot.fetch_failed)
            }
            None => Ok(false),
        }
    }

    pub(super) fn mark_stale(&self, key: &K) -> Result<(), CacheError> {
        let slot = self.get_or_create(key)?;
        let mut slot = Self::lock(&slot, "slot write")?;
        slot.stale = true;
        slot.epoch += 1;
        Ok(())
    }

    pub(super) fn is_stale(&self, key: &K) -> Result<bool, CacheError> {
        match self.existing(key)? {
            Some(slot) => {
                let slot = Self::lock(&slot, "slot read")?;
                Ok(slot.stale)
            }
            None => Ok(false),
        }
    }

    pub(super) fn needs_fetch(&self, key: &K) -> Result<bool, CacheError> {
        match self.existing(key)? {
            Some(slot) => {
                let slot = Self::lock(&slot, "slot read")?;
                Ok(slot.value.is_none() || slot.stale)
            }
            None => Ok(true),
        }
    }

    pub(super) fn retain<F>(&self, mut keep: F) -> Result<usize, CacheError>
    where
        F: FnMut(&K) -> bool,
    {
        let mut slots = self
            .slots
            .write()
            .map_err(|_| CacheError::LockPoisoned("slot truncate"))?;
        let before = slots.len();
        slots.retain(|key, _| keep(key));
        Ok(before - slots.len())
    }

    pub(super) fn populated(&self) -> Result<usize, CacheError> {
        let slots = self
            .slots
            .read()
            .map_err(|_| CacheError::LockPoisoned("slot count"))?;
        let mut populated = 0;
        for slot in slots.values() {
            if Self::lock(slot, "slot count")?.value.is_some() {
                populated += 1;
            }
        }
        Ok(populated)
    }
}
