//! Single-entry result cache.
//!
//! The expensive part of a run before fitting is acquisition plus
//! aggregation, and its result only changes when the requested end date
//! does. `SingleEntryCache` keeps the last result and its key; `NoCache`
//! always recomputes. Errors are never stored.

use std::sync::{Mutex, PoisonError};

pub trait ResultCache<K, V> {
    /// Returns the cached value for `key`, or runs `compute` and stores
    /// its result if it succeeds.
    fn get_or_compute<E, F>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>;

    /// Drops whatever is cached.
    fn clear(&self);
}

/// Remembers exactly one `(key, value)` pair; a new key replaces it.
#[derive(Debug)]
pub struct SingleEntryCache<K, V> {
    slot: Mutex<Option<(K, V)>>,
}

impl<K, V> Default for SingleEntryCache<K, V> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<K, V> SingleEntryCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K: PartialEq, V: Clone> ResultCache<K, V> for SingleEntryCache<K, V> {
    fn get_or_compute<E, F>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        // A poisoned lock only means a previous compute panicked; the slot
        // itself is still a consistent Option.
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((cached_key, value)) = slot.as_ref() {
            if *cached_key == key {
                return Ok(value.clone());
            }
        }
        let value = compute()?;
        *slot = Some((key, value.clone()));
        Ok(value)
    }

    fn clear(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Pass-through cache for `--no-cache` runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl<K, V> ResultCache<K, V> for NoCache {
    fn get_or_compute<E, F>(&self, _key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        compute()
    }

    fn clear(&self) {}
}
