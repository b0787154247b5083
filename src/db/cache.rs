//! Keyed connection cache with single-flight creation.
//!
//! # Design Decisions
//!
//! - **`OnceCell` per key**: concurrent misses on the same key wait for one
//!   factory call instead of opening duplicate connections.
//! - **Outcome stored in the cell**: the cell holds `DbaasResult<V>`, so every
//!   caller waiting on one creation receives the same value or the same error.
//!   A failed cell is removed from the map right away; the next call runs the
//!   factory again.
//! - **Map lock held only for lookups**: the `RwLock` guards the key-to-cell
//!   map and is released before any factory runs, so creations for different
//!   keys proceed in parallel.
//!
//! Eviction never closes anything. Closing a connection is the caller's job.

use crate::error::DbaasResult;
use crate::models::{Classifier, DatabaseType};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::debug;

/// Cache address: database engine plus classifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub db_type: DatabaseType,
    pub classifier: Classifier,
}

impl CacheKey {
    pub fn new(db_type: DatabaseType, classifier: Classifier) -> Self {
        Self {
            db_type,
            classifier,
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.db_type, self.classifier)
    }
}

type Slot<V> = Arc<OnceCell<DbaasResult<V>>>;

/// Mapping from [`CacheKey`] to a lazily created value.
pub struct ConnectionCache<V> {
    entries: RwLock<HashMap<CacheKey, Slot<V>>>,
}

impl<V> ConnectionCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the value for `key`, running `factory` on a miss.
    ///
    /// Only one factory runs per key at a time; other callers for the same
    /// key wait for it and receive its outcome. A failed creation is not cached.
    pub async fn cache<F, Fut>(&self, key: &CacheKey, factory: F) -> DbaasResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DbaasResult<V>>,
    {
        let slot = self.slot(key).await;
        let outcome = slot
            .get_or_init(move || async move {
                debug!(key = %key, "Cache miss, creating value");
                factory().await
            })
            .await
            .clone();

        if outcome.is_err() {
            let mut entries = self.entries.write().await;
            if entries.get(key).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
                entries.remove(key);
            }
        }
        outcome
    }

    /// Cached value for `key`, if creation has completed successfully.
    pub async fn get(&self, key: &CacheKey) -> Option<V> {
        let entries = self.entries.read().await;
        match entries.get(key).and_then(|slot| slot.get()) {
            Some(Ok(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Evict `key` unconditionally. Returns whether an entry was present.
    pub async fn delete(&self, key: &CacheKey) -> bool {
        let removed = self.entries.write().await.remove(key).is_some();
        if removed {
            debug!(key = %key, "Evicted cache entry");
        }
        removed
    }

    /// Evict `key` only if its current value satisfies `predicate`.
    ///
    /// Lets a caller evict the exact value it observed failing without
    /// removing a replacement another caller has already stored.
    pub async fn delete_if<P>(&self, key: &CacheKey, predicate: P) -> bool
    where
        P: FnOnce(&V) -> bool,
    {
        let mut entries = self.entries.write().await;
        let matches = match entries.get(key).and_then(|slot| slot.get()) {
            Some(Ok(value)) => predicate(value),
            _ => false,
        };
        if matches {
            entries.remove(key);
            debug!(key = %key, "Evicted stale cache entry");
        }
        matches
    }

    /// Number of successfully created entries.
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries
            .values()
            .filter(|slot| matches!(slot.get(), Some(Ok(_))))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove every entry and hand back the created values.
    pub async fn drain(&self) -> Vec<(CacheKey, V)> {
        let drained: Vec<_> = {
            let mut entries = self.entries.write().await;
            entries.drain().collect()
        };
        drained
            .into_iter()
            .filter_map(|(key, slot)| match slot.get() {
                Some(Ok(value)) => Some((key, value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Get or insert the slot for `key`.
    async fn slot(&self, key: &CacheKey) -> Slot<V> {
        {
            let entries = self.entries.read().await;
            if let Some(slot) = entries.get(key) {
                return Arc::clone(slot);
            }
        }
        let mut entries = self.entries.write().await;
        // Double-check after acquiring write lock
        Arc::clone(
            entries
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        )
    }
}

impl<V> Default for ConnectionCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for ConnectionCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCache").finish_non_exhaustive()
    }
}
