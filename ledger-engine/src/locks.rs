//! Per-key async mutual exclusion.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A table of async mutexes created on demand, one per key.
///
/// Operations on different keys never wait on each other. Entries are
/// dropped again once no holder or waiter references them.
pub struct KeyedLocks<K: Eq + Hash + Clone> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Waits for exclusive access to `key`.
    ///
    /// Cancel safe: dropping the returned future before it resolves also
    /// releases this caller's claim on the table entry.
    pub async fn lock(&self, key: K) -> KeyGuard<'_, K> {
        // The shard ref must be gone before the await.
        let mutex = self.locks.entry(key.clone()).or_default().clone();
        let entry = EntryRef {
            locks: &self.locks,
            key,
            mutex: Some(mutex.clone()),
        };
        let guard = mutex.lock_owned().await;
        KeyGuard {
            _guard: guard,
            _entry: entry,
        }
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to one key; released on drop.
pub struct KeyGuard<'a, K: Eq + Hash + Clone> {
    // Field order matters: the mutex is unlocked before the entry is released.
    _guard: OwnedMutexGuard<()>,
    _entry: EntryRef<'a, K>,
}

/// One holder's or waiter's reference to a table entry.
struct EntryRef<'a, K: Eq + Hash + Clone> {
    locks: &'a DashMap<K, Arc<Mutex<()>>>,
    key: K,
    mutex: Option<Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> Drop for EntryRef<'_, K> {
    fn drop(&mut self) {
        drop(self.mutex.take());
        // Only the table's own reference left: nobody holds or waits.
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
