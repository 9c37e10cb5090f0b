//! Capacity-bounded concurrent map with oldest-inserted-first eviction.
//!
//! Both the token store and the session authenticator cap their live entry
//! count, so the bounded behavior lives in one place. Entries carry an
//! insertion stamp; the eviction queue records `(key, stamp)` pairs and an
//! eviction only removes the entry whose stamp still matches, so a key that
//! was removed and re-inserted is never evicted through its stale slot.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub struct BoundedMap<V> {
    entries: DashMap<String, Stamped<V>>,
    order: Mutex<VecDeque<(String, u64)>>,
    stamp: AtomicU64,
    capacity: usize,
}

struct Stamped<V> {
    stamp: u64,
    value: V,
}

impl<V: Clone> BoundedMap<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            stamp: AtomicU64::new(0),
            capacity,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).map(|e| e.value.clone())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Insert `value` under `key`, replacing any previous entry, and evict
    /// the oldest insertions once the number of live entries exceeds the
    /// capacity. Evicted values (never the one just inserted by this call,
    /// unless capacity is zero and it is the only candidate) are passed to
    /// `on_evict`.
    pub fn insert(&self, key: String, value: V, mut on_evict: impl FnMut(V)) {
        let stamp = self.stamp.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(key.clone(), Stamped { stamp, value });

        let mut evicted = Vec::new();
        {
            let mut order = self
                .order
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            order.push_back((key, stamp));
            // Eviction counts live entries, not queue slots: entries removed
            // through `remove`/`remove_if` leave stale slots behind, which
            // must not push live entries out.
            while self.entries.len() > self.capacity {
                let Some((oldest, oldest_stamp)) = order.pop_front() else {
                    break;
                };
                if let Some((_, stamped)) = self
                    .entries
                    .remove_if(&oldest, |_, e| e.stamp == oldest_stamp)
                {
                    evicted.push(stamped.value);
                }
            }
            // Stale slots drain lazily; compact once they dominate so the
            // queue stays within a constant factor of the live count.
            if order.len() > self.capacity.max(2 * self.entries.len()) {
                order.retain(|(key, stamp)| {
                    self.entries.get(key).is_some_and(|e| e.stamp == *stamp)
                });
            }
        }
        for value in evicted {
            on_evict(value);
        }
    }

    /// Remove and return the entry for `key`, if any.
    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|(_, e)| e.value)
    }

    /// Remove the entry for `key` only if `pred` accepts its current value.
    /// This is the winner-takes-all primitive: of several concurrent calls
    /// targeting the same entry, exactly one observes `Some`.
    pub fn remove_if(&self, key: &str, pred: impl FnOnce(&V) -> bool) -> Option<V> {
        self.entries
            .remove_if(key, |_, e| pred(&e.value))
            .map(|(_, e)| e.value)
    }
}
