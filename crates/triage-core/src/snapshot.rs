//! Versioned, swap-on-write holders for reconciled data.
//!
//! Readers call [`SnapshotCell::load`] and keep the returned `Arc` for as
//! long as they need a consistent view. Writers build a complete new value
//! off to the side and publish it with [`SnapshotCell::replace`]; a reader
//! never observes a half-updated value.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One published value and when it was published.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot<T> {
    /// Starts at 0 for the initial value and increases by one per replace.
    pub generation: u64,
    pub refreshed_at: DateTime<Utc>,
    pub value: T,
}

#[derive(Debug)]
pub struct SnapshotCell<T> {
    current: RwLock<Arc<Snapshot<T>>>,
}

impl<T> SnapshotCell<T> {
    pub fn new(value: T) -> Self {
        SnapshotCell {
            current: RwLock::new(Arc::new(Snapshot {
                generation: 0,
                refreshed_at: Utc::now(),
                value,
            })),
        }
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<Snapshot<T>> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Publish `value` and return its generation.
    pub fn replace(&self, value: T) -> u64 {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let generation = guard.generation + 1;
        *guard = Arc::new(Snapshot {
            generation,
            refreshed_at: Utc::now(),
            value,
        });
        generation
    }

    pub fn generation(&self) -> u64 {
        self.load().generation
    }
}

impl<T: Default> Default for SnapshotCell<T> {
    fn default() -> Self {
        SnapshotCell::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_bumps_generation() {
        let cell = SnapshotCell::new(vec![1]);
        assert_eq!(cell.generation(), 0);
        assert_eq!(cell.replace(vec![1, 2]), 1);
        assert_eq!(cell.replace(vec![1, 2, 3]), 2);
        assert_eq!(cell.load().value, vec![1, 2, 3]);
    }

    #[test]
    fn test_old_readers_keep_their_view() {
        let cell = SnapshotCell::new("old".to_string());
        let held = cell.load();
        cell.replace("new".to_string());
        assert_eq!(held.value, "old");
        assert_eq!(cell.load().value, "new");
        assert!(cell.load().refreshed_at >= held.refreshed_at);
    }

    #[test]
    fn test_concurrent_readers_see_whole_values() {
        let cell = Arc::new(SnapshotCell::new((0u64, 0u64)));
        let writer = {
            let cell = Arc::clone(&cell);
            std::thread::spawn(move || {
                for i in 1..=200 {
                    cell.replace((i, i * 2));
                }
            })
        };
        for _ in 0..200 {
            let snap = cell.load();
            assert_eq!(snap.value.1, snap.value.0 * 2);
        }
        writer.join().unwrap();
        assert_eq!(cell.generation(), 200);
    }
}
