//! Reference counts for GL objects shared across owners.
//!
//! A handle enters the table on its first retain with an [`Ownership`]
//! tag and leaves exactly when its count returns to zero. The caller gets
//! the tag back at that point and disposes of the object outside the
//! table's lock: pool-owned objects go back to their pool, client-owned
//! ones are handed to their free callback.

use std::fmt;
use std::sync::Mutex;

use rustc_hash::FxHashMap;

use crate::driver::GlName;
use crate::util::sync::lock;

/// Callback that frees a client-owned object.
pub type FreeCallback = Box<dyn FnOnce(GlName) + Send>;

/// Who disposes of an object when its count reaches zero.
pub enum Ownership<K> {
    /// Return to the pool bucket `K`.
    PoolOwned(K),
    /// Invoke the client's free callback.
    ClientOwned(FreeCallback),
}

impl<K: fmt::Debug> fmt::Debug for Ownership<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoolOwned(key) => f.debug_tuple("PoolOwned").field(key).finish(),
            Self::ClientOwned(_) => f.write_str("ClientOwned(..)"),
        }
    }
}

/// Outcome of a release.
#[derive(Debug)]
pub enum Released<K> {
    /// Still referenced; remaining count.
    Retained(u32),
    /// Count reached zero; dispose according to the ownership.
    Dispose(Ownership<K>),
    /// Handle 0 or not in the table.
    Untracked,
}

struct Entry<K> {
    count: u32,
    ownership: Ownership<K>,
}

/// Mutex-guarded map of handle → (count, ownership).
pub struct HandleTable<K> {
    label: &'static str,
    entries: Mutex<FxHashMap<GlName, Entry<K>>>,
}

impl<K> HandleTable<K> {
    /// Create an empty table; `label` names the object kind in logs.
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    /// Increment the count of `name`, registering `ownership` on the
    /// first retain. Returns the new count (0 for handle 0).
    pub fn retain(&self, name: GlName, ownership: Ownership<K>) -> u32 {
        if name == 0 {
            return 0;
        }
        let mut entries = lock(&self.entries);
        let entry = entries.entry(name).or_insert(Entry {
            count: 0,
            ownership,
        });
        entry.count += 1;
        entry.count
    }

    /// Decrement the count of `name`.
    ///
    /// Releasing a handle that is not in the table is logged and leaves
    /// every other entry untouched.
    pub fn release(&self, name: GlName) -> Released<K> {
        if name == 0 {
            return Released::Untracked;
        }
        let mut entries = lock(&self.entries);
        let Some(entry) = entries.get_mut(&name) else {
            drop(entries);
            log::error!(
                "Released {} {name}, which is not retained (double release?)",
                self.label
            );
            return Released::Untracked;
        };
        entry.count -= 1;
        if entry.count > 0 {
            return Released::Retained(entry.count);
        }
        entries
            .remove(&name)
            .map_or(Released::Untracked, |e| Released::Dispose(e.ownership))
    }

    /// Remove `name` without disposing of it. Only allowed while exactly
    /// one owner holds it; otherwise logged and refused.
    pub fn disown(&self, name: GlName) -> Option<Ownership<K>> {
        if name == 0 {
            return None;
        }
        let mut entries = lock(&self.entries);
        match entries.get(&name).map(|e| e.count) {
            Some(1) => entries.remove(&name).map(|e| e.ownership),
            Some(count) => {
                drop(entries);
                log::error!(
                    "Can't disown {} {name}: it is retained {count} times",
                    self.label
                );
                None
            }
            None => {
                drop(entries);
                log::error!("Can't disown {} {name}: it is not retained", self.label);
                None
            }
        }
    }

    /// Current count of `name` (0 if untracked).
    #[must_use]
    pub fn count(&self, name: GlName) -> u32 {
        lock(&self.entries).get(&name).map_or(0, |e| e.count)
    }

    /// Number of tracked handles.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Whether no handle is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn disposes_exactly_at_matching_release() {
        let table: HandleTable<&str> = HandleTable::new("texture");
        for _ in 0..3 {
            let _ = table.retain(7, Ownership::PoolOwned("bucket"));
        }
        assert!(matches!(table.release(7), Released::Retained(2)));
        assert!(matches!(table.release(7), Released::Retained(1)));
        match table.release(7) {
            Released::Dispose(Ownership::PoolOwned(key)) => assert_eq!(key, "bucket"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(table.is_empty());
    }

    #[test]
    fn double_release_leaves_others_alone() {
        let table: HandleTable<u8> = HandleTable::new("buffer");
        let _ = table.retain(1, Ownership::PoolOwned(0));
        let _ = table.retain(2, Ownership::PoolOwned(0));
        let _ = table.retain(2, Ownership::PoolOwned(0));
        assert!(matches!(table.release(1), Released::Dispose(_)));
        assert!(matches!(table.release(1), Released::Untracked));
        assert_eq!(table.count(2), 2);
        assert!(matches!(table.release(0), Released::Untracked));
    }

    #[test]
    fn first_ownership_wins() {
        let freed = Arc::new(AtomicU32::new(0));
        let table: HandleTable<()> = HandleTable::new("texture");
        let f = freed.clone();
        let _ = table.retain(
            5,
            Ownership::ClientOwned(Box::new(move |n| f.store(n, Ordering::SeqCst))),
        );
        let _ = table.retain(5, Ownership::PoolOwned(()));
        let _ = table.release(5);
        match table.release(5) {
            Released::Dispose(Ownership::ClientOwned(free)) => free(5),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(freed.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn disown_requires_single_owner() {
        let table: HandleTable<()> = HandleTable::new("texture");
        let _ = table.retain(9, Ownership::PoolOwned(()));
        let _ = table.retain(9, Ownership::PoolOwned(()));
        assert!(table.disown(9).is_none());
        assert_eq!(table.count(9), 2);
        let _ = table.release(9);
        assert!(table.disown(9).is_some());
        assert_eq!(table.count(9), 0);
        assert!(table.disown(9).is_none());
    }
}
