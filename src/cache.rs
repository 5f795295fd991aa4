//! Memoized error records, one per code.
//!
//! The cache only grows. Records are never evicted or replaced, so an
//! `Arc<ErrorRecord>` handed out once stays the canonical record for that
//! code for the life of the cache.
//!
//! # Concurrency
//!
//! Lookups take a read lock. On a miss the caller builds the record with no
//! lock held (building may call into the native library), then inserts under
//! the write lock only if the code is still absent. Two threads may both
//! build a record for the same code. Only one is stored, and both callers get
//! the stored one back.

use crate::models::ErrorRecord;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Grow-only map from error code to shared record.
#[derive(Debug, Default)]
pub struct ErrorCache {
    entries: RwLock<HashMap<i32, Arc<ErrorRecord>>>,
}

impl ErrorCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    // Entries are inserted whole, so a poisoned map is still consistent.
    #[inline]
    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<i32, Arc<ErrorRecord>>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[inline]
    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<i32, Arc<ErrorRecord>>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// The stored record for `code`, if any.
    #[inline]
    pub fn get(&self, code: i32) -> Option<Arc<ErrorRecord>> {
        self.read_entries().get(&code).cloned()
    }

    /// Store `record` unless its code is already present.
    ///
    /// Returns the stored record, which is `record` only if it won.
    pub fn insert_if_absent(&self, record: ErrorRecord) -> Arc<ErrorRecord> {
        let mut entries = self.write_entries();
        Arc::clone(
            entries
                .entry(record.code())
                .or_insert_with(|| Arc::new(record)),
        )
    }

    /// The stored record for `code`, building it with `build` on a miss.
    ///
    /// `build` runs without any lock held and may run concurrently for the
    /// same code on different threads.
    pub fn get_or_insert_with<F>(&self, code: i32, build: F) -> Arc<ErrorRecord>
    where
        F: FnOnce() -> ErrorRecord,
    {
        if let Some(record) = self.get(code) {
            return record;
        }
        self.insert_if_absent(build())
    }

    /// Number of stored codes.
    #[inline]
    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    /// Whether nothing is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn miss_builds_then_hit_reuses() {
        let cache = ErrorCache::new();
        let builds = AtomicUsize::new(0);

        let first = cache.get_or_insert_with(2, || {
            builds.fetch_add(1, Ordering::SeqCst);
            ErrorRecord::new(2, "no such file")
        });
        let second = cache.get_or_insert_with(2, || {
            builds.fetch_add(1, Ordering::SeqCst);
            ErrorRecord::new(2, "rebuilt")
        });

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.message(), "no such file");
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn first_insert_wins() {
        let cache = ErrorCache::new();

        let winner = cache.insert_if_absent(ErrorRecord::new(5, "first"));
        let loser = cache.insert_if_absent(ErrorRecord::new(5, "second"));

        assert!(Arc::ptr_eq(&winner, &loser));
        assert_eq!(loser.message(), "first");
    }

    #[test]
    fn codes_are_independent() {
        let cache = ErrorCache::new();
        cache.insert_if_absent(ErrorRecord::new(1, "one"));
        cache.insert_if_absent(ErrorRecord::new(-1, "minus one"));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(-1).unwrap().message(), "minus one");
        assert!(cache.get(0).is_none());
    }

    #[test]
    fn racing_builders_store_one_record() {
        let cache = Arc::new(ErrorCache::new());
        let barrier = Arc::new(Barrier::new(16));
        let mut handles = Vec::new();

        for t in 0..16 {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                cache.get_or_insert_with(42, || ErrorRecord::new(42, format!("built by {}", t)))
            }));
        }

        let results: Vec<Arc<ErrorRecord>> = handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .collect();

        let stored = cache.get(42).expect("stored");
        assert_eq!(cache.len(), 1);
        for record in &results {
            assert!(Arc::ptr_eq(record, &stored));
        }
    }
}
