// src/ring_buffer.rs
//! Bounded log of message retrievals.
//!
//! Keeps the most recent [`RetrievalEntry`] values in a fixed-size ring with
//! FIFO eviction. A process that keeps hitting the same failing native call
//! cannot grow it; old entries are dropped and counted instead.
//!
//! # Design Principles
//!
//! - **Bounded memory**: capacity fixed at construction
//! - **Optional**: a zero-capacity log records nothing and never locks
//! - **FIFO eviction**: oldest entries dropped first
//! - **RwLock-based**: concurrent readers, exclusive writers
//! - **Poison-tolerant**: a panicking writer cannot disable the log
//!
//! # Example
//!
//! ```rust
//! use platform_errors::{RetrievalEntry, RetrievalLog, RetrievalOutcome};
//!
//! let log = RetrievalLog::new(2);
//! for code in 0..3 {
//!     log.record(RetrievalEntry::new(code, None, RetrievalOutcome::Fallback, 0));
//! }
//!
//! assert_eq!(log.len(), 2);
//! assert_eq!(log.eviction_count(), 1);
//! assert_eq!(log.get_recent(1)[0].code, 2);
//! ```

use crate::logging::RetrievalEntry;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Fixed-size ring buffer with exact allocation (no growth).
struct RingBuffer {
    entries: Box<[Option<RetrievalEntry>]>,
    /// Write position
    tail: usize,
    /// Oldest entry
    head: usize,
    len: usize,
}

impl RingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            entries: vec![None; capacity].into_boxed_slice(),
            tail: 0,
            head: 0,
            len: 0,
        }
    }

    fn push(&mut self, entry: RetrievalEntry) -> Option<RetrievalEntry> {
        let evicted = self.entries[self.tail].replace(entry);
        self.tail = (self.tail + 1) % self.entries.len();

        if self.len < self.entries.len() {
            self.len += 1;
        } else {
            self.head = (self.head + 1) % self.entries.len();
        }

        evicted
    }

    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    fn iter(&self) -> impl DoubleEndedIterator<Item = &RetrievalEntry> {
        let head = self.head;
        let cap = self.entries.len();

        (0..self.len).filter_map(move |i| self.entries[(head + i) % cap].as_ref())
    }

    fn clear(&mut self) {
        self.entries.fill(None);
        self.head = 0;
        self.tail = 0;
        self.len = 0;
    }
}

/// Ring buffer of retrieval entries with bounded memory usage.
///
/// Clones share the same buffer and eviction counter.
pub struct RetrievalLog {
    buffer: Arc<RwLock<RingBuffer>>,
    max_entries: usize,
    eviction_count: Arc<AtomicU64>,
}

impl RetrievalLog {
    /// Log holding at most `max_entries` entries. Zero disables recording.
    pub fn new(max_entries: usize) -> Self {
        Self {
            buffer: Arc::new(RwLock::new(RingBuffer::new(max_entries))),
            max_entries,
            eviction_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Log that drops every entry.
    #[inline]
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Whether entries are kept at all.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.max_entries > 0
    }

    #[inline]
    fn read_buffer(&self) -> RwLockReadGuard<'_, RingBuffer> {
        match self.buffer.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[inline]
    fn write_buffer(&self) -> RwLockWriteGuard<'_, RingBuffer> {
        match self.buffer.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Append an entry, evicting the oldest when full.
    pub fn record(&self, entry: RetrievalEntry) {
        if !self.is_enabled() {
            return;
        }
        let mut buffer = self.write_buffer();
        if buffer.push(entry).is_some() {
            self.eviction_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// The `count` most recent entries, newest first.
    pub fn get_recent(&self, count: usize) -> Vec<RetrievalEntry> {
        let buffer = self.read_buffer();
        buffer.iter().rev().take(count).copied().collect()
    }

    /// All entries, newest first.
    pub fn get_all(&self) -> Vec<RetrievalEntry> {
        let buffer = self.read_buffer();
        buffer.iter().rev().copied().collect()
    }

    /// Entries matching `predicate`, oldest first.
    ///
    /// ```rust
    /// # use platform_errors::RetrievalLog;
    /// # let log = RetrievalLog::new(16);
    /// let fallbacks = log.get_filtered(|e| e.outcome.is_fallback());
    /// # assert!(fallbacks.is_empty());
    /// ```
    pub fn get_filtered<F>(&self, predicate: F) -> Vec<RetrievalEntry>
    where
        F: Fn(&RetrievalEntry) -> bool,
    {
        let buffer = self.read_buffer();
        buffer.iter().filter(|e| predicate(e)).copied().collect()
    }

    /// Current number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.read_buffer().len()
    }

    /// Whether the log is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries evicted since creation.
    #[inline]
    pub fn eviction_count(&self) -> u64 {
        self.eviction_count.load(Ordering::Relaxed)
    }

    /// Drop all entries. The eviction counter is kept.
    pub fn clear(&self) {
        self.write_buffer().clear();
    }

    /// Maximum number of entries.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    /// Whether the log is at capacity. Never true for a disabled log.
    pub fn is_full(&self) -> bool {
        self.is_enabled() && self.len() >= self.max_entries
    }
}

impl Clone for RetrievalLog {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
            max_entries: self.max_entries,
            eviction_count: Arc::clone(&self.eviction_count),
        }
    }
}

impl std::fmt::Debug for RetrievalLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalLog")
            .field("len", &self.len())
            .field("capacity", &self.max_entries)
            .field("evictions", &self.eviction_count())
            .finish()
    }
}
