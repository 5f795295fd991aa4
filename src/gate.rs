//! One-shot release gate for native message buffers.
//!
//! The gate answers a single question for the life of a context: must buffers
//! returned by `TryGetErrorMessage` be handed back through
//! `DeleteErrorMessage`? It starts closed and may be opened once. It is never
//! closed again.
//!
//! # Ordering
//!
//! The open transition is published with `Release` and observed with
//! `Acquire`. A context opens its gate before it becomes reachable, so every
//! reader sees the final state. The atomic keeps the gate sound even when it
//! is shared before opening.

use crate::buffer::Ownership;
use std::sync::atomic::{AtomicBool, Ordering};

/// Closed/Open latch deciding whether native buffers must be released.
#[derive(Debug, Default)]
pub struct ReleaseGate {
    open: AtomicBool,
}

impl ReleaseGate {
    /// A closed gate.
    #[inline]
    pub const fn new() -> Self {
        Self {
            open: AtomicBool::new(false),
        }
    }

    /// Gate initialized from the library's release policy answer.
    #[inline]
    pub fn from_policy(should_release: bool) -> Self {
        let gate = Self::new();
        if should_release {
            gate.open();
        }
        gate
    }

    /// Open the gate. Idempotent.
    #[inline]
    pub fn open(&self) {
        self.open.store(true, Ordering::Release);
    }

    /// Whether the gate is open.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Run `action(arg)` only if the gate is open.
    ///
    /// Returns whether the action ran. When the gate is closed, `arg` is
    /// dropped untouched. Native buffers are released through this call.
    #[inline]
    pub fn if_open<T, F>(&self, action: F, arg: T) -> bool
    where
        F: FnOnce(T),
    {
        if self.is_open() {
            action(arg);
            true
        } else {
            false
        }
    }

    /// Ownership assigned to a buffer acquired while in the current state.
    #[inline]
    pub fn ownership(&self) -> Ownership {
        if self.is_open() {
            Ownership::Owned
        } else {
            Ownership::Borrowed
        }
    }
}
