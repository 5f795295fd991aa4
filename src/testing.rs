//! Scripted stand-in for the native platform error library.
//!
//! [`ScriptedSource`] implements [`ErrorSource`] with heap-allocated C strings
//! and counts every call that matters for the buffer protocol, so tests can
//! check release accounting without a real shared library.
//!
//! Buffers are tracked by address. A release of an address the source never
//! handed out, or already took back, is counted in
//! [`invalid_deletes`](ScriptedSource::invalid_deletes) and otherwise ignored.
//! Buffers still outstanding when the last clone is dropped are freed then,
//! which models a library that manages its own storage.
//!
//! Under a `false` release policy the source keeps one buffer per code and
//! hands the same pointer out on every lookup, so repeated lookups do not
//! grow its storage.
//!
//! ```rust
//! use platform_errors::{Config, PlatformErrors, testing::ScriptedSource};
//!
//! let source = ScriptedSource::new().with_message(2, "no such file").releasing(true);
//! let errors = PlatformErrors::new(source.clone(), &Config::default());
//!
//! assert_eq!(errors.get_message(2), "no such file");
//! assert_eq!(source.messages_deleted(), 1);
//! ```

use crate::native::ErrorSource;
use std::collections::{HashMap, HashSet};
use std::ffi::{CString, c_char};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// Test double for the platform error library.
///
/// Clones share state, so one clone can be handed to a context while another
/// is kept for assertions.
#[derive(Clone, Debug, Default)]
pub struct ScriptedSource {
    inner: Arc<ScriptedState>,
}

#[derive(Debug, Default)]
struct ScriptedState {
    messages: RwLock<HashMap<i32, Vec<u8>>>,
    general_code: AtomicI32,
    socket_code: AtomicI32,
    release_policy: AtomicBool,
    policy_queries: AtomicUsize,
    lookups: AtomicUsize,
    issued: AtomicUsize,
    deleted: AtomicUsize,
    invalid_deletes: AtomicUsize,
    outstanding: Mutex<HashSet<usize>>,
    kept: Mutex<HashMap<i32, usize>>,
}

impl ScriptedState {
    fn outstanding(&self) -> MutexGuard<'_, HashSet<usize>> {
        match self.outstanding.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn kept(&self) -> MutexGuard<'_, HashMap<i32, usize>> {
        match self.kept.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for ScriptedState {
    fn drop(&mut self) {
        for address in self.outstanding().drain() {
            // SAFETY: every tracked address came from `CString::into_raw` and
            // was removed from the set when taken back.
            drop(unsafe { CString::from_raw(address as *mut c_char) });
        }
    }
}

impl ScriptedSource {
    /// Source with no messages, both codes 0, and a `false` release policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a message for `code`.
    pub fn with_message(self, code: i32, message: impl Into<String>) -> Self {
        self.with_raw_message(code, message.into().into_bytes())
    }

    /// Script raw message bytes for `code`. Bytes after an interior NUL are dropped.
    pub fn with_raw_message(self, code: i32, mut bytes: Vec<u8>) -> Self {
        if let Some(nul) = bytes.iter().position(|&b| b == 0) {
            bytes.truncate(nul);
        }
        match self.inner.messages.write() {
            Ok(mut messages) => messages.insert(code, bytes),
            Err(poisoned) => poisoned.into_inner().insert(code, bytes),
        };
        // Stale kept buffer stays outstanding and is freed on drop.
        self.inner.kept().remove(&code);
        self
    }

    /// Set the current general error code.
    pub fn with_general_code(self, code: i32) -> Self {
        self.set_general_code(code);
        self
    }

    /// Set the current socket error code.
    pub fn with_socket_code(self, code: i32) -> Self {
        self.set_socket_code(code);
        self
    }

    /// Set the answer to `ShouldDeleteErrorMessage`.
    pub fn releasing(self, should_release: bool) -> Self {
        self.inner
            .release_policy
            .store(should_release, Ordering::SeqCst);
        self
    }

    /// Change the current general error code.
    pub fn set_general_code(&self, code: i32) {
        self.inner.general_code.store(code, Ordering::SeqCst);
    }

    /// Change the current socket error code.
    pub fn set_socket_code(&self, code: i32) {
        self.inner.socket_code.store(code, Ordering::SeqCst);
    }

    /// Number of `ShouldDeleteErrorMessage` calls.
    pub fn policy_queries(&self) -> usize {
        self.inner.policy_queries.load(Ordering::SeqCst)
    }

    /// Number of `TryGetErrorMessage` calls, found or not.
    pub fn lookups(&self) -> usize {
        self.inner.lookups.load(Ordering::SeqCst)
    }

    /// Number of buffers handed out.
    pub fn messages_issued(&self) -> usize {
        self.inner.issued.load(Ordering::SeqCst)
    }

    /// Number of valid `DeleteErrorMessage` calls.
    pub fn messages_deleted(&self) -> usize {
        self.inner.deleted.load(Ordering::SeqCst)
    }

    /// Number of `DeleteErrorMessage` calls on unknown or already released buffers.
    pub fn invalid_deletes(&self) -> usize {
        self.inner.invalid_deletes.load(Ordering::SeqCst)
    }

    /// Distinct buffers handed out and not yet taken back.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding().len()
    }
}

impl ErrorSource for ScriptedSource {
    fn error_code(&self) -> i32 {
        self.inner.general_code.load(Ordering::SeqCst)
    }

    fn socket_error_code(&self) -> i32 {
        self.inner.socket_code.load(Ordering::SeqCst)
    }

    fn try_error_message(&self, code: i32) -> Option<NonNull<c_char>> {
        self.inner.lookups.fetch_add(1, Ordering::SeqCst);

        let keep = !self.inner.release_policy.load(Ordering::SeqCst);
        if keep {
            if let Some(&address) = self.inner.kept().get(&code) {
                self.inner.issued.fetch_add(1, Ordering::SeqCst);
                return NonNull::new(address as *mut c_char);
            }
        }

        let bytes = match self.inner.messages.read() {
            Ok(messages) => messages.get(&code).cloned(),
            Err(poisoned) => poisoned.into_inner().get(&code).cloned(),
        }?;
        let message = CString::new(bytes).unwrap_or_default();
        let ptr = NonNull::new(message.into_raw())?;
        let address = ptr.as_ptr() as usize;

        self.inner.outstanding().insert(address);
        if keep {
            self.inner.kept().insert(code, address);
        }
        self.inner.issued.fetch_add(1, Ordering::SeqCst);
        Some(ptr)
    }

    fn should_delete_error_message(&self) -> bool {
        self.inner.policy_queries.fetch_add(1, Ordering::SeqCst);
        self.inner.release_policy.load(Ordering::SeqCst)
    }

    unsafe fn delete_error_message(&self, message: NonNull<c_char>) {
        let address = message.as_ptr() as usize;
        if self.inner.outstanding().remove(&address) {
            self.inner.kept().retain(|_, kept| *kept != address);
            self.inner.deleted.fetch_add(1, Ordering::SeqCst);
            // SAFETY: the address was tracked, so it came from `into_raw` here.
            drop(unsafe { CString::from_raw(message.as_ptr()) });
        } else {
            self.inner.invalid_deletes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kept_buffers_are_reused_per_code() {
        let source = ScriptedSource::new()
            .with_message(1, "one")
            .with_message(2, "two");

        let first = source.try_error_message(1).expect("message for 1");
        for _ in 0..100 {
            assert_eq!(source.try_error_message(1), Some(first));
        }
        assert_ne!(source.try_error_message(2), Some(first));

        assert_eq!(source.messages_issued(), 102);
        assert_eq!(source.outstanding(), 2);
    }

    #[test]
    fn releasing_source_issues_fresh_buffers() {
        let source = ScriptedSource::new().with_message(1, "one").releasing(true);

        let first = source.try_error_message(1).expect("message for 1");
        let second = source.try_error_message(1).expect("message for 1");
        assert_ne!(first, second);

        unsafe {
            source.delete_error_message(first);
            source.delete_error_message(second);
            source.delete_error_message(second);
        }
        assert_eq!(source.messages_deleted(), 2);
        assert_eq!(source.invalid_deletes(), 1);
        assert_eq!(source.outstanding(), 0);
    }

    #[test]
    fn rescripting_replaces_kept_buffer() {
        let source = ScriptedSource::new().with_message(1, "old");
        let old = source.try_error_message(1).expect("message for 1");

        let source = source.with_message(1, "new");
        let new = source.try_error_message(1).expect("message for 1");

        assert_ne!(old, new);
        let text = unsafe { std::ffi::CStr::from_ptr(new.as_ptr()) };
        assert_eq!(text.to_str().unwrap(), "new");
        assert_eq!(source.outstanding(), 2);
    }
}
