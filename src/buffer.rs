//! Tagged handle over a native message buffer.
//!
//! A pointer from `TryGetErrorMessage` is either borrowed (the library keeps
//! managing it) or owned (the caller must release it exactly once). The handle
//! carries the context's [`ReleaseGate`], which is settled before the context
//! can hand out any buffer, and the release goes through
//! [`ReleaseGate::if_open`].
//!
//! # Lifecycle
//!
//! 1. Acquired right after a successful lookup
//! 2. Text copied into an owned `String`
//! 3. Passed to `DeleteErrorMessage` in `Drop` if the gate is open, left alone
//!    otherwise
//!
//! The copy always happens before the release, so the ownership decision can
//! never affect the returned text. The handle is consumed by
//! [`NativeBuffer::into_message`] and is not `Clone`, so it cannot outlive the
//! call that produced it or be released twice.

use crate::gate::ReleaseGate;
use crate::native::ErrorSource;
use std::ffi::{CStr, c_char};
use std::fmt;
use std::ptr::NonNull;

/// Who is responsible for releasing a native buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// The library manages the buffer; the caller must not release it.
    Borrowed,
    /// The caller must release the buffer through `DeleteErrorMessage`.
    Owned,
}

impl Ownership {
    /// Whether dropping a buffer with this ownership releases it.
    #[inline]
    pub const fn must_release(self) -> bool {
        matches!(self, Self::Owned)
    }
}

/// A message buffer returned by the foreign library.
pub(crate) struct NativeBuffer<'s> {
    ptr: NonNull<c_char>,
    gate: &'s ReleaseGate,
    source: &'s dyn ErrorSource,
}

impl<'s> NativeBuffer<'s> {
    /// Wrap a buffer just returned by `source`.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `source.try_error_message`, point to a
    /// NUL-terminated string, and not have been released. `gate` must be open
    /// only when the source's release policy is `true`, and must not change
    /// state while the handle lives.
    #[inline]
    pub(crate) unsafe fn new(
        source: &'s dyn ErrorSource,
        gate: &'s ReleaseGate,
        ptr: NonNull<c_char>,
    ) -> Self {
        Self { ptr, gate, source }
    }

    #[inline]
    pub(crate) fn ownership(&self) -> Ownership {
        self.gate.ownership()
    }

    /// Copy the text out. Invalid UTF-8 is replaced, not rejected.
    pub(crate) fn to_message(&self) -> String {
        // SAFETY: guaranteed NUL-terminated and live by the constructor contract.
        let text = unsafe { CStr::from_ptr(self.ptr.as_ptr()) };
        text.to_string_lossy().into_owned()
    }

    /// Copy the text out, then dispose of the buffer.
    ///
    /// Returns the text and whether the buffer was released.
    pub(crate) fn into_message(self) -> (String, bool) {
        let message = self.to_message();
        let released = self.ownership().must_release();
        drop(self);
        (message, released)
    }
}

impl Drop for NativeBuffer<'_> {
    fn drop(&mut self) {
        let source = self.source;
        // SAFETY: the gate is open only under a `true` release policy, the
        // buffer came from this source, and `Drop` runs once per handle.
        self.gate.if_open(
            |ptr: NonNull<c_char>| unsafe { source.delete_error_message(ptr) },
            self.ptr,
        );
    }
}

impl fmt::Debug for NativeBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeBuffer")
            .field("ptr", &self.ptr)
            .field("ownership", &self.ownership())
            .finish_non_exhaustive()
    }
}
