//! Native entry points of the platform error library.
//!
//! The foreign library reports errors through five flat C exports. This module
//! binds them once into a typed table ([`EntryPoints`]) and exposes them behind
//! the [`ErrorSource`] trait, which is the only seam the rest of the crate
//! talks to. Test doubles implement the same trait (see [`crate::testing`]).
//!
//! # Resolution
//!
//! Resolution is all-or-nothing. A library missing any of the five exports is
//! unusable, so [`EntryPoints::resolve`] reports every missing symbol at once
//! instead of failing on the first one:
//!
//! ```rust
//! use platform_errors::{EntryPoints, ResolveError};
//!
//! // A lookup that finds nothing.
//! let err = unsafe { EntryPoints::resolve(|_| None) }.unwrap_err();
//! match err {
//!     ResolveError::MissingEntryPoints { names } => assert_eq!(names.len(), 5),
//!     other => panic!("unexpected: {other}"),
//! }
//! ```
//!
//! # Buffer Ownership
//!
//! `TryGetErrorMessage` hands back a pointer whose ownership depends on the
//! library's release policy (`ShouldDeleteErrorMessage`). This module does not
//! interpret that policy; it only surfaces the raw pointer. See
//! [`crate::buffer`] for the ownership protocol.

use smallvec::SmallVec;
use std::ffi::{c_char, c_void};
use std::fmt;
use std::ptr::{self, NonNull};

/// Module name the platform library is published under.
///
/// The default [`crate::Config`] loads the platform-specific file name for
/// this module (`libExceptions.so`, `Exceptions.dll`, ...).
pub const LIBRARY_NAME: &str = "Exceptions";

/// Export names of the five required entry points.
pub mod symbols {
    /// `int GetErrorCode(void)`
    pub const GET_ERROR_CODE: &str = "GetErrorCode";
    /// `int GetSocketErrorCode(void)`
    pub const GET_SOCKET_ERROR_CODE: &str = "GetSocketErrorCode";
    /// `bool TryGetErrorMessage(int code, char **message)`
    pub const TRY_GET_ERROR_MESSAGE: &str = "TryGetErrorMessage";
    /// `bool ShouldDeleteErrorMessage(void)`
    pub const SHOULD_DELETE_ERROR_MESSAGE: &str = "ShouldDeleteErrorMessage";
    /// `void DeleteErrorMessage(char *message)`
    pub const DELETE_ERROR_MESSAGE: &str = "DeleteErrorMessage";

    /// All required exports, in resolution order.
    pub const ALL: [&str; 5] = [
        GET_ERROR_CODE,
        GET_SOCKET_ERROR_CODE,
        TRY_GET_ERROR_MESSAGE,
        SHOULD_DELETE_ERROR_MESSAGE,
        DELETE_ERROR_MESSAGE,
    ];
}

/// Signature of `GetErrorCode`.
pub type GetErrorCodeFn = unsafe extern "C" fn() -> i32;
/// Signature of `GetSocketErrorCode`.
pub type GetSocketErrorCodeFn = unsafe extern "C" fn() -> i32;
/// Signature of `TryGetErrorMessage`.
pub type TryGetErrorMessageFn = unsafe extern "C" fn(i32, *mut *mut c_char) -> bool;
/// Signature of `ShouldDeleteErrorMessage`.
pub type ShouldDeleteErrorMessageFn = unsafe extern "C" fn() -> bool;
/// Signature of `DeleteErrorMessage`.
pub type DeleteErrorMessageFn = unsafe extern "C" fn(*mut c_char);

// ============================================================================
// Error Source Seam
// ============================================================================

/// The five capabilities the crate needs from the foreign library.
///
/// Implementations must be callable from any thread. None of the methods may
/// unwind across the boundary; a foreign library that fails reports it through
/// the returned codes only.
pub trait ErrorSource: Send + Sync {
    /// Current general error code (`GetErrorCode`).
    fn error_code(&self) -> i32;

    /// Current socket error code (`GetSocketErrorCode`).
    fn socket_error_code(&self) -> i32;

    /// Message buffer for `code` (`TryGetErrorMessage`).
    ///
    /// Returns `None` when the library has no message. The returned buffer is
    /// NUL-terminated and stays valid at least until it is released through
    /// [`delete_error_message`](Self::delete_error_message), or for the life of
    /// the source when the release policy says the caller must not free it.
    fn try_error_message(&self, code: i32) -> Option<NonNull<c_char>>;

    /// Release policy (`ShouldDeleteErrorMessage`).
    ///
    /// `true` means buffers returned by `try_error_message` belong to the
    /// caller and must be released exactly once.
    fn should_delete_error_message(&self) -> bool;

    /// Release a buffer (`DeleteErrorMessage`).
    ///
    /// # Safety
    ///
    /// `message` must have been returned by `try_error_message` on this same
    /// source, the release policy must be `true`, and the buffer must not have
    /// been released before.
    unsafe fn delete_error_message(&self, message: NonNull<c_char>);
}

// ============================================================================
// Resolution Errors
// ============================================================================

/// Failure to bind the foreign library.
///
/// Either variant is fatal for the process-wide context: the crate cannot
/// operate without all five entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// One or more exports could not be found.
    MissingEntryPoints {
        /// Every export that was missing, in resolution order.
        names: SmallVec<[&'static str; 5]>,
    },
    /// The shared library itself could not be opened.
    Load {
        /// Library path or name that was requested.
        library: String,
        /// Loader diagnostic.
        reason: String,
    },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEntryPoints { names } => {
                f.write_str("missing native entry points: ")?;
                for (i, name) in names.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(name)?;
                }
                Ok(())
            }
            Self::Load { library, reason } => {
                write!(f, "failed to load native library '{}': {}", library, reason)
            }
        }
    }
}

impl std::error::Error for ResolveError {}

// ============================================================================
// Typed Entry Point Table
// ============================================================================

/// Typed function pointers for the five exports.
///
/// Built once, either from a symbol lookup ([`resolve`](Self::resolve)) or from
/// functions linked into the binary ([`from_fns`](Self::from_fns)). The table
/// itself implements [`ErrorSource`].
#[derive(Clone, Copy)]
pub struct EntryPoints {
    get_error_code: GetErrorCodeFn,
    get_socket_error_code: GetSocketErrorCodeFn,
    try_get_error_message: TryGetErrorMessageFn,
    should_delete_error_message: ShouldDeleteErrorMessageFn,
    delete_error_message: DeleteErrorMessageFn,
}

impl EntryPoints {
    /// Build the table from functions that are already typed.
    ///
    /// Used when the library is linked statically, and by tests.
    ///
    /// # Safety
    ///
    /// The safe [`ErrorSource`] methods call these functions directly, so each
    /// must behave as the matching export in [`symbols`] documents: callable
    /// from any thread at any time, writing only through the out-pointer it is
    /// given, and returning message buffers that satisfy
    /// [`ErrorSource::try_error_message`]. Building the table without `unsafe`
    /// is rejected:
    ///
    /// ```compile_fail,E0133
    /// use platform_errors::EntryPoints;
    /// use std::ffi::c_char;
    ///
    /// unsafe extern "C" fn code() -> i32 { 0 }
    /// unsafe extern "C" fn message(_: i32, _: *mut *mut c_char) -> bool { false }
    /// unsafe extern "C" fn policy() -> bool { false }
    /// unsafe extern "C" fn delete(_: *mut c_char) {}
    ///
    /// let _ = EntryPoints::from_fns(code, code, message, policy, delete);
    /// ```
    pub const unsafe fn from_fns(
        get_error_code: GetErrorCodeFn,
        get_socket_error_code: GetSocketErrorCodeFn,
        try_get_error_message: TryGetErrorMessageFn,
        should_delete_error_message: ShouldDeleteErrorMessageFn,
        delete_error_message: DeleteErrorMessageFn,
    ) -> Self {
        Self {
            get_error_code,
            get_socket_error_code,
            try_get_error_message,
            should_delete_error_message,
            delete_error_message,
        }
    }

    /// Resolve all five exports through `lookup`.
    ///
    /// `lookup` is called once per export name from [`symbols::ALL`] and
    /// returns the export's address, or `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// [`ResolveError::MissingEntryPoints`] listing every name for which
    /// `lookup` returned `None`.
    ///
    /// # Safety
    ///
    /// Every address returned by `lookup` must be a function with the C
    /// calling convention and the signature documented in [`symbols`], and
    /// must stay valid for as long as the returned table is used.
    pub unsafe fn resolve<F>(mut lookup: F) -> Result<Self, ResolveError>
    where
        F: FnMut(&'static str) -> Option<NonNull<c_void>>,
    {
        let mut missing: SmallVec<[&'static str; 5]> = SmallVec::new();
        let mut find = |name: &'static str| {
            let address = lookup(name);
            if address.is_none() {
                missing.push(name);
            }
            address
        };

        let get_error_code = find(symbols::GET_ERROR_CODE);
        let get_socket_error_code = find(symbols::GET_SOCKET_ERROR_CODE);
        let try_get_error_message = find(symbols::TRY_GET_ERROR_MESSAGE);
        let should_delete_error_message = find(symbols::SHOULD_DELETE_ERROR_MESSAGE);
        let delete_error_message = find(symbols::DELETE_ERROR_MESSAGE);

        match (
            get_error_code,
            get_socket_error_code,
            try_get_error_message,
            should_delete_error_message,
            delete_error_message,
        ) {
            (Some(a), Some(b), Some(c), Some(d), Some(e)) => {
                // SAFETY: the caller guarantees each address has the documented
                // signature; data and function pointers have the same size on
                // every supported target.
                unsafe {
                    Ok(Self {
                        get_error_code: std::mem::transmute::<*mut c_void, GetErrorCodeFn>(
                            a.as_ptr(),
                        ),
                        get_socket_error_code: std::mem::transmute::<
                            *mut c_void,
                            GetSocketErrorCodeFn,
                        >(b.as_ptr()),
                        try_get_error_message: std::mem::transmute::<
                            *mut c_void,
                            TryGetErrorMessageFn,
                        >(c.as_ptr()),
                        should_delete_error_message: std::mem::transmute::<
                            *mut c_void,
                            ShouldDeleteErrorMessageFn,
                        >(d.as_ptr()),
                        delete_error_message: std::mem::transmute::<
                            *mut c_void,
                            DeleteErrorMessageFn,
                        >(e.as_ptr()),
                    })
                }
            }
            _ => Err(ResolveError::MissingEntryPoints { names: missing }),
        }
    }
}

impl fmt::Debug for EntryPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoints")
            .field("get_error_code", &(self.get_error_code as *const ()))
            .field("get_socket_error_code", &(self.get_socket_error_code as *const ()))
            .field("try_get_error_message", &(self.try_get_error_message as *const ()))
            .field(
                "should_delete_error_message",
                &(self.should_delete_error_message as *const ()),
            )
            .field("delete_error_message", &(self.delete_error_message as *const ()))
            .finish()
    }
}

// SAFETY (all calls below): the table was built through `from_fns` or
// `resolve`, and both are `unsafe` with a contract covering these calls.
impl ErrorSource for EntryPoints {
    #[inline]
    fn error_code(&self) -> i32 {
        unsafe { (self.get_error_code)() }
    }

    #[inline]
    fn socket_error_code(&self) -> i32 {
        unsafe { (self.get_socket_error_code)() }
    }

    fn try_error_message(&self, code: i32) -> Option<NonNull<c_char>> {
        let mut message: *mut c_char = ptr::null_mut();
        let found = unsafe { (self.try_get_error_message)(code, &mut message) };
        // A "found" answer with a null buffer carries no text.
        if found { NonNull::new(message) } else { None }
    }

    #[inline]
    fn should_delete_error_message(&self) -> bool {
        unsafe { (self.should_delete_error_message)() }
    }

    unsafe fn delete_error_message(&self, message: NonNull<c_char>) {
        unsafe { (self.delete_error_message)(message.as_ptr()) }
    }
}

// ============================================================================
// Dynamically Loaded Library
// ============================================================================

/// The platform library opened at runtime, with its entry points bound.
///
/// Keeps the library mapped for as long as the table is alive.
#[cfg(feature = "dynamic")]
pub struct NativeLibrary {
    entries: EntryPoints,
    _library: libloading::Library,
}

#[cfg(feature = "dynamic")]
impl NativeLibrary {
    /// Open `path` and resolve the five exports.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::Load`] when the library cannot be opened
    /// - [`ResolveError::MissingEntryPoints`] when any export is absent
    pub fn open(path: impl AsRef<std::ffi::OsStr>) -> Result<Self, ResolveError> {
        let path = path.as_ref();

        // SAFETY: opening runs the library's initializers; the platform error
        // library is a trusted component of the host process.
        let library = unsafe { libloading::Library::new(path) }.map_err(|e| ResolveError::Load {
            library: path.to_string_lossy().into_owned(),
            reason: e.to_string(),
        })?;

        // SAFETY: the exports are declared with the documented signatures, and
        // `library` is stored next to the table so the addresses stay mapped.
        let entries = unsafe {
            EntryPoints::resolve(|name| {
                let symbol = library.get::<*mut c_void>(name.as_bytes()).ok()?;
                NonNull::new(*symbol)
            })
        }?;

        Ok(Self {
            entries,
            _library: library,
        })
    }

    /// The bound entry points.
    #[inline]
    pub fn entry_points(&self) -> &EntryPoints {
        &self.entries
    }
}

#[cfg(feature = "dynamic")]
impl fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "dynamic")]
impl ErrorSource for NativeLibrary {
    #[inline]
    fn error_code(&self) -> i32 {
        self.entries.error_code()
    }

    #[inline]
    fn socket_error_code(&self) -> i32 {
        self.entries.socket_error_code()
    }

    #[inline]
    fn try_error_message(&self, code: i32) -> Option<NonNull<c_char>> {
        self.entries.try_error_message(code)
    }

    #[inline]
    fn should_delete_error_message(&self) -> bool {
        self.entries.should_delete_error_message()
    }

    unsafe fn delete_error_message(&self, message: NonNull<c_char>) {
        unsafe { self.entries.delete_error_message(message) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static DELETES: AtomicUsize = AtomicUsize::new(0);
    static MESSAGE: &CStr = c"static message";

    extern "C" fn general() -> i32 {
        5
    }

    extern "C" fn socket() -> i32 {
        111
    }

    extern "C" fn try_message(code: i32, out: *mut *mut c_char) -> bool {
        match code {
            1 => {
                unsafe { *out = MESSAGE.as_ptr() as *mut c_char };
                true
            }
            // Claims success but leaves the buffer null.
            3 => true,
            _ => false,
        }
    }

    extern "C" fn should_delete() -> bool {
        false
    }

    extern "C" fn delete(_message: *mut c_char) {
        DELETES.fetch_add(1, Ordering::SeqCst);
    }

    fn address(f: *const ()) -> Option<NonNull<c_void>> {
        NonNull::new(f as *mut c_void)
    }

    fn lookup(name: &'static str) -> Option<NonNull<c_void>> {
        match name {
            symbols::GET_ERROR_CODE => address(general as *const ()),
            symbols::GET_SOCKET_ERROR_CODE => address(socket as *const ()),
            symbols::TRY_GET_ERROR_MESSAGE => address(try_message as *const ()),
            symbols::SHOULD_DELETE_ERROR_MESSAGE => address(should_delete as *const ()),
            symbols::DELETE_ERROR_MESSAGE => address(delete as *const ()),
            _ => None,
        }
    }

    #[test]
    fn resolves_all_entry_points() {
        let entries = unsafe { EntryPoints::resolve(lookup) }.expect("all exports present");

        assert_eq!(entries.error_code(), 5);
        assert_eq!(entries.socket_error_code(), 111);
        assert!(!entries.should_delete_error_message());

        let message = entries.try_error_message(1).expect("message for code 1");
        let text = unsafe { CStr::from_ptr(message.as_ptr()) };
        assert_eq!(text.to_str().unwrap(), "static message");
    }

    #[test]
    fn reports_every_missing_entry_point() {
        let result = unsafe {
            EntryPoints::resolve(|name| match name {
                symbols::GET_SOCKET_ERROR_CODE | symbols::DELETE_ERROR_MESSAGE => None,
                other => lookup(other),
            })
        };

        let err = result.unwrap_err();
        assert_eq!(
            err,
            ResolveError::MissingEntryPoints {
                names: SmallVec::from_slice(&[
                    symbols::GET_SOCKET_ERROR_CODE,
                    symbols::DELETE_ERROR_MESSAGE
                ]),
            }
        );
        assert_eq!(
            err.to_string(),
            "missing native entry points: GetSocketErrorCode, DeleteErrorMessage"
        );
    }

    #[test]
    fn lookup_sees_each_name_once_in_order() {
        let mut seen = Vec::new();
        let _ = unsafe {
            EntryPoints::resolve(|name| {
                seen.push(name);
                lookup(name)
            })
        };
        assert_eq!(seen, symbols::ALL);
    }

    fn linked() -> EntryPoints {
        unsafe { EntryPoints::from_fns(general, socket, try_message, should_delete, delete) }
    }

    #[test]
    fn linked_table_matches_resolved_table() {
        const LINKED: EntryPoints =
            unsafe { EntryPoints::from_fns(general, socket, try_message, should_delete, delete) };

        assert_eq!(LINKED.error_code(), 5);
        assert_eq!(LINKED.socket_error_code(), 111);
        assert!(!LINKED.should_delete_error_message());
    }

    #[test]
    fn no_message_and_null_message_both_yield_none() {
        let entries = linked();

        assert!(entries.try_error_message(999).is_none());
        assert!(entries.try_error_message(3).is_none());
    }

    #[test]
    fn delete_calls_through() {
        let entries = linked();
        let before = DELETES.load(Ordering::SeqCst);

        let message = entries.try_error_message(1).unwrap();
        unsafe { entries.delete_error_message(message) };

        assert_eq!(DELETES.load(Ordering::SeqCst), before + 1);
    }

    #[cfg(feature = "dynamic")]
    #[test]
    fn opening_missing_library_is_a_load_error() {
        let err = NativeLibrary::open("definitely-not-a-real-library-4f1c.so").unwrap_err();
        match err {
            ResolveError::Load { library, reason } => {
                assert_eq!(library, "definitely-not-a-real-library-4f1c.so");
                assert!(!reason.is_empty());
            }
            other => panic!("expected load error, got {other:?}"),
        }
    }
}
