//! Error values handed to application code.
//!
//! Two layers, kept separate on purpose:
//!
//! - [`ErrorRecord`]: plain immutable `{code, message}` value. This is what the
//!   cache stores and shares.
//! - [`PlatformError`]: thin wrapper implementing `std::error::Error`, so a
//!   record can travel through `?` and `Box<dyn Error>` like any other error.
//!
//! Cloning a `PlatformError` clones an `Arc`, never the message.

use crate::context::PlatformErrors;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Error Channel
// ============================================================================

/// Which native error state to read.
///
/// Socket and general errors share one code space but are reported by
/// different entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorChannel {
    /// `GetErrorCode`
    #[default]
    General,
    /// `GetSocketErrorCode`
    Socket,
}

impl ErrorChannel {
    /// Channel for the `socket_related` flag used by hosts.
    #[inline]
    pub const fn from_socket_flag(socket_related: bool) -> Self {
        if socket_related {
            Self::Socket
        } else {
            Self::General
        }
    }

    /// Short label for structured output.
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Socket => "socket",
        }
    }
}

impl fmt::Display for ErrorChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Error Record
// ============================================================================

/// One native error code and its message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorRecord {
    code: i32,
    message: Box<str>,
}

impl ErrorRecord {
    /// Record with an explicit message.
    pub fn new(code: i32, message: impl Into<Box<str>>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The native error code.
    #[inline]
    pub const fn code(&self) -> i32 {
        self.code
    }

    /// The message text.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

// ============================================================================
// Platform Error
// ============================================================================

/// A native platform error, ready to be returned as `Err`.
///
/// Constructors without an explicit context use the process-wide instance
/// ([`PlatformErrors::global`]) and share its fatal startup behavior.
///
/// # Example
///
/// ```rust
/// use platform_errors::PlatformError;
///
/// fn open_device() -> Result<(), PlatformError> {
///     Err(PlatformError::with_message(19, "no such device"))
/// }
///
/// let err = open_device().unwrap_err();
/// assert_eq!(err.code(), 19);
/// assert_eq!(err.to_string(), "no such device");
/// ```
#[derive(Clone)]
#[must_use = "errors should be handled or returned"]
pub struct PlatformError {
    record: Arc<ErrorRecord>,
}

impl PlatformError {
    /// Cached error for `code`, from the process-wide context.
    ///
    /// # Panics
    ///
    /// If the process-wide context cannot be initialized.
    pub fn from_code(code: i32) -> Self {
        PlatformErrors::global().from_code(code).into()
    }

    /// Uncached error for `code`, from the process-wide context.
    ///
    /// Looks the message up again on every call.
    ///
    /// # Panics
    ///
    /// If the process-wide context cannot be initialized.
    pub fn new(code: i32) -> Self {
        PlatformErrors::global().record(code).into()
    }

    /// Error for `code` with a message the caller already knows. No lookup.
    pub fn with_message(code: i32, message: impl Into<Box<str>>) -> Self {
        ErrorRecord::new(code, message).into()
    }

    /// The error that was just reported on `channel`, from the process-wide context.
    ///
    /// # Panics
    ///
    /// If the process-wide context cannot be initialized.
    pub fn intercept(channel: ErrorChannel) -> Self {
        PlatformErrors::global().intercept_error(channel)
    }

    /// The native error code.
    #[inline]
    pub fn code(&self) -> i32 {
        self.record.code()
    }

    /// The message text.
    #[inline]
    pub fn message(&self) -> &str {
        self.record.message()
    }

    /// The shared record behind this error.
    #[inline]
    pub fn record(&self) -> &Arc<ErrorRecord> {
        &self.record
    }
}

impl From<Arc<ErrorRecord>> for PlatformError {
    #[inline]
    fn from(record: Arc<ErrorRecord>) -> Self {
        Self { record }
    }
}

impl From<ErrorRecord> for PlatformError {
    #[inline]
    fn from(record: ErrorRecord) -> Self {
        Self {
            record: Arc::new(record),
        }
    }
}

impl fmt::Debug for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformError")
            .field("code", &self.code())
            .field("message", &self.message())
            .finish()
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for PlatformError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_accessors_and_display() {
        let record = ErrorRecord::new(2, "no such file");
        assert_eq!(record.code(), 2);
        assert_eq!(record.message(), "no such file");
        assert_eq!(record.to_string(), "no such file (code 2)");
    }

    #[test]
    fn with_message_skips_lookup() {
        let err = PlatformError::with_message(-1, "custom");
        assert_eq!(err.code(), -1);
        assert_eq!(err.message(), "custom");
        assert_eq!(format!("{}", err), "custom");
    }

    #[test]
    fn clone_shares_record() {
        let err = PlatformError::with_message(4, "interrupted");
        let copy = err.clone();
        assert!(Arc::ptr_eq(err.record(), copy.record()));
    }

    #[test]
    fn works_as_boxed_error() {
        fn fails() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            let result: Result<(), PlatformError> =
                Err(PlatformError::with_message(13, "permission denied"));
            result?;
            Ok(())
        }

        let err = fails().unwrap_err();
        assert_eq!(err.to_string(), "permission denied");
        let platform = err.downcast_ref::<PlatformError>().expect("platform error");
        assert_eq!(platform.code(), 13);
    }

    #[test]
    fn debug_shows_code_and_message() {
        let err = PlatformError::with_message(2, "no such file");
        let debug = format!("{:?}", err);
        assert!(debug.contains("code: 2"));
        assert!(debug.contains("no such file"));
    }

    #[test]
    fn channel_from_flag() {
        assert_eq!(ErrorChannel::from_socket_flag(true), ErrorChannel::Socket);
        assert_eq!(ErrorChannel::from_socket_flag(false), ErrorChannel::General);
        assert_eq!(ErrorChannel::default(), ErrorChannel::General);
        assert_eq!(ErrorChannel::Socket.to_string(), "socket");
    }
}
