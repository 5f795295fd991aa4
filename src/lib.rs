//! # Platform Errors
//!
//! Typed, cached error values for a native library that reports failures as
//! integer codes and optionally-allocated message strings.
//!
//! ## Design Philosophy
//!
//! 1. **One record per code**: messages are looked up once and shared
//! 2. **Never fail on unknown codes**: a deterministic fallback message is used
//! 3. **Native buffers never escape**: text is copied out before any release
//! 4. **Release exactly as the library says**: the policy is read once, then fixed
//! 5. **Startup is the only fatal point**: a library missing its entry points
//!    cannot be used at all
//!
//! ## The Native Contract
//!
//! The library exports five C functions: `GetErrorCode`,
//! `GetSocketErrorCode`, `TryGetErrorMessage`, `ShouldDeleteErrorMessage` and
//! `DeleteErrorMessage`. Depending on `ShouldDeleteErrorMessage`, buffers from
//! `TryGetErrorMessage` are either owned by the caller (release exactly once)
//! or managed by the library (never release). See [`buffer`] and [`gate`].
//!
//! ## Quick Start
//!
//! ```rust
//! use platform_errors::{Config, ErrorChannel, PlatformErrors, testing::ScriptedSource};
//! use std::sync::Arc;
//!
//! // In production the source is the loaded library (`PlatformErrors::global()`).
//! let source = ScriptedSource::new()
//!     .with_message(2, "no such file")
//!     .with_socket_code(111)
//!     .releasing(true);
//! let errors = PlatformErrors::new(source, &Config::default());
//!
//! let first = errors.from_code(2);
//! assert_eq!(first.message(), "no such file");
//! assert!(Arc::ptr_eq(&first, &errors.from_code(2)));
//!
//! let socket = errors.intercept(ErrorChannel::Socket);
//! assert_eq!(socket.code(), 111);
//! assert_eq!(socket.message(), "No system message found for code 111.");
//! ```
//!
//! ## Returning Errors
//!
//! ```rust,no_run
//! use platform_errors::{ErrorChannel, PlatformError};
//!
//! # fn native_open() -> i32 { -1 }
//! fn open() -> Result<(), PlatformError> {
//!     if native_open() < 0 {
//!         return Err(PlatformError::intercept(ErrorChannel::General));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `dynamic` (default): load the library at runtime with `libloading`.
//!   Without it, hosts install a context built from the `unsafe`
//!   [`EntryPoints::from_fns`] over statically linked exports.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod cache;
pub mod context;
pub mod definitions;
pub mod gate;
pub mod logging;
pub mod models;
pub mod native;
pub mod ring_buffer;
pub mod testing;

pub use buffer::Ownership;
pub use cache::ErrorCache;
pub use context::*;
pub use definitions::*;
pub use gate::ReleaseGate;
pub use logging::*;
pub use models::*;
pub use native::{EntryPoints, ErrorSource, ResolveError, symbols};
#[cfg(feature = "dynamic")]
pub use native::NativeLibrary;
pub use ring_buffer::RetrievalLog;

/// Result with [`PlatformError`] as the error type.
pub type Result<T> = std::result::Result<T, PlatformError>;
