//! Process-wide context tying the native library, release gate and cache together.
//!
//! # Architecture
//!
//! ```text
//! from_code(code) ──► ErrorCache ──hit──► Arc<ErrorRecord>
//!                        │ miss
//!                        ▼
//! get_message(code) ──► ErrorSource::try_error_message
//!                        │ Some(ptr)                  │ None
//!                        ▼                            ▼
//!                  NativeBuffer (ownership      FallbackMessages
//!                  from ReleaseGate)
//!                        │ copy, then release iff Owned
//!                        ▼
//!                  String ──► RetrievalLog
//! ```
//!
//! # Initialization
//!
//! [`PlatformErrors::new`] asks the source for its release policy exactly
//! once and opens the gate before the context is returned, so no reader can
//! observe the gate mid-transition.
//!
//! The process-wide instance is created at most once. Creation is serialized,
//! so the library is resolved and the policy is queried once even when many
//! threads race on first use. A missing library or entry point is fatal for
//! [`PlatformErrors::global`]; [`PlatformErrors::init`] reports it instead.
//!
//! Contexts can also be built directly around any [`ErrorSource`], which is how
//! the crate is tested without a native library.

use crate::buffer::NativeBuffer;
use crate::cache::ErrorCache;
use crate::definitions::FallbackMessages;
use crate::gate::ReleaseGate;
use crate::logging::{RetrievalEntry, RetrievalOutcome};
use crate::models::{ErrorChannel, ErrorRecord, PlatformError};
use crate::native::{ErrorSource, ResolveError};
use crate::ring_buffer::RetrievalLog;
use std::ffi::OsString;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Environment variable overriding the library path in [`Config::from_env`].
pub const LIBRARY_ENV_VAR: &str = "PLATFORM_ERRORS_LIBRARY";

/// Default retrieval log capacity.
pub const DEFAULT_LOG_CAPACITY: usize = 256;

static GLOBAL: OnceLock<PlatformErrors> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

// ============================================================================
// Configuration
// ============================================================================

/// Runtime configuration for a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    library: OsString,
    fallback: FallbackMessages,
    log_capacity: usize,
}

impl Config {
    /// Defaults, with the library path taken from [`LIBRARY_ENV_VAR`] when set.
    pub fn from_env() -> Self {
        let config = Self::default();
        match std::env::var_os(LIBRARY_ENV_VAR) {
            Some(library) if !library.is_empty() => config.with_library(library),
            _ => config,
        }
    }

    /// Path or name of the shared library to load.
    pub fn with_library(mut self, library: impl Into<OsString>) -> Self {
        self.library = library.into();
        self
    }

    /// Fallback template for codes without a native message.
    pub fn with_fallback(mut self, fallback: FallbackMessages) -> Self {
        self.fallback = fallback;
        self
    }

    /// Retrieval log capacity. Zero turns the log off, so retrievals never
    /// contend on it.
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    /// Library path or name.
    #[inline]
    pub fn library(&self) -> &OsString {
        &self.library
    }

    /// Fallback template.
    #[inline]
    pub fn fallback(&self) -> &FallbackMessages {
        &self.fallback
    }

    /// Retrieval log capacity as configured.
    #[inline]
    pub fn log_capacity(&self) -> usize {
        self.log_capacity
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            library: default_library_name(),
            fallback: FallbackMessages::default(),
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

#[cfg(feature = "dynamic")]
fn default_library_name() -> OsString {
    libloading::library_filename(crate::native::LIBRARY_NAME)
}

#[cfg(not(feature = "dynamic"))]
fn default_library_name() -> OsString {
    OsString::from(crate::native::LIBRARY_NAME)
}

// ============================================================================
// Initialization Errors
// ============================================================================

/// Failure to set up the process-wide context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    /// The native library could not be bound.
    Resolve(ResolveError),
    /// A process-wide context already exists.
    AlreadyInitialized,
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve(err) => write!(f, "platform error library unavailable: {}", err),
            Self::AlreadyInitialized => f.write_str("platform error context already initialized"),
        }
    }
}

impl std::error::Error for InitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Resolve(err) => Some(err),
            Self::AlreadyInitialized => None,
        }
    }
}

impl From<ResolveError> for InitError {
    fn from(err: ResolveError) -> Self {
        Self::Resolve(err)
    }
}

// ============================================================================
// Context
// ============================================================================

/// Translates native error codes into cached error records.
pub struct PlatformErrors {
    source: Box<dyn ErrorSource>,
    gate: ReleaseGate,
    cache: ErrorCache,
    fallback: FallbackMessages,
    log: RetrievalLog,
}

impl PlatformErrors {
    /// Context over `source`.
    ///
    /// Queries the release policy once; the answer holds for the life of the
    /// context.
    pub fn new(source: impl ErrorSource + 'static, config: &Config) -> Self {
        let gate = ReleaseGate::from_policy(source.should_delete_error_message());
        Self {
            source: Box::new(source),
            gate,
            cache: ErrorCache::new(),
            fallback: config.fallback.clone(),
            log: RetrievalLog::new(config.log_capacity),
        }
    }

    /// Context over the shared library named in `config`.
    ///
    /// # Errors
    ///
    /// Any [`ResolveError`] from opening the library or binding its exports.
    #[cfg(feature = "dynamic")]
    pub fn load(config: &Config) -> Result<Self, ResolveError> {
        let library = crate::native::NativeLibrary::open(&config.library)?;
        Ok(Self::new(library, config))
    }

    /// Make this context the process-wide instance.
    ///
    /// # Errors
    ///
    /// [`InitError::AlreadyInitialized`] if an instance exists; `self` is
    /// dropped in that case.
    pub fn install(self) -> Result<&'static Self, InitError> {
        let _guard = INIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        if GLOBAL.get().is_some() {
            return Err(InitError::AlreadyInitialized);
        }
        Ok(GLOBAL.get_or_init(|| self))
    }

    /// The process-wide instance, loading it from `config` if none exists yet.
    ///
    /// # Errors
    ///
    /// [`InitError::Resolve`] if the library cannot be bound. Nothing is
    /// installed in that case and a later call may try again.
    #[cfg(feature = "dynamic")]
    pub fn init(config: &Config) -> Result<&'static Self, InitError> {
        let _guard = INIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = GLOBAL.get() {
            return Ok(existing);
        }
        let context = Self::load(config)?;
        Ok(GLOBAL.get_or_init(|| context))
    }

    /// The process-wide instance, if one exists.
    #[inline]
    pub fn try_global() -> Option<&'static Self> {
        GLOBAL.get()
    }

    /// The process-wide instance, loaded from [`Config::from_env`] on first use.
    ///
    /// # Panics
    ///
    /// If the library cannot be bound. The crate has no way to operate
    /// without its five entry points, so this is treated as a startup failure.
    #[cfg(feature = "dynamic")]
    pub fn global() -> &'static Self {
        if let Some(context) = GLOBAL.get() {
            return context;
        }
        match Self::init(&Config::from_env()) {
            Ok(context) => context,
            Err(err) => panic!("{}", err),
        }
    }

    /// The process-wide instance installed with [`install`](Self::install).
    ///
    /// # Panics
    ///
    /// If no instance was installed.
    #[cfg(not(feature = "dynamic"))]
    pub fn global() -> &'static Self {
        match GLOBAL.get() {
            Some(context) => context,
            None => panic!("platform error context not installed"),
        }
    }

    /// Cached record for `code`, built on first request.
    ///
    /// Every call for the same code returns the same `Arc`.
    pub fn from_code(&self, code: i32) -> Arc<ErrorRecord> {
        self.cache.get_or_insert_with(code, || self.record(code))
    }

    /// Uncached record for `code`.
    pub fn record(&self, code: i32) -> ErrorRecord {
        ErrorRecord::new(code, self.get_message(code))
    }

    /// Message for `code`, without touching the cache.
    ///
    /// Never fails: codes the library cannot describe get the fallback text.
    pub fn get_message(&self, code: i32) -> String {
        self.retrieve(code, None)
    }

    /// Read the current code on `channel` and resolve its message.
    ///
    /// Meant to be called right after a failing native call, before anything
    /// else can overwrite the library's error state. The result is not cached.
    pub fn intercept(&self, channel: ErrorChannel) -> ErrorRecord {
        let code = match channel {
            ErrorChannel::General => self.source.error_code(),
            ErrorChannel::Socket => self.source.socket_error_code(),
        };
        ErrorRecord::new(code, self.retrieve(code, Some(channel)))
    }

    /// [`intercept`](Self::intercept) wrapped as an error value.
    pub fn intercept_error(&self, channel: ErrorChannel) -> PlatformError {
        self.intercept(channel).into()
    }

    /// Cached record for `code`, if one was built.
    #[inline]
    pub fn cached(&self, code: i32) -> Option<Arc<ErrorRecord>> {
        self.cache.get(code)
    }

    /// Number of cached codes.
    #[inline]
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// The release gate, fixed at construction.
    #[inline]
    pub fn release_gate(&self) -> &ReleaseGate {
        &self.gate
    }

    /// Log of message retrievals.
    #[inline]
    pub fn retrieval_log(&self) -> &RetrievalLog {
        &self.log
    }

    /// Fallback template in use.
    #[inline]
    pub fn fallback(&self) -> &FallbackMessages {
        &self.fallback
    }

    fn retrieve(&self, code: i32, channel: Option<ErrorChannel>) -> String {
        let (message, outcome) = match self.source.try_error_message(code) {
            Some(ptr) => {
                // SAFETY: `ptr` was just returned by this source and not yet
                // released; the gate was settled from this source's policy in
                // `new` and never changes afterwards.
                let buffer = unsafe { NativeBuffer::new(self.source.as_ref(), &self.gate, ptr) };
                let (message, released) = buffer.into_message();
                (message, RetrievalOutcome::Native { released })
            }
            None => (self.fallback.format(code), RetrievalOutcome::Fallback),
        };

        self.log.record(RetrievalEntry::new(code, channel, outcome, message.len()));
        message
    }
}

impl fmt::Debug for PlatformErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformErrors")
            .field("gate", &self.gate)
            .field("cached", &self.cache.len())
            .field("fallback", &self.fallback)
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}
