//! End-to-end scenarios against real `extern "C"` entry points.
//!
//! The functions below stand in for the exports of the platform library and
//! are bound through the same name-based resolution used for a loaded shared
//! library. The release policy is "caller frees", so every issued buffer must
//! come back through `DeleteErrorMessage` exactly once.

use platform_errors::{
    Config, EntryPoints, ErrorChannel, InitError, PlatformError, PlatformErrors, ResolveError,
    symbols, testing::ScriptedSource,
};
use std::collections::HashSet;
use std::ffi::{CString, c_char, c_void};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

// ============================================================================
// NATIVE STAND-IN
// ============================================================================

static ISSUED: AtomicUsize = AtomicUsize::new(0);
static DELETED: AtomicUsize = AtomicUsize::new(0);
static BAD_DELETES: AtomicUsize = AtomicUsize::new(0);
static LIVE: Mutex<Option<HashSet<usize>>> = Mutex::new(None);

extern "C" fn get_error_code() -> i32 {
    5
}

extern "C" fn get_socket_error_code() -> i32 {
    111
}

extern "C" fn try_get_error_message(code: i32, out: *mut *mut c_char) -> bool {
    let text = match code {
        2 => "no such file",
        5 => "input/output error",
        111 => "connection refused",
        _ => return false,
    };
    let raw = CString::new(text).expect("no interior nul").into_raw();
    LIVE
        .lock()
        .unwrap()
        .get_or_insert_with(HashSet::new)
        .insert(raw as usize);
    ISSUED.fetch_add(1, Ordering::SeqCst);
    unsafe { *out = raw };
    true
}

extern "C" fn should_delete_error_message() -> bool {
    true
}

extern "C" fn delete_error_message(message: *mut c_char) {
    let known = LIVE
        .lock()
        .unwrap()
        .get_or_insert_with(HashSet::new)
        .remove(&(message as usize));
    if known {
        DELETED.fetch_add(1, Ordering::SeqCst);
        drop(unsafe { CString::from_raw(message) });
    } else {
        BAD_DELETES.fetch_add(1, Ordering::SeqCst);
    }
}

fn export(name: &str) -> Option<NonNull<c_void>> {
    let address = match name {
        symbols::GET_ERROR_CODE => get_error_code as *const (),
        symbols::GET_SOCKET_ERROR_CODE => get_socket_error_code as *const (),
        symbols::TRY_GET_ERROR_MESSAGE => try_get_error_message as *const (),
        symbols::SHOULD_DELETE_ERROR_MESSAGE => should_delete_error_message as *const (),
        symbols::DELETE_ERROR_MESSAGE => delete_error_message as *const (),
        _ => return None,
    };
    NonNull::new(address as *mut c_void)
}

fn native_context() -> PlatformErrors {
    let entries = unsafe { EntryPoints::resolve(export) }.expect("all exports present");
    PlatformErrors::new(entries, &Config::default())
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[test]
fn native_lookup_is_cached_and_buffers_released() {
    let errors = native_context();
    assert!(errors.release_gate().is_open());

    let first = errors.from_code(2);
    let second = errors.from_code(2);

    assert_eq!(first.message(), "no such file");
    assert!(Arc::ptr_eq(&first, &second));

    let general = errors.intercept(ErrorChannel::General);
    let socket = errors.intercept(ErrorChannel::Socket);
    assert_eq!((general.code(), general.message()), (5, "input/output error"));
    assert_eq!((socket.code(), socket.message()), (111, "connection refused"));

    assert_eq!(
        errors.get_message(999),
        "No system message found for code 999."
    );

    assert_eq!(DELETED.load(Ordering::SeqCst), ISSUED.load(Ordering::SeqCst));
    assert_eq!(BAD_DELETES.load(Ordering::SeqCst), 0);
}

#[test]
fn missing_exports_fail_resolution() {
    let result = unsafe {
        EntryPoints::resolve(|name| match name {
            symbols::SHOULD_DELETE_ERROR_MESSAGE => None,
            other => export(other),
        })
    };

    match result {
        Err(ResolveError::MissingEntryPoints { names }) => {
            assert_eq!(names.as_slice(), &[symbols::SHOULD_DELETE_ERROR_MESSAGE]);
        }
        other => panic!("expected missing entry points, got {:?}", other),
    }
}

#[test]
fn no_message_code_gets_fallback() {
    let errors = PlatformErrors::new(ScriptedSource::new(), &Config::default());

    let record = errors.from_code(999);
    assert_eq!(record.code(), 999);
    assert_eq!(record.message(), "No system message found for code 999.");
    assert_eq!(errors.get_message(999), record.message());
}

#[test]
fn concurrent_from_code_observes_one_record() {
    let source = ScriptedSource::new()
        .with_message(2, "no such file")
        .releasing(true);
    let errors = Arc::new(PlatformErrors::new(source.clone(), &Config::default()));
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let errors = Arc::clone(&errors);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..50).map(|_| errors.from_code(2)).collect::<Vec<_>>()
            })
        })
        .collect();

    let stored = handles
        .into_iter()
        .flat_map(|h| h.join().expect("thread panicked"))
        .collect::<Vec<_>>();

    let canonical = errors.cached(2).expect("cached");
    assert!(stored.iter().all(|record| Arc::ptr_eq(record, &canonical)));
    assert_eq!(errors.cached_len(), 1);
    assert_eq!(source.messages_deleted(), source.messages_issued());
    assert_eq!(source.invalid_deletes(), 0);
}

#[test]
fn process_wide_context_backs_platform_error() {
    let source = ScriptedSource::new()
        .with_message(2, "no such file")
        .with_general_code(2)
        .with_socket_code(104)
        .with_message(104, "connection reset by peer");

    let installed = PlatformErrors::new(source.clone(), &Config::default())
        .install()
        .expect("first install");
    assert!(std::ptr::eq(
        installed,
        PlatformErrors::try_global().expect("installed")
    ));

    let again = PlatformErrors::new(ScriptedSource::new(), &Config::default()).install();
    assert_eq!(again.unwrap_err(), InitError::AlreadyInitialized);

    let cached = PlatformError::from_code(2);
    assert_eq!(cached.message(), "no such file");
    assert!(Arc::ptr_eq(cached.record(), PlatformError::from_code(2).record()));

    let uncached = PlatformError::new(2);
    assert_eq!(uncached.message(), "no such file");
    assert!(!Arc::ptr_eq(cached.record(), uncached.record()));

    let socket = PlatformError::intercept(ErrorChannel::Socket);
    assert_eq!(socket.code(), 104);
    assert_eq!(socket.to_string(), "connection reset by peer");

    assert_eq!(source.policy_queries(), 1);
}
