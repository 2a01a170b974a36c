//! FFI bindings for Playsense
//!
//! This module provides C-compatible functions for driving a play session from
//! the host app's runtime. All functions use C strings (null-terminated) and
//! return allocated memory that must be freed by the caller using
//! `playsense_free_string`.

use chrono::{DateTime, TimeZone, Utc};
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::EngineConfig;
use crate::difficulty::{recommend, DifficultySample};
use crate::session::{EventBuffer, PlaySession};
use crate::types::{EngineEvent, SessionInput};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

fn events_to_json(events: &[EngineEvent]) -> *mut c_char {
    match serde_json::to_string(events) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Recommend a difficulty change for a performance sample.
///
/// Input JSON: `{"success_rate": 0-100, "mean_time_seconds": f, "mean_attempts": f}`.
/// Output: `"raise"`, `"hold"` or `"lower"` as a JSON string.
///
/// # Safety
/// - `sample_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `playsense_free_string`.
/// - Returns NULL on error; call `playsense_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn playsense_recommend_difficulty(sample_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(sample_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    let sample: DifficultySample = match serde_json::from_str(&json_str) {
        Ok(sample) => sample,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    match serde_json::to_string(&recommend(&sample)) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Session API
// ============================================================================

/// Opaque handle to a PlaySession
pub struct PlaySessionHandle {
    session: PlaySession,
    events: EventBuffer,
}

/// Create a new session.
///
/// # Safety
/// - `config_json` may be NULL for the default configuration; otherwise it must
///   be a valid null-terminated C string holding an `EngineConfig` JSON document.
/// - `started_at_ms` is the activity start in Unix milliseconds.
/// - Returns a pointer that must be freed with `playsense_session_free`.
/// - Returns NULL on error; call `playsense_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn playsense_session_new(
    config_json: *const c_char,
    started_at_ms: i64,
) -> *mut PlaySessionHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        EngineConfig::default()
    } else {
        let json_str = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match EngineConfig::from_json_str(&json_str) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    let Some(started_at) = millis_to_utc(started_at_ms) else {
        set_last_error("Invalid start timestamp");
        return ptr::null_mut();
    };

    let events = EventBuffer::new();
    match PlaySession::new(config, started_at) {
        Ok(session) => {
            let session = session.with_presentation(Box::new(events.clone()));
            Box::into_raw(Box::new(PlaySessionHandle { session, events }))
        }
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a session.
///
/// # Safety
/// - `session` must be a valid pointer returned by `playsense_session_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn playsense_session_free(session: *mut PlaySessionHandle) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

/// Feed one input event and return the events it produced.
///
/// Input JSON is a tagged `SessionInput`, e.g.
/// `{"type": "down", "x": 10, "y": 20, "at": "2024-01-15T14:00:00Z"}`.
/// Output is a JSON array of engine events (feedback, suggestion, difficulty).
/// Malformed coordinates are absorbed and yield an empty array.
///
/// # Safety
/// - `session` must be a valid pointer returned by `playsense_session_new`.
/// - `input_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `playsense_free_string`.
/// - Returns NULL on error; call `playsense_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn playsense_session_input(
    session: *mut PlaySessionHandle,
    input_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = &mut *session;

    let json_str = match cstr_to_string(input_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    let input: SessionInput = match serde_json::from_str(&json_str) {
        Ok(input) => input,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    handle.session.process(input);
    events_to_json(&handle.events.drain())
}

/// Run an evaluation cycle now from local metrics and return the events it produced.
///
/// # Safety
/// - `session` must be a valid pointer returned by `playsense_session_new`.
/// - `now_ms` is the evaluation instant in Unix milliseconds.
/// - Returns a newly allocated string that must be freed with `playsense_free_string`.
/// - Returns NULL on error; call `playsense_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn playsense_session_evaluate(
    session: *mut PlaySessionHandle,
    now_ms: i64,
) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = &mut *session;

    let Some(now) = millis_to_utc(now_ms) else {
        set_last_error("Invalid evaluation timestamp");
        return ptr::null_mut();
    };

    handle.session.evaluate_local(now);
    events_to_json(&handle.events.drain())
}

/// Tear the session down. Later input is ignored.
///
/// # Safety
/// - `session` must be a valid pointer returned by `playsense_session_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn playsense_session_teardown(session: *mut PlaySessionHandle) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }

    let handle = &mut *session;
    handle.session.teardown();
    handle.events.drain();
    0
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Playsense functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Playsense function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn playsense_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Playsense function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn playsense_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the Playsense library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn playsense_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
