//! FFI bindings for Affect Guard
//!
//! C-compatible functions for driving a `Guardian` from other languages.
//! Structured values cross the boundary as JSON in null-terminated strings.
//! Returned strings are allocated here and must be freed with
//! `guard_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::GuardConfig;
use crate::error::GuardError;
use crate::keystroke::KeystrokeSample;
use crate::pipeline::{AuthRequest, Guardian, SimulationParams};
use crate::types::AlertLevel;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

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

/// Like `cstr_to_string`, recording an error when the pointer is unusable
unsafe fn required_string(ptr: *const c_char, what: &str) -> Option<String> {
    let value = cstr_to_string(ptr);
    if value.is_none() {
        set_last_error(&format!("Invalid {} string pointer", what));
    }
    value
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn json_result<T: serde::Serialize>(value: Result<T, GuardError>) -> *mut c_char {
    match value.and_then(|v| Ok(serde_json::to_string(&v)?)) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

unsafe fn handle_ref<'a>(handle: *const GuardHandle) -> Option<&'a Guardian> {
    if handle.is_null() {
        set_last_error("Null guardian pointer");
        return None;
    }
    Some(&(*handle).guardian)
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Opaque handle to a Guardian
pub struct GuardHandle {
    guardian: Guardian,
}

/// Create a Guardian.
///
/// # Safety
/// - `config_json` is a null-terminated JSON `GuardConfig`, or NULL for defaults.
/// - Returns a pointer that must be freed with `guard_free`.
/// - Returns NULL on error; call `guard_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn guard_new(config_json: *const c_char) -> *mut GuardHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        Ok(GuardConfig::default())
    } else {
        match required_string(config_json, "config") {
            Some(json) => GuardConfig::from_json(&json),
            None => return ptr::null_mut(),
        }
    };

    match config.and_then(Guardian::new) {
        Ok(guardian) => Box::into_raw(Box::new(GuardHandle { guardian })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a Guardian.
///
/// # Safety
/// - `handle` must be a pointer returned by `guard_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn guard_free(handle: *mut GuardHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

// ============================================================================
// Enrollment and authentication
// ============================================================================

/// Enroll keystroke samples, optionally registering a secret.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `guard_new`.
/// - `identity_id` and `samples_json` (JSON array of samples) must be valid
///   null-terminated C strings; `secret` may be NULL.
/// - Returns the enrollment outcome as JSON, to be freed with `guard_free_string`.
/// - Returns NULL on error; call `guard_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn guard_enroll_json(
    handle: *const GuardHandle,
    identity_id: *const c_char,
    samples_json: *const c_char,
    secret: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(guardian) = handle_ref(handle) else {
        return ptr::null_mut();
    };
    let Some(identity_id) = required_string(identity_id, "identity_id") else {
        return ptr::null_mut();
    };
    let Some(samples_json) = required_string(samples_json, "samples JSON") else {
        return ptr::null_mut();
    };
    let secret = cstr_to_string(secret);

    json_result(
        serde_json::from_str::<Vec<KeystrokeSample>>(&samples_json)
            .map_err(GuardError::from)
            .and_then(|samples| {
                guardian.enroll_with_secret(&identity_id, &samples, secret.as_deref())
            }),
    )
}

/// Authenticate one attempt.
///
/// An attempt that cannot be evaluated still yields a (fail-closed) outcome;
/// NULL is returned only when the request itself is not valid JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `guard_new`.
/// - `request_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `guard_free_string`.
#[no_mangle]
pub unsafe extern "C" fn guard_authenticate_json(
    handle: *const GuardHandle,
    request_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(guardian) = handle_ref(handle) else {
        return ptr::null_mut();
    };
    let Some(json) = required_string(request_json, "request JSON") else {
        return ptr::null_mut();
    };

    json_result(
        serde_json::from_str::<AuthRequest>(&json)
            .map_err(GuardError::from)
            .map(|request| guardian.authenticate(&request)),
    )
}

/// Fuse a synthetic scenario.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `guard_new`.
/// - `params_json` is a null-terminated JSON object, or NULL for defaults.
/// - Returns a newly allocated string that must be freed with `guard_free_string`.
#[no_mangle]
pub unsafe extern "C" fn guard_simulate_json(
    handle: *const GuardHandle,
    params_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(guardian) = handle_ref(handle) else {
        return ptr::null_mut();
    };
    let params = match cstr_to_string(params_json) {
        Some(json) => match serde_json::from_str::<SimulationParams>(&json) {
            Ok(params) => params,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        },
        None => SimulationParams::default(),
    };

    json_result(guardian.simulate(&params))
}

// ============================================================================
// Alerts
// ============================================================================

/// List alerts, newest first.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `guard_new`.
/// - `level` is a null-terminated level name (`low`, `medium`, `high`,
///   `critical`), or NULL for all levels.
/// - Returns a JSON array that must be freed with `guard_free_string`.
#[no_mangle]
pub unsafe extern "C" fn guard_list_alerts_json(
    handle: *const GuardHandle,
    level: *const c_char,
    limit: u32,
    offset: u32,
) -> *mut c_char {
    clear_last_error();

    let Some(guardian) = handle_ref(handle) else {
        return ptr::null_mut();
    };
    let level = match cstr_to_string(level) {
        Some(name) => match AlertLevel::parse(&name) {
            Some(level) => Some(level),
            None => {
                set_last_error(&format!("Unknown alert level '{}'", name));
                return ptr::null_mut();
            }
        },
        None => None,
    };

    json_result(Ok(guardian.list_alerts(
        level,
        limit as usize,
        offset as usize,
    )))
}

fn status_code(result: Result<crate::types::Alert, GuardError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e @ GuardError::NotFound(_)) => {
            set_last_error(&e.to_string());
            1
        }
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Acknowledge an alert.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `guard_new`.
/// - Returns 0 on success, 1 if the alert does not exist, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn guard_acknowledge_alert(handle: *const GuardHandle, alert_id: u64) -> i32 {
    clear_last_error();

    match handle_ref(handle) {
        Some(guardian) => status_code(guardian.acknowledge_alert(alert_id)),
        None => -1,
    }
}

/// Resolve an alert.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `guard_new`.
/// - `note` is a null-terminated C string, or NULL.
/// - Returns 0 on success, 1 if the alert does not exist, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn guard_resolve_alert(
    handle: *const GuardHandle,
    alert_id: u64,
    note: *const c_char,
) -> i32 {
    clear_last_error();

    match handle_ref(handle) {
        Some(guardian) => status_code(guardian.resolve_alert(alert_id, cstr_to_string(note))),
        None => -1,
    }
}

/// Alert counts as JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `guard_new`.
/// - Returns a newly allocated string that must be freed with `guard_free_string`.
#[no_mangle]
pub unsafe extern "C" fn guard_alert_statistics_json(handle: *const GuardHandle) -> *mut c_char {
    clear_last_error();

    match handle_ref(handle) {
        Some(guardian) => json_result(Ok(guardian.alert_statistics())),
        None => ptr::null_mut(),
    }
}

// ============================================================================
// Persistence
// ============================================================================

/// Save templates, credentials, alerts and attempts to JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `guard_new`.
/// - Returns a newly allocated string that must be freed with `guard_free_string`.
/// - Returns NULL on error; call `guard_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn guard_save_state(handle: *const GuardHandle) -> *mut c_char {
    clear_last_error();

    let Some(guardian) = handle_ref(handle) else {
        return ptr::null_mut();
    };

    match guardian.save_state() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Replace all state with a snapshot from `guard_save_state`.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `guard_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn guard_load_state(handle: *const GuardHandle, json: *const c_char) -> i32 {
    clear_last_error();

    let Some(guardian) = handle_ref(handle) else {
        return -1;
    };
    let Some(json) = required_string(json, "state JSON") else {
        return -1;
    };

    match guardian.load_state(&json) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by a `guard_*` function.
///
/// # Safety
/// - `ptr` must be a pointer returned by a `guard_*` function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn guard_free_string(ptr: *mut c_char) {
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
/// - The pointer is valid until the next `guard_*` call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn guard_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn guard_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
