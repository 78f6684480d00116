use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;

use thiserror::Error;

/// Returned by `Hello` when the host breaks the record contract.
///
/// Hosts that need to tell this apart from a real age of `i32::MIN` should
/// call `addon_hello` instead.
pub const HELLO_CONTRACT_VIOLATION: i32 = i32::MIN;

/// Boundary-contract violations detected at the C entry points.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("args pointer was null")]
    NullArgs,
    #[error("size_bytes was negative ({0})")]
    NegativeSize(i32),
    #[error("size_bytes mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("record name pointer was null")]
    NullName,
    #[error("record callback pointer was null")]
    NullCallback,
    #[error("context handle was null")]
    NullContext,
    #[error("panic while {0}")]
    Panicked(&'static str),
    #[error("{field} has no variant {value}")]
    InvalidEnum { field: &'static str, value: u32 },
    #[error("invalid log filter `{filter}`: {reason}")]
    InvalidLogFilter { filter: String, reason: String },
    #[error("logging already initialized by another logger")]
    LoggerTaken,
}

/// Opaque error type for C callers.
#[allow(non_camel_case_types)]
#[repr(C)]
pub struct addon_error_t;

struct ErrorHandle {
    message: CString,
}

pub(crate) fn cstring_from_str_lossy(value: &str) -> CString {
    if value.as_bytes().contains(&0) {
        CString::new(value.replace('\0', " ")).unwrap_or_default()
    } else {
        CString::new(value).unwrap_or_default()
    }
}

pub(crate) fn clear_error(out_error: *mut *mut addon_error_t) {
    if !out_error.is_null() {
        // Safety: caller provided a valid out_error pointer.
        unsafe {
            *out_error = ptr::null_mut();
        }
    }
}

pub(crate) fn write_error(out_error: *mut *mut addon_error_t, message: impl Into<String>) {
    if out_error.is_null() {
        return;
    }
    let cstring = cstring_from_str_lossy(&message.into());
    let handle = Box::new(ErrorHandle { message: cstring });
    // Safety: out_error is non-null and points to writable memory.
    unsafe {
        *out_error = Box::into_raw(handle) as *mut addon_error_t;
    }
}

/// Returns the message for an error allocated by the bridge.
///
/// The returned pointer is valid as long as the error handle is alive.
#[unsafe(no_mangle)]
pub extern "C" fn addon_error_message(error: *const addon_error_t) -> *const c_char {
    if error.is_null() {
        return ptr::null();
    }
    // Safety: error must be a valid handle allocated by the bridge.
    let handle = unsafe { &*(error as *const ErrorHandle) };
    handle.message.as_ptr()
}

/// Frees an error returned by the bridge.
#[unsafe(no_mangle)]
pub extern "C" fn addon_error_free(error: *mut addon_error_t) {
    if error.is_null() {
        return;
    }
    // Safety: error must be a valid handle allocated by the bridge.
    unsafe {
        drop(Box::from_raw(error as *mut ErrorHandle));
    }
}
