//! Shared utilities for the bridge's C FFI surface.

use std::ffi::CStr;
use std::os::raw::c_char;
use std::panic::AssertUnwindSafe;

use crate::error::BridgeError;

/// Reads a host-owned C string up to its first NUL, replacing invalid UTF-8.
///
/// # Safety
///
/// `value` must be non-null and point to a NUL-terminated byte sequence that
/// stays valid for the duration of the call.
pub(crate) unsafe fn read_cstr_lossy(value: *const c_char) -> String {
    // Safety: upheld by the caller.
    let cstr = unsafe { CStr::from_ptr(value) };
    cstr.to_string_lossy().into_owned()
}

pub(crate) fn read_optional_cstr(value: *const c_char) -> Option<String> {
    if value.is_null() {
        return None;
    }
    // Safety: caller guarantees a valid, NUL-terminated C string.
    Some(unsafe { read_cstr_lossy(value) })
}

/// Runs `f`, converting a panic into `BridgeError::Panicked` so it never
/// unwinds into the host.
pub(crate) fn catch_panic<T>(
    action: &'static str,
    f: impl FnOnce() -> Result<T, BridgeError>,
) -> Result<T, BridgeError> {
    std::panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or(Err(BridgeError::Panicked(action)))
}
