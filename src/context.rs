//! Bridge contexts: dispatch configuration, the retained callback slot and
//! the tick counter, plus their C handles.

use std::os::raw::c_void;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use crate::callback::CallbackHandle;
use crate::config::{Config, DispatchMode, addon_config_t, config_from_ptr};
use crate::error::{BridgeError, addon_error_t, clear_error, write_error};
use crate::ffi::catch_panic;
use crate::logging;
use crate::record::{Record, read_record};

/// Message passed to the host callback in immediate mode.
pub const GREETING: &str = "8======D hehe";

/// Receives decoded records. Lets callers observe `Hello` without capturing
/// process output.
pub trait Diagnostics: Send + Sync {
    fn record_decoded(&self, record: &Record);
}

/// Writes `Name:` and `Age:` lines through the `log` facade.
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn record_decoded(&self, record: &Record) {
        log::info!("Name: {}", record.name);
        log::info!("Age: {}", record.age);
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CallbackState {
    NoCallback,
    Retained,
}

pub struct BridgeContext {
    config: RwLock<Config>,
    retained: Mutex<Option<CallbackHandle>>,
    ticks: AtomicU64,
    diagnostics: Box<dyn Diagnostics>,
}

impl BridgeContext {
    pub fn new(config: Config) -> Self {
        Self::with_diagnostics(config, Box::new(LogDiagnostics))
    }

    pub fn with_diagnostics(config: Config, diagnostics: Box<dyn Diagnostics>) -> Self {
        Self {
            config: RwLock::new(config),
            retained: Mutex::new(None),
            ticks: AtomicU64::new(0),
            diagnostics,
        }
    }

    pub fn config(&self) -> Config {
        *self.config.read().unwrap_or_else(|err| err.into_inner())
    }

    /// Replaces the configuration. A retained callback is kept.
    pub fn set_config(&self, config: Config) {
        *self.config.write().unwrap_or_else(|err| err.into_inner()) = config;
    }

    /// Decodes the record at `args`, reports it and dispatches its callback.
    ///
    /// Returns the record's age. On error nothing is dispatched and any
    /// retained callback is left as it was.
    ///
    /// # Safety
    ///
    /// A non-null `args` must point to a readable `addon_record_t` with a
    /// NUL-terminated `name`. In deferred mode the callback must remain
    /// callable for as long as this context may use it.
    pub unsafe fn hello(&self, args: *const c_void, size_bytes: i32) -> Result<i32, BridgeError> {
        let config = self.config();
        // Safety: upheld by the caller.
        let record = unsafe { read_record(args, size_bytes, config.size_policy) }?;
        self.diagnostics.record_decoded(&record);
        self.dispatch(config.dispatch, record.callback);
        Ok(record.age)
    }

    fn dispatch(&self, mode: DispatchMode, callback: CallbackHandle) {
        match mode {
            DispatchMode::Immediate => callback.invoke(GREETING),
            DispatchMode::Deferred => {
                let previous = self
                    .retained
                    .lock()
                    .unwrap_or_else(|err| err.into_inner())
                    .replace(callback);
                if let Some(previous) = previous {
                    log::debug!("replacing retained callback {previous:?} with {callback:?}");
                } else {
                    log::debug!("retained callback {callback:?}");
                }
            }
        }
    }

    /// Host tick. Counts the tick; the retained callback is not invoked.
    pub fn update(&self) {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        log::trace!("update tick {tick} ({:?})", self.state());
    }

    pub fn state(&self) -> CallbackState {
        match self.retained_callback() {
            Some(_) => CallbackState::Retained,
            None => CallbackState::NoCallback,
        }
    }

    pub fn retained_callback(&self) -> Option<CallbackHandle> {
        *self.retained.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Moves the context behind a C handle, to be released with
    /// `addon_context_free`.
    pub fn into_handle(self) -> *mut addon_context_t {
        Box::into_raw(Box::new(self)) as *mut addon_context_t
    }
}

impl Default for BridgeContext {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

/// Opaque context handle for C callers.
#[allow(non_camel_case_types)]
#[repr(C)]
pub struct addon_context_t;

pub(crate) fn context_from_handle<'a>(
    context: *const addon_context_t,
) -> Option<&'a BridgeContext> {
    // Safety: a non-null context must be a valid handle allocated by the bridge.
    unsafe { (context as *const BridgeContext).as_ref() }
}

/// Runs `Hello` against `context`, logging and returning any contract violation.
///
/// # Safety
///
/// Same contract as [`BridgeContext::hello`].
pub(crate) unsafe fn guarded_hello(
    context: &BridgeContext,
    args: *const c_void,
    size_bytes: i32,
) -> Result<i32, BridgeError> {
    logging::init_default();
    // Safety: upheld by the caller.
    let result = catch_panic("handling Hello", || unsafe { context.hello(args, size_bytes) });
    if let Err(err) = &result {
        log::warn!("rejected Hello call: {err}");
    }
    result
}

/// Creates a context. A null `config` selects the defaults.
///
/// Returns null and sets `out_error` if `config` holds an unknown dispatch
/// mode or size policy. The returned handle must be released with
/// `addon_context_free`.
#[unsafe(no_mangle)]
pub extern "C" fn addon_context_create(
    config: *const addon_config_t,
    out_error: *mut *mut addon_error_t,
) -> *mut addon_context_t {
    clear_error(out_error);
    logging::init_default();
    // Safety: a non-null config must point to a valid addon_config_t.
    match unsafe { config_from_ptr(config) } {
        Ok(config) => BridgeContext::new(config).into_handle(),
        Err(err) => {
            write_error(out_error, err.to_string());
            ptr::null_mut()
        }
    }
}

/// Frees a context handle. Any retained callback is dropped without being called.
#[unsafe(no_mangle)]
pub extern "C" fn addon_context_free(context: *mut addon_context_t) {
    if context.is_null() {
        return;
    }
    // Safety: context must be a valid handle allocated by the bridge.
    unsafe {
        drop(Box::from_raw(context as *mut BridgeContext));
    }
}

/// Decodes the record at `args` and dispatches its callback.
///
/// On success the age is written to `out_age` (if non-null) and `true` is
/// returned. In deferred mode the callback pointer is kept past this call,
/// so the host must keep it callable until the context is freed or another
/// callback replaces it.
#[unsafe(no_mangle)]
pub extern "C" fn addon_hello(
    context: *const addon_context_t,
    args: *const c_void,
    size_bytes: i32,
    out_age: *mut i32,
    out_error: *mut *mut addon_error_t,
) -> bool {
    clear_error(out_error);
    let Some(context) = context_from_handle(context) else {
        write_error(out_error, BridgeError::NullContext.to_string());
        return false;
    };

    // Safety: the host guarantees the record contract documented above.
    match unsafe { guarded_hello(context, args, size_bytes) } {
        Ok(age) => {
            if !out_age.is_null() {
                // Safety: out_age is non-null and points to writable memory.
                unsafe {
                    *out_age = age;
                }
            }
            true
        }
        Err(err) => {
            write_error(out_error, err.to_string());
            false
        }
    }
}

/// Advances `context` by one tick. A null context is ignored.
#[unsafe(no_mangle)]
pub extern "C" fn addon_update(context: *const addon_context_t) {
    if let Some(context) = context_from_handle(context) {
        context.update();
    }
}

/// Returns whether `context` currently retains a host callback.
#[unsafe(no_mangle)]
pub extern "C" fn addon_context_has_callback(context: *const addon_context_t) -> bool {
    context_from_handle(context).is_some_and(|context| context.state() == CallbackState::Retained)
}

/// Returns how many times `addon_update` ran on `context`, or 0 for null.
#[unsafe(no_mangle)]
pub extern "C" fn addon_context_tick_count(context: *const addon_context_t) -> u64 {
    context_from_handle(context).map_or(0, BridgeContext::tick_count)
}
