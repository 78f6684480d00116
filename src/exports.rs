//! The `Hello` and `Update` entry points a host resolves by name.
//!
//! Both run against a process-default context created on first use from
//! `ADDON_BRIDGE_*` environment variables. Hosts that want to own the
//! context themselves use `addon_context_create` and friends instead.

use std::os::raw::c_void;

use once_cell::sync::Lazy;

use crate::config::{Config, addon_config_t};
use crate::context::{BridgeContext, guarded_hello};
use crate::error::{HELLO_CONTRACT_VIOLATION, addon_error_t, clear_error, write_error};
use crate::logging;

static DEFAULT_CONTEXT: Lazy<BridgeContext> = Lazy::new(|| {
    logging::init_default();
    let config = Config::from_env();
    log::debug!("default context created with {config:?}");
    BridgeContext::new(config)
});

pub fn default_context() -> &'static BridgeContext {
    &DEFAULT_CONTEXT
}

/// Reads the record at `args` and returns its `age`.
///
/// `size_bytes` must equal `addon_record_size()` unless the size policy
/// allows 0. On any contract violation returns `HELLO_CONTRACT_VIOLATION`.
/// In deferred mode the callback is retained for the rest of the process
/// lifetime, or until a later `Hello` replaces it.
#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub extern "C" fn Hello(args: *const c_void, size_bytes: i32) -> i32 {
    // Safety: the host guarantees the record contract documented above.
    unsafe { guarded_hello(default_context(), args, size_bytes) }
        .unwrap_or(HELLO_CONTRACT_VIOLATION)
}

/// Per-tick hook for the host. Never invokes the retained callback.
#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub extern "C" fn Update() {
    default_context().update();
}

/// Replaces the configuration of the context behind `Hello` and `Update`.
///
/// A retained callback survives the change. Unknown dispatch or size policy
/// values leave the current configuration in place.
#[unsafe(no_mangle)]
pub extern "C" fn addon_configure_default(
    config: *const addon_config_t,
    out_error: *mut *mut addon_error_t,
) -> bool {
    clear_error(out_error);
    // Safety: a non-null config must point to a valid addon_config_t.
    let Some(config) = (unsafe { config.as_ref() }) else {
        write_error(out_error, "config was null");
        return false;
    };
    match Config::try_from(config) {
        Ok(config) => {
            default_context().set_config(config);
            true
        }
        Err(err) => {
            write_error(out_error, err.to_string());
            false
        }
    }
}
