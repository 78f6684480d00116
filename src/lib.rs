//! C ABI addon bridge.
//!
//! A host loads this library, passes an `addon_record_t` to `Hello` and
//! drives `Update` once per tick.

mod callback;
mod config;
mod context;
mod error;
mod exports;
mod ffi;
mod logging;
mod record;

pub use callback::{CallbackHandle, CallbackSignature, addon_callback_fn};
pub use config::{
    Config, DispatchMode, SizePolicy, addon_config_init, addon_config_t, addon_dispatch_mode_t,
    addon_size_policy_t,
};
pub use context::{
    BridgeContext, CallbackState, Diagnostics, GREETING, LogDiagnostics, addon_context_create,
    addon_context_free, addon_context_has_callback, addon_context_t, addon_context_tick_count,
    addon_hello, addon_update,
};
pub use error::{
    BridgeError, HELLO_CONTRACT_VIOLATION, addon_error_free, addon_error_message, addon_error_t,
};
pub use exports::{Hello, Update, addon_configure_default, default_context};
pub use logging::{
    LOG_TARGET, addon_log_callback_t, addon_log_config_init, addon_log_config_t, addon_log_init,
    addon_log_level_t, addon_log_record_t,
};
pub use record::{RECORD_SIZE, Record, RecordBytes, addon_record_size, addon_record_t, read_record};
