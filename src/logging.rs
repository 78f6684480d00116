//! Logging for the bridge: a `log` backend that writes to stderr or a host callback.

use std::os::raw::{c_char, c_void};
use std::ptr;
use std::str::FromStr;
use std::sync::RwLock;

use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::{Lazy, OnceCell};

use crate::error::{BridgeError, addon_error_t, clear_error, cstring_from_str_lossy, write_error};
use crate::ffi::read_optional_cstr;

/// Target used by every record the bridge emits.
pub const LOG_TARGET: &str = "addon_bridge";

/// Whether `log::set_logger` accepted the bridge logger. Unset until the
/// first attempt.
static INSTALLED: OnceCell<bool> = OnceCell::new();
static BRIDGE_LOGGER: Lazy<BridgeLogger> = Lazy::new(BridgeLogger::new);

/// Log levels, in the order of `log::LevelFilter`.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum addon_log_level_t {
    ADDON_LOG_LEVEL_OFF = 0,
    ADDON_LOG_LEVEL_ERROR = 1,
    ADDON_LOG_LEVEL_WARN = 2,
    ADDON_LOG_LEVEL_INFO = 3,
    ADDON_LOG_LEVEL_DEBUG = 4,
    ADDON_LOG_LEVEL_TRACE = 5,
}

impl From<Level> for addon_log_level_t {
    fn from(value: Level) -> Self {
        match value {
            Level::Error => Self::ADDON_LOG_LEVEL_ERROR,
            Level::Warn => Self::ADDON_LOG_LEVEL_WARN,
            Level::Info => Self::ADDON_LOG_LEVEL_INFO,
            Level::Debug => Self::ADDON_LOG_LEVEL_DEBUG,
            Level::Trace => Self::ADDON_LOG_LEVEL_TRACE,
        }
    }
}

/// Converts a host-supplied `addon_log_level_t` value.
fn level_filter(raw: u32) -> Result<LevelFilter, BridgeError> {
    usize::try_from(raw)
        .ok()
        .and_then(|index| LevelFilter::iter().nth(index))
        .ok_or(BridgeError::InvalidEnum {
            field: "level",
            value: raw,
        })
}

/// One log line handed to the host. Strings live only for the callback.
#[repr(C)]
pub struct addon_log_record_t {
    pub level: addon_log_level_t,
    pub target: *const c_char,
    pub message: *const c_char,
    pub line: u32,
}

/// Host log sink. May be called from any thread that logs.
#[allow(non_camel_case_types)]
pub type addon_log_callback_t =
    Option<extern "C" fn(record: *const addon_log_record_t, user_data: *mut c_void)>;

/// Logging configuration.
///
/// `level` holds an `addon_log_level_t` value. A non-null `filter` is a
/// `RUST_LOG`-style directive list and wins over `level`; with a null
/// `filter` the `RUST_LOG` environment variable is tried first. A null
/// `callback` sends records to stderr.
#[repr(C)]
pub struct addon_log_config_t {
    pub level: u32,
    pub filter: *const c_char,
    pub callback: addon_log_callback_t,
    pub user_data: *mut c_void,
}

impl Default for addon_log_config_t {
    fn default() -> Self {
        Self {
            level: addon_log_level_t::ADDON_LOG_LEVEL_INFO as u32,
            filter: ptr::null(),
            callback: None,
            user_data: ptr::null_mut(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct LogFilter {
    fallback: LevelFilter,
    // (target prefix, level), longest matching prefix wins.
    targets: Vec<(String, LevelFilter)>,
}

impl LogFilter {
    fn for_level(level: LevelFilter) -> Self {
        Self {
            fallback: LevelFilter::Off,
            targets: vec![(LOG_TARGET.to_string(), level)],
        }
    }

    fn level_for(&self, target: &str) -> LevelFilter {
        self.targets
            .iter()
            .filter(|(prefix, _)| target.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map_or(self.fallback, |(_, level)| *level)
    }

    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level_for(metadata.target())
    }

    fn max_level(&self) -> LevelFilter {
        self.targets
            .iter()
            .map(|(_, level)| *level)
            .fold(self.fallback, Ord::max)
    }
}

impl FromStr for LogFilter {
    type Err = String;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let mut filter = Self {
            fallback: LevelFilter::Off,
            targets: Vec::new(),
        };
        let parse_level =
            |level: &str| LevelFilter::from_str(level).map_err(|_| format!("unknown level `{level}`"));

        for directive in spec.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            match directive.split_once('=').map(|(t, l)| (t.trim(), l.trim())) {
                Some(("", _)) => return Err(format!("`{directive}` has no target")),
                Some((target, "")) => return Err(format!("`{target}` has no level")),
                Some((target, level)) => filter.targets.push((target.to_string(), parse_level(level)?)),
                None => match LevelFilter::from_str(directive) {
                    Ok(level) => filter.fallback = level,
                    Err(_) => filter.targets.push((directive.to_string(), LevelFilter::Trace)),
                },
            }
        }

        Ok(filter)
    }
}

#[derive(Clone, Copy)]
struct HostSink {
    callback: extern "C" fn(*const addon_log_record_t, *mut c_void),
    // Kept as an address so the logger stays Send + Sync.
    user_data: usize,
}

impl HostSink {
    fn send(&self, record: &Record) {
        let target = cstring_from_str_lossy(record.target());
        let message = cstring_from_str_lossy(&record.args().to_string());
        let raw = addon_log_record_t {
            level: record.level().into(),
            target: target.as_ptr(),
            message: message.as_ptr(),
            line: record.line().unwrap_or(0),
        };
        (self.callback)(&raw, self.user_data as *mut c_void);
    }
}

struct Route {
    filter: LogFilter,
    host: Option<HostSink>,
}

struct BridgeLogger {
    route: RwLock<Route>,
}

impl BridgeLogger {
    fn new() -> Self {
        Self {
            route: RwLock::new(Route {
                filter: LogFilter::for_level(LevelFilter::Info),
                host: None,
            }),
        }
    }

    fn reroute(&self, route: Route) {
        *self.route.write().unwrap_or_else(|err| err.into_inner()) = route;
    }
}

impl Log for BridgeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        let route = self.route.read().unwrap_or_else(|err| err.into_inner());
        route.filter.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        let host = {
            let route = self.route.read().unwrap_or_else(|err| err.into_inner());
            if !route.filter.enabled(record.metadata()) {
                return;
            }
            route.host
        };
        match host {
            Some(host) => host.send(record),
            None => eprintln!("{} {}: {}", record.level(), record.target(), record.args()),
        }
    }

    fn flush(&self) {}
}

fn resolve_filter(config: Option<&addon_log_config_t>) -> Result<LogFilter, BridgeError> {
    let level = config.map_or(Ok(LevelFilter::Info), |config| level_filter(config.level))?;
    let spec = config
        .and_then(|config| read_optional_cstr(config.filter))
        .or_else(|| std::env::var("RUST_LOG").ok());

    match spec {
        Some(spec) => spec
            .parse()
            .map_err(|reason| BridgeError::InvalidLogFilter { filter: spec, reason }),
        None => Ok(LogFilter::for_level(level)),
    }
}

fn install() -> Result<(), BridgeError> {
    let installed = *INSTALLED.get_or_init(|| log::set_logger(&*BRIDGE_LOGGER).is_ok());
    if installed {
        Ok(())
    } else {
        Err(BridgeError::LoggerTaken)
    }
}

/// # Safety
///
/// A non-null `config` must point to a readable `addon_log_config_t`.
unsafe fn configure(config: *const addon_log_config_t) -> Result<(), BridgeError> {
    // Safety: upheld by the caller.
    let config = unsafe { config.as_ref() };
    let filter = resolve_filter(config)?;
    install()?;

    let host = config.and_then(|config| {
        config.callback.map(|callback| HostSink {
            callback,
            user_data: config.user_data as usize,
        })
    });
    let max_level = filter.max_level();
    BRIDGE_LOGGER.reroute(Route { filter, host });
    log::set_max_level(max_level);
    Ok(())
}

/// Installs the bridge logger with default settings unless an earlier
/// attempt already ran, whether it came from the host or from here.
pub(crate) fn init_default() {
    if INSTALLED.get().is_none() {
        // Safety: null selects the defaults.
        if let Err(err) = unsafe { configure(ptr::null()) } {
            eprintln!("{LOG_TARGET}: default logging unavailable: {err}");
        }
    }
}

/// Fills `config` with the defaults: INFO for the bridge, no filter, stderr.
#[unsafe(no_mangle)]
pub extern "C" fn addon_log_config_init(config: *mut addon_log_config_t) {
    if config.is_null() {
        return;
    }
    // Safety: caller provided a writable config pointer.
    unsafe {
        config.write(addon_log_config_t::default());
    }
}

/// Initializes bridge logging. A null `config` selects the defaults.
///
/// May be called again later to change the configuration. Fails if another
/// logger already owns the `log` facade.
#[unsafe(no_mangle)]
pub extern "C" fn addon_log_init(
    config: *const addon_log_config_t,
    out_error: *mut *mut addon_error_t,
) -> bool {
    clear_error(out_error);
    // Safety: a non-null config must point to a valid addon_log_config_t.
    match unsafe { configure(config) } {
        Ok(()) => true,
        Err(err) => {
            write_error(out_error, err.to_string());
            false
        }
    }
}
