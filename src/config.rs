//! Bridge configuration: dispatch mode and record size checking.

use crate::error::BridgeError;
use crate::record::RECORD_SIZE;

pub const DISPATCH_ENV: &str = "ADDON_BRIDGE_DISPATCH";
pub const SIZE_CHECK_ENV: &str = "ADDON_BRIDGE_SIZE_CHECK";

/// What `Hello` does with the host callback.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DispatchMode {
    /// Invoke the callback once, during `Hello`.
    Immediate,
    /// Retain the callback in the context for later ticks.
    #[default]
    Deferred,
}

/// How strictly `size_bytes` is checked against the record layout.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SizePolicy {
    #[default]
    Exact,
    /// Treat `0` as "not provided"; any other value must still match.
    AllowUnspecified,
}

impl SizePolicy {
    /// Returns how many bytes may be read from the record pointer.
    pub fn check(self, size_bytes: i32) -> Result<usize, BridgeError> {
        let actual =
            usize::try_from(size_bytes).map_err(|_| BridgeError::NegativeSize(size_bytes))?;
        match (self, actual) {
            (SizePolicy::AllowUnspecified, 0) => Ok(RECORD_SIZE),
            (_, actual) if actual == RECORD_SIZE => Ok(RECORD_SIZE),
            (_, actual) => Err(BridgeError::SizeMismatch {
                expected: RECORD_SIZE,
                actual,
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Config {
    pub dispatch: DispatchMode,
    pub size_policy: SizePolicy,
}

impl Config {
    /// Defaults overridden by `ADDON_BRIDGE_DISPATCH` and `ADDON_BRIDGE_SIZE_CHECK`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Config::default();
        if let Some(value) = lookup(DISPATCH_ENV) {
            match parse_dispatch(&value) {
                Some(dispatch) => config.dispatch = dispatch,
                None => log::warn!("ignoring {DISPATCH_ENV}=`{value}`"),
            }
        }
        if let Some(value) = lookup(SIZE_CHECK_ENV) {
            match parse_size_policy(&value) {
                Some(policy) => config.size_policy = policy,
                None => log::warn!("ignoring {SIZE_CHECK_ENV}=`{value}`"),
            }
        }
        config
    }
}

fn parse_dispatch(value: &str) -> Option<DispatchMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "immediate" => Some(DispatchMode::Immediate),
        "deferred" => Some(DispatchMode::Deferred),
        _ => None,
    }
}

fn parse_size_policy(value: &str) -> Option<SizePolicy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "exact" => Some(SizePolicy::Exact),
        "allow-unspecified" | "allow_unspecified" => Some(SizePolicy::AllowUnspecified),
        _ => None,
    }
}

/// Dispatch mode values for C callers, stored in `addon_config_t::dispatch`.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum addon_dispatch_mode_t {
    ADDON_DISPATCH_IMMEDIATE = 0,
    ADDON_DISPATCH_DEFERRED = 1,
}

/// Size policy values for C callers, stored in `addon_config_t::size_policy`.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum addon_size_policy_t {
    ADDON_SIZE_EXACT = 0,
    ADDON_SIZE_ALLOW_UNSPECIFIED = 1,
}

impl TryFrom<u32> for DispatchMode {
    type Error = BridgeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        const IMMEDIATE: u32 = addon_dispatch_mode_t::ADDON_DISPATCH_IMMEDIATE as u32;
        const DEFERRED: u32 = addon_dispatch_mode_t::ADDON_DISPATCH_DEFERRED as u32;

        match value {
            IMMEDIATE => Ok(Self::Immediate),
            DEFERRED => Ok(Self::Deferred),
            value => Err(BridgeError::InvalidEnum {
                field: "dispatch",
                value,
            }),
        }
    }
}

impl From<DispatchMode> for u32 {
    fn from(value: DispatchMode) -> Self {
        let raw = match value {
            DispatchMode::Immediate => addon_dispatch_mode_t::ADDON_DISPATCH_IMMEDIATE,
            DispatchMode::Deferred => addon_dispatch_mode_t::ADDON_DISPATCH_DEFERRED,
        };
        raw as u32
    }
}

impl TryFrom<u32> for SizePolicy {
    type Error = BridgeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        const EXACT: u32 = addon_size_policy_t::ADDON_SIZE_EXACT as u32;
        const ALLOW_UNSPECIFIED: u32 = addon_size_policy_t::ADDON_SIZE_ALLOW_UNSPECIFIED as u32;

        match value {
            EXACT => Ok(Self::Exact),
            ALLOW_UNSPECIFIED => Ok(Self::AllowUnspecified),
            value => Err(BridgeError::InvalidEnum {
                field: "size_policy",
                value,
            }),
        }
    }
}

impl From<SizePolicy> for u32 {
    fn from(value: SizePolicy) -> Self {
        let raw = match value {
            SizePolicy::Exact => addon_size_policy_t::ADDON_SIZE_EXACT,
            SizePolicy::AllowUnspecified => addon_size_policy_t::ADDON_SIZE_ALLOW_UNSPECIFIED,
        };
        raw as u32
    }
}

/// Configuration for a bridge context.
///
/// Fields hold `addon_dispatch_mode_t` / `addon_size_policy_t` values as
/// plain integers; anything else is rejected when the config is used.
#[repr(C)]
pub struct addon_config_t {
    pub dispatch: u32,
    pub size_policy: u32,
}

impl TryFrom<&addon_config_t> for Config {
    type Error = BridgeError;

    fn try_from(value: &addon_config_t) -> Result<Self, Self::Error> {
        Ok(Self {
            dispatch: value.dispatch.try_into()?,
            size_policy: value.size_policy.try_into()?,
        })
    }
}

/// Reads an optional C config; null selects the defaults.
///
/// # Safety
///
/// A non-null `config` must point to a readable `addon_config_t`.
pub(crate) unsafe fn config_from_ptr(
    config: *const addon_config_t,
) -> Result<Config, BridgeError> {
    // Safety: upheld by the caller.
    match unsafe { config.as_ref() } {
        Some(config) => Config::try_from(config),
        None => Ok(Config::default()),
    }
}

/// Initializes default configuration values.
///
/// The defaults retain the callback (`ADDON_DISPATCH_DEFERRED`) and require
/// `size_bytes` to match the record size exactly.
#[unsafe(no_mangle)]
pub extern "C" fn addon_config_init(config: *mut addon_config_t) {
    if config.is_null() {
        return;
    }
    let defaults = Config::default();
    // Safety: caller provided a writable config pointer.
    unsafe {
        *config = addon_config_t {
            dispatch: defaults.dispatch.into(),
            size_policy: defaults.size_policy.into(),
        };
    }
}
