use std::cell::RefCell;
use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::ptr;

use addon_bridge::{
    CallbackHandle, CallbackState, GREETING, HELLO_CONTRACT_VIOLATION, Hello, RECORD_SIZE, Update,
    addon_config_t, addon_configure_default, addon_dispatch_mode_t, addon_error_free,
    addon_error_message, addon_error_t, addon_record_size, addon_record_t, addon_size_policy_t,
    default_context,
};
use serial_test::serial;

thread_local! {
    static ALICE_CALLS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    static BOB_CALLS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

fn read(message: *const c_char) -> String {
    unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned()
}

extern "C" fn alice_callback(message: *const c_char) {
    ALICE_CALLS.with(|calls| calls.borrow_mut().push(read(message)));
}

extern "C" fn bob_callback(message: *const c_char) {
    BOB_CALLS.with(|calls| calls.borrow_mut().push(read(message)));
}

fn drain(calls: &'static std::thread::LocalKey<RefCell<Vec<String>>>) -> Vec<String> {
    calls.with(|calls| calls.take())
}

fn configure(dispatch: addon_dispatch_mode_t, size_policy: addon_size_policy_t) {
    let config = addon_config_t {
        dispatch: dispatch as u32,
        size_policy: size_policy as u32,
    };
    let mut error: *mut addon_error_t = ptr::null_mut();
    assert!(addon_configure_default(&config, &mut error));
    assert!(error.is_null());
}

fn hello(record: &addon_record_t, size_bytes: i32) -> i32 {
    Hello(record as *const addon_record_t as *const c_void, size_bytes)
}

fn record(name: &'static CStr, age: i32, callback: extern "C" fn(*const c_char)) -> addon_record_t {
    addon_record_t {
        name: name.as_ptr(),
        age,
        callback: Some(callback),
    }
}

#[test]
fn record_size_is_exported() {
    assert_eq!(addon_record_size(), RECORD_SIZE);
    assert_eq!(RECORD_SIZE, 3 * std::mem::size_of::<usize>());
}

#[test]
#[serial]
fn immediate_hello_calls_back_once_and_returns_age() {
    configure(
        addon_dispatch_mode_t::ADDON_DISPATCH_IMMEDIATE,
        addon_size_policy_t::ADDON_SIZE_EXACT,
    );

    let age = hello(&record(c"Alice", 30, alice_callback), RECORD_SIZE as i32);

    assert_eq!(age, 30);
    assert_eq!(drain(&ALICE_CALLS), vec![GREETING.to_string()]);
    assert_eq!(GREETING, "8======D hehe");
}

#[test]
#[serial]
fn negative_age_is_not_clamped() {
    configure(
        addon_dispatch_mode_t::ADDON_DISPATCH_IMMEDIATE,
        addon_size_policy_t::ADDON_SIZE_EXACT,
    );

    assert_eq!(hello(&record(c"Alice", -1, alice_callback), RECORD_SIZE as i32), -1);
    drain(&ALICE_CALLS);
}

#[test]
#[serial]
fn deferred_update_never_invokes_retained_callback() {
    configure(
        addon_dispatch_mode_t::ADDON_DISPATCH_DEFERRED,
        addon_size_policy_t::ADDON_SIZE_EXACT,
    );

    assert_eq!(hello(&record(c"Alice", 30, alice_callback), RECORD_SIZE as i32), 30);
    assert_eq!(default_context().state(), CallbackState::Retained);

    let ticks = default_context().tick_count();
    for _ in 0..10 {
        Update();
    }

    assert_eq!(default_context().tick_count(), ticks + 10);
    assert!(drain(&ALICE_CALLS).is_empty());
}

#[test]
#[serial]
fn second_deferred_hello_replaces_callback() {
    configure(
        addon_dispatch_mode_t::ADDON_DISPATCH_DEFERRED,
        addon_size_policy_t::ADDON_SIZE_EXACT,
    );

    hello(&record(c"Alice", 30, alice_callback), RECORD_SIZE as i32);
    hello(&record(c"Bob", 41, bob_callback), RECORD_SIZE as i32);
    Update();

    let retained = default_context().retained_callback().expect("callback retained");
    assert_eq!(retained.address(), CallbackHandle::new(bob_callback).address());
    assert!(drain(&ALICE_CALLS).is_empty());
    assert!(drain(&BOB_CALLS).is_empty());
}

#[test]
#[serial]
fn contract_violations_return_sentinel() {
    configure(
        addon_dispatch_mode_t::ADDON_DISPATCH_DEFERRED,
        addon_size_policy_t::ADDON_SIZE_EXACT,
    );
    hello(&record(c"Alice", 30, alice_callback), RECORD_SIZE as i32);

    let good = record(c"Bob", 41, bob_callback);
    assert_eq!(Hello(ptr::null(), RECORD_SIZE as i32), HELLO_CONTRACT_VIOLATION);
    assert_eq!(hello(&good, 0), HELLO_CONTRACT_VIOLATION);
    assert_eq!(hello(&good, RECORD_SIZE as i32 - 1), HELLO_CONTRACT_VIOLATION);
    assert_eq!(hello(&good, -8), HELLO_CONTRACT_VIOLATION);

    let no_name = addon_record_t {
        name: ptr::null(),
        age: 1,
        callback: Some(bob_callback),
    };
    assert_eq!(hello(&no_name, RECORD_SIZE as i32), HELLO_CONTRACT_VIOLATION);

    let no_callback = addon_record_t {
        name: c"Bob".as_ptr(),
        age: 1,
        callback: None,
    };
    assert_eq!(hello(&no_callback, RECORD_SIZE as i32), HELLO_CONTRACT_VIOLATION);

    let retained = default_context().retained_callback().expect("callback retained");
    assert_eq!(retained.address(), CallbackHandle::new(alice_callback).address());
    assert!(drain(&BOB_CALLS).is_empty());
}

#[test]
#[serial]
fn unspecified_size_is_accepted_when_allowed() {
    configure(
        addon_dispatch_mode_t::ADDON_DISPATCH_IMMEDIATE,
        addon_size_policy_t::ADDON_SIZE_ALLOW_UNSPECIFIED,
    );

    assert_eq!(hello(&record(c"Alex", 32, alice_callback), 0), 32);
    assert_eq!(hello(&record(c"Alex", 32, alice_callback), 5), HELLO_CONTRACT_VIOLATION);
    assert_eq!(drain(&ALICE_CALLS), vec![GREETING.to_string()]);
}

#[test]
#[serial]
fn configure_rejects_null_config() {
    let mut error: *mut addon_error_t = ptr::null_mut();
    assert!(!addon_configure_default(ptr::null(), &mut error));
    let message = unsafe { CStr::from_ptr(addon_error_message(error)) };
    assert_eq!(message.to_str().unwrap(), "config was null");
    addon_error_free(error);
}

#[test]
#[serial]
fn configure_rejects_unknown_values_and_keeps_config() {
    configure(
        addon_dispatch_mode_t::ADDON_DISPATCH_IMMEDIATE,
        addon_size_policy_t::ADDON_SIZE_EXACT,
    );
    let before = default_context().config();

    let config = addon_config_t {
        dispatch: 42,
        size_policy: addon_size_policy_t::ADDON_SIZE_EXACT as u32,
    };
    let mut error: *mut addon_error_t = ptr::null_mut();
    assert!(!addon_configure_default(&config, &mut error));
    let message = unsafe { CStr::from_ptr(addon_error_message(error)) };
    assert_eq!(message.to_str().unwrap(), "dispatch has no variant 42");
    addon_error_free(error);

    assert_eq!(default_context().config(), before);
}
