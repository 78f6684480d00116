use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::ptr;
use std::sync::Mutex;

use addon_bridge::{
    BridgeContext, Config, DispatchMode, RECORD_SIZE, SizePolicy, addon_error_free,
    addon_error_message, addon_error_t, addon_log_config_init, addon_log_config_t,
    addon_log_init, addon_log_level_t, addon_log_record_t, addon_record_t,
};

static MESSAGES: Mutex<Vec<(addon_log_level_t, String)>> = Mutex::new(Vec::new());

extern "C" fn capture(record: *const addon_log_record_t, user_data: *mut c_void) {
    assert_eq!(user_data as usize, 0xfeed);
    let record = unsafe { &*record };
    let message = unsafe { CStr::from_ptr(record.message) }.to_string_lossy().into_owned();
    MESSAGES.lock().unwrap().push((record.level, message));
}

extern "C" fn ignore(_: *const c_char) {}

#[test]
fn hello_diagnostics_reach_the_log_callback() {
    let mut config = std::mem::MaybeUninit::<addon_log_config_t>::uninit();
    addon_log_config_init(config.as_mut_ptr());
    let mut config = unsafe { config.assume_init() };
    config.filter = c"addon_bridge=info".as_ptr();
    config.callback = Some(capture);
    config.user_data = 0xfeed as *mut c_void;

    let mut error: *mut addon_error_t = ptr::null_mut();
    assert!(addon_log_init(&config, &mut error));
    assert!(error.is_null());

    let context = BridgeContext::new(Config {
        dispatch: DispatchMode::Deferred,
        size_policy: SizePolicy::Exact,
    });
    let record = addon_record_t {
        name: c"Alice".as_ptr(),
        age: 30,
        callback: Some(ignore),
    };
    let args = &record as *const addon_record_t as *const c_void;
    assert_eq!(unsafe { context.hello(args, RECORD_SIZE as i32) }, Ok(30));

    let messages = MESSAGES.lock().unwrap().clone();
    assert!(messages.contains(&(addon_log_level_t::ADDON_LOG_LEVEL_INFO, "Name: Alice".to_string())));
    assert!(messages.contains(&(addon_log_level_t::ADDON_LOG_LEVEL_INFO, "Age: 30".to_string())));
    assert!(
        messages
            .iter()
            .all(|(level, _)| *level != addon_log_level_t::ADDON_LOG_LEVEL_DEBUG)
    );

    let bad = addon_log_config_t {
        filter: c"addon_bridge=shout".as_ptr(),
        ..config
    };
    assert!(!addon_log_init(&bad, &mut error));
    let message = unsafe { CStr::from_ptr(addon_error_message(error)) };
    assert!(message.to_str().unwrap().starts_with("invalid log filter"));
    addon_error_free(error);
}
