//! Host callback handles.

use std::fmt;
use std::os::raw::c_char;

use crate::error::{BridgeError, cstring_from_str_lossy};

/// Host function receiving one NUL-terminated UTF-8 string.
///
/// The string is only valid for the duration of the call.
#[allow(non_camel_case_types)]
pub type addon_callback_fn = extern "C" fn(message: *const c_char);

/// Signature a callback address was resolved against.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CallbackSignature {
    /// `void (*)(const char *)`
    Utf8Sink,
}

/// A resolved, invocable reference to a host-supplied function.
#[derive(Clone, Copy)]
pub struct CallbackHandle {
    function: addon_callback_fn,
    signature: CallbackSignature,
}

impl CallbackHandle {
    /// Resolves a raw callback address read out of a record.
    ///
    /// # Safety
    ///
    /// A non-zero `address` must be the entry point of a C-ABI function with
    /// the [`CallbackSignature::Utf8Sink`] signature, and must stay callable
    /// for as long as the handle is kept.
    pub unsafe fn from_address(address: usize) -> Result<Self, BridgeError> {
        if address == 0 {
            return Err(BridgeError::NullCallback);
        }
        // Safety: non-null and, per the caller, a function of this signature.
        let function =
            unsafe { std::mem::transmute::<*const (), addon_callback_fn>(address as *const ()) };
        Ok(Self::new(function))
    }

    pub fn new(function: addon_callback_fn) -> Self {
        Self {
            function,
            signature: CallbackSignature::Utf8Sink,
        }
    }

    pub fn address(&self) -> usize {
        self.function as usize
    }

    pub fn signature(&self) -> CallbackSignature {
        self.signature
    }

    /// Calls the host function with `message`.
    ///
    /// Interior NUL bytes are replaced with spaces so the host sees the whole
    /// message.
    pub fn invoke(&self, message: &str) {
        let message = cstring_from_str_lossy(message);
        log::trace!("invoking host callback at {:#x}", self.address());
        (self.function)(message.as_ptr());
    }
}

impl fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackHandle")
            .field("address", &format_args!("{:#x}", self.address()))
            .field("signature", &self.signature)
            .finish()
    }
}
