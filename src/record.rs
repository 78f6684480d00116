//! The fixed-layout record a host passes to `Hello`.

use std::marker::PhantomData;
use std::mem::{offset_of, size_of};
use std::os::raw::{c_char, c_void};
use std::ptr;

use crate::callback::{CallbackHandle, addon_callback_fn};
use crate::config::SizePolicy;
use crate::error::BridgeError;
use crate::ffi::read_cstr_lossy;

/// Record layout shared with the host.
///
/// `name` is a NUL-terminated UTF-8 string owned by the host and only valid
/// for the duration of the call. `callback` must stay callable for as long as
/// the bridge may retain it.
#[allow(non_camel_case_types)]
#[repr(C)]
pub struct addon_record_t {
    pub name: *const c_char,
    pub age: i32,
    pub callback: Option<addon_callback_fn>,
}

pub const RECORD_SIZE: usize = size_of::<addon_record_t>();

const ADDRESS_WIDTH: usize = size_of::<usize>();
const NAME_OFFSET: usize = offset_of!(addon_record_t, name);
const AGE_OFFSET: usize = offset_of!(addon_record_t, age);
const CALLBACK_OFFSET: usize = offset_of!(addon_record_t, callback);

/// A decoded record. Holds no pointer into host memory except the callback.
#[derive(Debug)]
pub struct Record {
    pub name: String,
    pub age: i32,
    pub callback: CallbackHandle,
}

/// Bounds-checked byte view over a record in host memory.
///
/// Only the bytes of declared fields are ever read, so layout padding is
/// never touched.
pub struct RecordBytes<'a> {
    base: *const u8,
    len: usize,
    _marker: PhantomData<&'a [u8]>,
}

impl<'a> RecordBytes<'a> {
    /// # Safety
    ///
    /// `base` must be non-null and the declared fields within `len` bytes of
    /// it must be initialized and readable for `'a`.
    pub unsafe fn from_raw(base: *const u8, len: usize) -> Self {
        Self {
            base,
            len,
            _marker: PhantomData,
        }
    }

    pub fn from_slice(bytes: &'a [u8]) -> Self {
        Self {
            base: bytes.as_ptr(),
            len: bytes.len(),
            _marker: PhantomData,
        }
    }

    fn field<const N: usize>(&self, offset: usize) -> Result<[u8; N], BridgeError> {
        match offset.checked_add(N) {
            Some(end) if end <= self.len => {}
            _ => {
                return Err(BridgeError::SizeMismatch {
                    expected: RECORD_SIZE,
                    actual: self.len,
                });
            }
        }
        let mut out = [0u8; N];
        // Safety: offset..offset + N lies inside the view.
        unsafe {
            ptr::copy_nonoverlapping(self.base.add(offset), out.as_mut_ptr(), N);
        }
        Ok(out)
    }

    fn address(&self, offset: usize) -> Result<usize, BridgeError> {
        self.field::<ADDRESS_WIDTH>(offset).map(usize::from_ne_bytes)
    }

    /// Decodes the record, copying `name` into an owned string.
    ///
    /// # Safety
    ///
    /// A non-null `name` must point to a NUL-terminated string and a non-null
    /// `callback` must be a function with the callback signature.
    pub unsafe fn decode(&self) -> Result<Record, BridgeError> {
        let name = self.address(NAME_OFFSET)?;
        let age = i32::from_ne_bytes(self.field::<4>(AGE_OFFSET)?);
        let callback = self.address(CALLBACK_OFFSET)?;

        if name == 0 {
            return Err(BridgeError::NullName);
        }
        // Safety: upheld by the caller.
        let callback = unsafe { CallbackHandle::from_address(callback) }?;
        // Safety: non-null, and NUL-terminated per the caller.
        let name = unsafe { read_cstr_lossy(name as *const c_char) };

        Ok(Record {
            name,
            age,
            callback,
        })
    }
}

/// Validates `size_bytes` and decodes the record at `args`.
///
/// # Safety
///
/// A non-null `args` must point to a readable [`addon_record_t`] whose fields
/// satisfy [`RecordBytes::decode`].
pub unsafe fn read_record(
    args: *const c_void,
    size_bytes: i32,
    policy: SizePolicy,
) -> Result<Record, BridgeError> {
    if args.is_null() {
        return Err(BridgeError::NullArgs);
    }
    let len = policy.check(size_bytes)?;
    // Safety: args is non-null and, per the caller, covers a whole record.
    unsafe { RecordBytes::from_raw(args as *const u8, len).decode() }
}

/// Returns the record size hosts must pass as `size_bytes`.
#[unsafe(no_mangle)]
pub extern "C" fn addon_record_size() -> usize {
    RECORD_SIZE
}
