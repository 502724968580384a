/*!
 * C ABI
 *
 * Handle tables cross the boundary as `RawHandler` values; installed tables
 * come back as opaque `*const HandleTable` handles that own one reference.
 * Every function returns a `DataMemStatus` code and never unwinds.
 */

use crate::core::DataMemError;
use crate::handler::{HandleTable, RawHandler};
use crate::policy;
use std::ffi::c_char;
use std::sync::Arc;

/// C-compatible status code returned by every exported function
///
/// `Ok` = 0, all errors are negative. Values are ABI-stable.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataMemStatus {
    Ok = 0,
    /// A required pointer argument is null
    InvalidArgument = -1,
    /// Table has a null operation or a malformed name
    InvalidHandle = -2,
    /// Caller-provided name buffer is too small
    BufferTooSmall = -3,
    OutOfMemory = -4,
    InvalidState = -5,
    /// Any other library error
    Failed = -6,
    /// A Rust panic was caught at the boundary
    Panicked = -128,
}

impl From<&DataMemError> for DataMemStatus {
    fn from(err: &DataMemError) -> Self {
        match err {
            DataMemError::InvalidHandle { .. } => DataMemStatus::InvalidHandle,
            DataMemError::OutOfMemory { .. } => DataMemStatus::OutOfMemory,
            DataMemError::InvalidState { .. } => DataMemStatus::InvalidState,
            _ => DataMemStatus::Failed,
        }
    }
}

macro_rules! ffi_guard {
    ($body:block) => {
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| $body)) {
            Ok(status) => status,
            Err(_) => {
                tracing::error!("panic caught at the C boundary");
                DataMemStatus::Panicked as i32
            }
        }
    };
}

/// Copy a raw table into a new handle
///
/// The table is validated; `ctx` is borrowed and must outlive the handle and
/// every buffer allocated through it.
///
/// # Safety
///
/// `raw` points to a readable `RawHandler`; `out` to a writable pointer slot.
#[no_mangle]
pub unsafe extern "C" fn datamem_handler_create(
    raw: *const RawHandler,
    out: *mut *const HandleTable,
) -> i32 {
    ffi_guard!({
        if raw.is_null() || out.is_null() {
            return DataMemStatus::InvalidArgument as i32;
        }
        let table = HandleTable::from_raw(*raw);
        if let Err(err) = table.validate() {
            return DataMemStatus::from(&err) as i32;
        }
        *out = Arc::into_raw(Arc::new(table));
        DataMemStatus::Ok as i32
    })
}

/// Drop the reference held by a handle
///
/// # Safety
///
/// `handle` came from `datamem_handler_create` or `datamem_install_handler`
/// and is not used afterwards.
#[no_mangle]
pub unsafe extern "C" fn datamem_handler_release(handle: *const HandleTable) -> i32 {
    ffi_guard!({
        if handle.is_null() {
            return DataMemStatus::InvalidArgument as i32;
        }
        drop(Arc::from_raw(handle));
        DataMemStatus::Ok as i32
    })
}

/// Install `handle` globally (null = default); the previous table is written
/// to `prev_out` as a new handle (null = default)
///
/// The caller keeps its own reference to `handle`. If `prev_out` is null the
/// previous table is released.
///
/// # Safety
///
/// `handle` is null or a live handle; `prev_out` is null or writable.
#[no_mangle]
pub unsafe extern "C" fn datamem_install_handler(
    handle: *const HandleTable,
    prev_out: *mut *const HandleTable,
) -> i32 {
    ffi_guard!({
        let table = if handle.is_null() {
            None
        } else {
            Arc::increment_strong_count(handle);
            Some(Arc::from_raw(handle))
        };
        match policy::install_policy(table) {
            Ok(previous) => {
                if !prev_out.is_null() {
                    *prev_out = previous.map_or(std::ptr::null(), Arc::into_raw);
                }
                DataMemStatus::Ok as i32
            }
            Err(err) => DataMemStatus::from(&err) as i32,
        }
    })
}

/// Write the current global policy name, NUL-terminated, into `buf`
///
/// # Safety
///
/// `buf` points to `cap` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn datamem_current_handler_name(buf: *mut c_char, cap: usize) -> i32 {
    ffi_guard!({ write_name(&policy::query_current_policy_name(), buf, cap) })
}

/// Write the name of `handle`, NUL-terminated, into `buf`
///
/// # Safety
///
/// `handle` is a live handle; `buf` points to `cap` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn datamem_handler_name(
    handle: *const HandleTable,
    buf: *mut c_char,
    cap: usize,
) -> i32 {
    ffi_guard!({
        if handle.is_null() {
            return DataMemStatus::InvalidArgument as i32;
        }
        write_name((*handle).name(), buf, cap)
    })
}

unsafe fn write_name(name: &str, buf: *mut c_char, cap: usize) -> i32 {
    if buf.is_null() {
        return DataMemStatus::InvalidArgument as i32;
    }
    let bytes = name.as_bytes();
    if cap <= bytes.len() {
        return DataMemStatus::BufferTooSmall as i32;
    }
    std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf.cast::<u8>(), bytes.len());
    *buf.add(bytes.len()) = 0;
    DataMemStatus::Ok as i32
}
