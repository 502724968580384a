/*!
 * Data Allocator Trait
 * Safe Rust face of a handle table, bridged to the C layout by trampolines
 */

use crate::core::types::Size;
use std::ffi::c_void;
use std::ptr::{self, NonNull};

/// Allocation strategy for array data buffers
///
/// Implementations receive back exactly the pointers they handed out; the
/// core never offsets or inspects them, so embedding a header in front of
/// the returned pointer is an implementation detail of the allocator.
///
/// A panic escaping any of these methods aborts the process, since they are
/// called through `extern "C"` function pointers.
pub trait DataAllocator: Send + Sync + 'static {
    /// Allocate `size` bytes of uninitialized memory
    fn allocate(&self, size: Size) -> Option<NonNull<u8>>;

    /// Allocate `count * elem_size` zeroed bytes
    ///
    /// Default implementation: overflow-checked `allocate` followed by a
    /// zero fill.
    fn zero_allocate(&self, count: Size, elem_size: Size) -> Option<NonNull<u8>> {
        let size = count.checked_mul(elem_size)?;
        let ptr = self.allocate(size)?;
        // Safety: `allocate` returned at least `size` writable bytes
        unsafe { ptr.as_ptr().write_bytes(0, size) };
        Some(ptr)
    }

    /// Free a buffer
    ///
    /// # Safety
    ///
    /// `ptr` was returned by this allocator and not freed since. `size` is
    /// the size last recorded for it by the caller; whether it is checked is
    /// up to the implementation.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: Size);

    /// Resize a buffer; on `None` the original buffer is untouched
    ///
    /// # Safety
    ///
    /// `ptr` was returned by this allocator and not freed since.
    unsafe fn reallocate(&self, ptr: NonNull<u8>, new_size: Size) -> Option<NonNull<u8>>;
}

#[inline]
fn into_raw(ptr: Option<NonNull<u8>>) -> *mut c_void {
    ptr.map_or(ptr::null_mut(), |p| p.as_ptr().cast())
}

pub(crate) unsafe extern "C" fn allocate_trampoline<A: DataAllocator>(
    ctx: *mut c_void,
    size: usize,
) -> *mut c_void {
    let allocator = &*(ctx as *const A);
    into_raw(allocator.allocate(size))
}

pub(crate) unsafe extern "C" fn zero_allocate_trampoline<A: DataAllocator>(
    ctx: *mut c_void,
    count: usize,
    elem_size: usize,
) -> *mut c_void {
    let allocator = &*(ctx as *const A);
    into_raw(allocator.zero_allocate(count, elem_size))
}

pub(crate) unsafe extern "C" fn deallocate_trampoline<A: DataAllocator>(
    ctx: *mut c_void,
    ptr: *mut c_void,
    size: usize,
) {
    let allocator = &*(ctx as *const A);
    if let Some(ptr) = NonNull::new(ptr.cast::<u8>()) {
        allocator.deallocate(ptr, size);
    }
}

pub(crate) unsafe extern "C" fn reallocate_trampoline<A: DataAllocator>(
    ctx: *mut c_void,
    ptr: *mut c_void,
    new_size: usize,
) -> *mut c_void {
    let allocator = &*(ctx as *const A);
    match NonNull::new(ptr.cast::<u8>()) {
        Some(ptr) => into_raw(allocator.reallocate(ptr, new_size)),
        None => into_raw(allocator.allocate(new_size)),
    }
}
