/*!
 * Shift Table
 *
 * A custom policy that hides a 64-byte header in front of every buffer:
 *
 * ```text
 * malloc'd block
 * ├── header (64 bytes)   "originally allocated <size>\0..."
 * └── data                <- pointer handed to the buffer owner
 * ```
 *
 * `deallocate` reads the header back and compares it with the size it was
 * given. That makes the table a probe for the per-buffer binding: freeing a
 * shift buffer through any other table, or with a size other than the one
 * last recorded, shows up in its counters.
 */

use super::allocator::DataAllocator;
use super::table::{HandleTable, Handler};
use crate::core::limits::SHIFT_FREED_HISTORY;
use crate::core::types::Size;
use crate::core::DataMemResult;
use crossbeam_queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

/// Bytes reserved in front of every buffer
pub const SHIFT_HEADER: usize = 64;

/// Name the shift table registers under
pub const SHIFT_HANDLER_NAME: &str = "shift";

const TAG: &[u8] = b"originally allocated";

/// Counters of a shift table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftStats {
    pub allocations: u64,
    pub zero_allocations: u64,
    pub reallocations: u64,
    pub deallocations: u64,
    /// Frees whose size disagreed with the header (block still freed)
    pub size_mismatches: u64,
    /// Frees of pointers without a shift header (block leaked)
    pub foreign_frees: u64,
}

/// Header-prefixing allocator over the platform allocator
#[derive(Debug)]
pub struct ShiftAllocator {
    allocations: AtomicU64,
    zero_allocations: AtomicU64,
    reallocations: AtomicU64,
    deallocations: AtomicU64,
    size_mismatches: AtomicU64,
    foreign_frees: AtomicU64,
    /// Most recent sizes received by `deallocate`; oldest overwritten when full
    freed_sizes: ArrayQueue<Size>,
}

impl ShiftAllocator {
    pub fn new() -> Arc<Self> {
        Self::with_history(SHIFT_FREED_HISTORY)
    }

    /// Shift allocator remembering the last `history` freed sizes
    pub fn with_history(history: usize) -> Arc<Self> {
        Arc::new(Self {
            allocations: AtomicU64::new(0),
            zero_allocations: AtomicU64::new(0),
            reallocations: AtomicU64::new(0),
            deallocations: AtomicU64::new(0),
            size_mismatches: AtomicU64::new(0),
            foreign_frees: AtomicU64::new(0),
            freed_sizes: ArrayQueue::new(history.max(1)),
        })
    }

    /// Table named `shift` dispatching to this allocator
    pub fn handler(self: &Arc<Self>) -> DataMemResult<Handler> {
        self.handler_named(SHIFT_HANDLER_NAME)
    }

    pub fn handler_named(self: &Arc<Self>, name: &str) -> DataMemResult<Handler> {
        Ok(Arc::new(HandleTable::from_shared_allocator(
            name,
            Arc::clone(self),
        )?))
    }

    pub fn stats(&self) -> ShiftStats {
        ShiftStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            zero_allocations: self.zero_allocations.load(Ordering::Relaxed),
            reallocations: self.reallocations.load(Ordering::Relaxed),
            deallocations: self.deallocations.load(Ordering::Relaxed),
            size_mismatches: self.size_mismatches.load(Ordering::Relaxed),
            foreign_frees: self.foreign_frees.load(Ordering::Relaxed),
        }
    }

    /// Drain the recorded `deallocate` sizes, oldest first
    ///
    /// Only the most recent frees are kept; `stats().deallocations` counts all of them.
    pub fn take_freed_sizes(&self) -> Vec<Size> {
        std::iter::from_fn(|| self.freed_sizes.pop()).collect()
    }

    /// Size recorded in the header of a live shift buffer
    ///
    /// # Safety
    ///
    /// `ptr` must be a live buffer returned by a shift table.
    pub unsafe fn recorded_size(ptr: NonNull<u8>) -> Option<Size> {
        read_header(ptr.as_ptr().sub(SHIFT_HEADER))
    }
}

impl DataAllocator for ShiftAllocator {
    fn allocate(&self, size: Size) -> Option<NonNull<u8>> {
        let total = size.checked_add(SHIFT_HEADER)?;
        // Safety: header fits in the block; data starts SHIFT_HEADER bytes in
        unsafe {
            let real = libc::malloc(total).cast::<u8>();
            if real.is_null() {
                return None;
            }
            write_header(real, size);
            self.allocations.fetch_add(1, Ordering::Relaxed);
            NonNull::new(real.add(SHIFT_HEADER))
        }
    }

    fn zero_allocate(&self, count: Size, elem_size: Size) -> Option<NonNull<u8>> {
        let size = count.checked_mul(elem_size)?;
        let total = size.checked_add(SHIFT_HEADER)?;
        unsafe {
            let real = libc::calloc(total, 1).cast::<u8>();
            if real.is_null() {
                return None;
            }
            write_header(real, size);
            self.zero_allocations.fetch_add(1, Ordering::Relaxed);
            NonNull::new(real.add(SHIFT_HEADER))
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: Size) {
        let real = ptr.as_ptr().sub(SHIFT_HEADER);
        self.deallocations.fetch_add(1, Ordering::Relaxed);
        self.freed_sizes.force_push(size);

        match read_header(real) {
            Some(recorded) if recorded == size => libc::free(real.cast()),
            Some(recorded) => {
                self.size_mismatches.fetch_add(1, Ordering::Relaxed);
                warn!(
                    received = size,
                    recorded,
                    "shift deallocate with unmatched size"
                );
                libc::free(real.cast());
            }
            None => {
                self.foreign_frees.fetch_add(1, Ordering::Relaxed);
                error!(
                    address = ptr.as_ptr() as usize,
                    size, "shift deallocate of a buffer without shift header, leaking it"
                );
            }
        }
    }

    unsafe fn reallocate(&self, ptr: NonNull<u8>, new_size: Size) -> Option<NonNull<u8>> {
        let total = new_size.checked_add(SHIFT_HEADER)?;
        let real = libc::realloc(ptr.as_ptr().sub(SHIFT_HEADER).cast(), total).cast::<u8>();
        if real.is_null() {
            return None;
        }
        write_header(real, new_size);
        self.reallocations.fetch_add(1, Ordering::Relaxed);
        NonNull::new(real.add(SHIFT_HEADER))
    }
}

/// # Safety
///
/// `real` points to at least `SHIFT_HEADER` writable bytes.
unsafe fn write_header(real: *mut u8, size: Size) {
    let header = std::slice::from_raw_parts_mut(real, SHIFT_HEADER);
    header.fill(0);
    let mut cursor = &mut header[..SHIFT_HEADER - 1];
    // Tag plus at most 20 digits always fits in 63 bytes
    let _ = write!(cursor, "originally allocated {}", size);
}

/// # Safety
///
/// `real` points to at least `SHIFT_HEADER` readable bytes.
unsafe fn read_header(real: *const u8) -> Option<Size> {
    let header = std::slice::from_raw_parts(real, SHIFT_HEADER);
    let rest = header.strip_prefix(TAG)?.strip_prefix(b" ")?;
    let end = rest.iter().position(|&b| b == 0)?;
    std::str::from_utf8(&rest[..end]).ok()?.parse().ok()
}
