/*!
 * Shared test allocators
 */

#![allow(dead_code)]

use datamem::{DataAllocator, HandleTable, Handler};
use parking_lot::Mutex;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One call received by a recording allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Allocate(usize),
    ZeroAllocate(usize, usize),
    Reallocate(usize),
    Deallocate(usize),
}

/// malloc-backed allocator that records every call
#[derive(Debug, Default)]
pub struct RecordingAllocator {
    calls: Mutex<Vec<Call>>,
    fail_allocate: AtomicBool,
    fail_reallocate: AtomicBool,
}

impl RecordingAllocator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn table(self: &Arc<Self>, name: &str) -> Handler {
        Arc::new(HandleTable::from_shared_allocator(name, Arc::clone(self)).unwrap())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn deallocations(&self) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Deallocate(size) => Some(size),
                _ => None,
            })
            .collect()
    }

    pub fn reallocations(&self) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Reallocate(size) => Some(size),
                _ => None,
            })
            .collect()
    }

    /// Simulate exhaustion of fresh allocations
    pub fn fail_allocations(&self, fail: bool) {
        self.fail_allocate.store(fail, Ordering::SeqCst);
    }

    /// Simulate exhaustion on resize
    pub fn fail_reallocations(&self, fail: bool) {
        self.fail_reallocate.store(fail, Ordering::SeqCst);
    }
}

impl DataAllocator for RecordingAllocator {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.calls.lock().push(Call::Allocate(size));
        if self.fail_allocate.load(Ordering::SeqCst) {
            return None;
        }
        NonNull::new(unsafe { libc::malloc(size.max(1)) }.cast())
    }

    fn zero_allocate(&self, count: usize, elem_size: usize) -> Option<NonNull<u8>> {
        self.calls.lock().push(Call::ZeroAllocate(count, elem_size));
        if self.fail_allocate.load(Ordering::SeqCst) {
            return None;
        }
        NonNull::new(unsafe { libc::calloc(count.max(1), elem_size.max(1)) }.cast())
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        self.calls.lock().push(Call::Deallocate(size));
        libc::free(ptr.as_ptr().cast());
    }

    unsafe fn reallocate(&self, ptr: NonNull<u8>, new_size: usize) -> Option<NonNull<u8>> {
        self.calls.lock().push(Call::Reallocate(new_size));
        if self.fail_reallocate.load(Ordering::SeqCst) {
            return None;
        }
        NonNull::new(libc::realloc(ptr.as_ptr().cast(), new_size.max(1)).cast())
    }
}
