/*!
 * Default Handle Table
 *
 * The built-in policy behind the registry's "default" sentinel. Wraps the
 * platform allocator (malloc family) with a small-block cache and reporting
 * to the allocation tracker. Fresh allocations, plain or zeroed, at or above
 * the configured threshold get hugepage advice when it is enabled. Blocks
 * served from the cache and grown by `reallocate` are not advised.
 */

use super::allocator::DataAllocator;
use super::cache::SmallBlockCache;
use super::config::DefaultHandlerConfig;
use super::table::{encode_name_const, HandleTable, Handler};
use crate::core::limits::{DEFAULT_HANDLER_NAME, HANDLER_NAME_LEN};
use crate::core::types::Size;
use crate::monitoring;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use tracing::trace;

const DEFAULT_NAME: [u8; HANDLER_NAME_LEN] = encode_name_const(DEFAULT_HANDLER_NAME);

static DEFAULT_ALLOCATOR: LazyLock<Arc<DefaultHandler>> =
    LazyLock::new(|| Arc::new(DefaultHandler::new(DefaultHandlerConfig::from_env())));

static DEFAULT_TABLE: LazyLock<Handler> = LazyLock::new(|| {
    Arc::new(HandleTable::with_encoded_name(
        DEFAULT_NAME,
        Arc::clone(&DEFAULT_ALLOCATOR),
    ))
});

/// The process-wide default table
#[inline]
pub fn default_handler() -> Handler {
    Arc::clone(&DEFAULT_TABLE)
}

/// Allocator state behind the default table (cache and hugepage toggles)
#[inline]
pub fn default_allocator() -> &'static DefaultHandler {
    &DEFAULT_ALLOCATOR
}

/// Platform-allocator policy
#[derive(Debug)]
pub struct DefaultHandler {
    cache: Option<SmallBlockCache>,
    hugepage: AtomicBool,
    hugepage_threshold: Size,
    report: bool,
}

impl DefaultHandler {
    pub fn new(config: DefaultHandlerConfig) -> Self {
        Self {
            cache: config.small_block_cache.then(SmallBlockCache::new),
            hugepage: AtomicBool::new(config.madvise_hugepage),
            hugepage_threshold: config.hugepage_threshold,
            report: config.report_to_tracker,
        }
    }

    /// Toggle hugepage advice; returns the previous setting
    pub fn set_hugepage(&self, enabled: bool) -> bool {
        self.hugepage.swap(enabled, Ordering::AcqRel)
    }

    pub fn hugepage_enabled(&self) -> bool {
        self.hugepage.load(Ordering::Acquire)
    }

    /// Free every parked small block; returns the bytes released
    pub fn trim_cache(&self) -> Size {
        match &self.cache {
            // Safety: parked blocks came from malloc and have no other owner
            Some(cache) => cache.drain(|ptr| unsafe { libc::free(ptr.as_ptr().cast()) }),
            None => 0,
        }
    }

    /// Number of blocks currently parked in the small-block cache
    pub fn cached_blocks(&self) -> usize {
        self.cache.as_ref().map_or(0, SmallBlockCache::len)
    }

    fn take_cached(&self, size: Size) -> Option<NonNull<u8>> {
        self.cache.as_ref()?.take(size)
    }

    fn advise(&self, ptr: NonNull<u8>, size: Size) {
        if size >= self.hugepage_threshold && self.hugepage_enabled() {
            advise_hugepage(ptr, size);
        }
    }

    fn report_alloc(&self, ptr: NonNull<u8>, size: Size) {
        if !self.report {
            return;
        }
        if let Some(tracker) = monitoring::tracker() {
            tracker.track(ptr.as_ptr() as usize, size);
        }
    }

    fn report_free(&self, ptr: NonNull<u8>, size: Size) {
        if !self.report {
            return;
        }
        if let Some(tracker) = monitoring::tracker() {
            tracker.untrack(ptr.as_ptr() as usize, size);
        }
    }
}

impl Default for DefaultHandler {
    fn default() -> Self {
        Self::new(DefaultHandlerConfig::default())
    }
}

impl DataAllocator for DefaultHandler {
    fn allocate(&self, size: Size) -> Option<NonNull<u8>> {
        let ptr = match self.take_cached(size) {
            Some(ptr) => ptr,
            None => {
                // Safety: plain malloc; null is mapped to None
                let ptr = NonNull::new(unsafe { libc::malloc(size.max(1)) }.cast::<u8>())?;
                self.advise(ptr, size);
                ptr
            }
        };
        trace!(address = ptr.as_ptr() as usize, size, "default allocate");
        self.report_alloc(ptr, size);
        Some(ptr)
    }

    fn zero_allocate(&self, count: Size, elem_size: Size) -> Option<NonNull<u8>> {
        let size = count.checked_mul(elem_size)?;
        let ptr = match self.take_cached(size) {
            Some(ptr) => {
                // Safety: cached blocks hold exactly `size` bytes
                unsafe { ptr.as_ptr().write_bytes(0, size) };
                ptr
            }
            None => {
                let ptr = NonNull::new(
                    unsafe { libc::calloc(count.max(1), elem_size.max(1)) }.cast::<u8>(),
                )?;
                self.advise(ptr, size);
                ptr
            }
        };
        trace!(address = ptr.as_ptr() as usize, size, "default zero_allocate");
        self.report_alloc(ptr, size);
        Some(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: Size) {
        trace!(address = ptr.as_ptr() as usize, size, "default deallocate");
        self.report_free(ptr, size);
        let parked = self
            .cache
            .as_ref()
            .is_some_and(|cache| cache.put(ptr, size));
        if !parked {
            libc::free(ptr.as_ptr().cast());
        }
    }

    unsafe fn reallocate(&self, ptr: NonNull<u8>, new_size: Size) -> Option<NonNull<u8>> {
        let old = ptr.as_ptr() as usize;
        // Report before realloc; once it returns, `old` may belong to another buffer
        let tracker = if self.report { monitoring::tracker() } else { None };
        let recorded = tracker.and_then(|tracker| tracker.begin_realloc(old));

        let Some(new) =
            NonNull::new(libc::realloc(ptr.as_ptr().cast(), new_size.max(1)).cast::<u8>())
        else {
            if let (Some(tracker), Some(recorded)) = (tracker, recorded) {
                tracker.abort_realloc(old, recorded);
            }
            return None;
        };
        trace!(
            from = old,
            to = new.as_ptr() as usize,
            new_size,
            "default reallocate"
        );
        if let Some(tracker) = tracker {
            tracker.finish_realloc(old, new.as_ptr() as usize, new_size);
        }
        Some(new)
    }
}

impl Drop for DefaultHandler {
    fn drop(&mut self) {
        self.trim_cache();
    }
}

/// Advise hugepage backing for the page-aligned interior of a buffer
///
/// Advice is best effort; failures (e.g. THP disabled) are ignored.
#[cfg(target_os = "linux")]
fn advise_hugepage(ptr: NonNull<u8>, size: Size) {
    use crate::core::limits::PAGE_SIZE;
    use nix::sys::mman::{madvise, MmapAdvise};

    let start = ptr.as_ptr() as usize;
    let aligned = (start + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
    let end = (start + size) & !(PAGE_SIZE - 1);
    if end <= aligned {
        return;
    }
    let Some(addr) = NonNull::new(aligned as *mut std::ffi::c_void) else {
        return;
    };
    // Safety: [aligned, end) lies within the live allocation
    if let Err(errno) = unsafe { madvise(addr, end - aligned, MmapAdvise::MADV_HUGEPAGE) } {
        trace!(%errno, size, "hugepage advice rejected");
    }
}

#[cfg(not(target_os = "linux"))]
fn advise_hugepage(_ptr: NonNull<u8>, _size: Size) {}
