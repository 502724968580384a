/*!
 * Small-Block Cache
 * Exact-size buckets of freed data buffers for reuse by the default handler
 */

use crate::core::limits::{SMALL_CACHE_BUCKETS, SMALL_CACHE_DEPTH};
use crate::core::types::Size;
use parking_lot::Mutex;
use std::ptr::NonNull;

/// Block parked in the cache; owned by the cache until taken back out
#[derive(Debug)]
struct CachedBlock(NonNull<u8>);

// Safety: a parked block is not referenced by anyone but the cache
unsafe impl Send for CachedBlock {}

/// Exact-size cache for buffers smaller than `SMALL_CACHE_BUCKETS` bytes
///
/// - Bucket `n` holds blocks of exactly `n` bytes
/// - At most `SMALL_CACHE_DEPTH` blocks per bucket; beyond that `put` refuses
#[derive(Debug)]
pub(crate) struct SmallBlockCache {
    buckets: Mutex<Vec<Vec<CachedBlock>>>,
}

impl SmallBlockCache {
    pub fn new() -> Self {
        let buckets = (0..SMALL_CACHE_BUCKETS)
            .map(|_| Vec::with_capacity(SMALL_CACHE_DEPTH))
            .collect();
        Self {
            buckets: Mutex::new(buckets),
        }
    }

    #[inline]
    pub fn accepts(size: Size) -> bool {
        size < SMALL_CACHE_BUCKETS
    }

    /// Reuse a parked block of exactly `size` bytes
    pub fn take(&self, size: Size) -> Option<NonNull<u8>> {
        if !Self::accepts(size) {
            return None;
        }
        self.buckets.lock()[size].pop().map(|block| block.0)
    }

    /// Park a block; returns false if the caller must free it instead
    pub fn put(&self, ptr: NonNull<u8>, size: Size) -> bool {
        if !Self::accepts(size) {
            return false;
        }
        let mut buckets = self.buckets.lock();
        let bucket = &mut buckets[size];
        if bucket.len() >= SMALL_CACHE_DEPTH {
            return false;
        }
        bucket.push(CachedBlock(ptr));
        true
    }

    /// Hand every parked block to `free`; returns the bytes released
    pub fn drain(&self, mut free: impl FnMut(NonNull<u8>)) -> Size {
        let mut buckets = self.buckets.lock();
        let mut released = 0;
        for (size, bucket) in buckets.iter_mut().enumerate() {
            for block in bucket.drain(..) {
                free(block.0);
                released += size;
            }
        }
        released
    }

    /// Number of parked blocks
    pub fn len(&self) -> usize {
        self.buckets.lock().iter().map(Vec::len).sum()
    }
}
