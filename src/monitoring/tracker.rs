/*!
 * Allocation Tracker
 *
 * Side channel the default table reports every data-buffer operation to:
 * a live map of address -> size, running counters, and a bounded event ring.
 * Reporting never fails; a full ring drops the event and counts the drop.
 */

use super::events::{TraceEvent, TraceKind};
use crate::core::limits::TRACE_RING_SIZE;
use crate::core::types::{Address, Size};
use ahash::RandomState;
use crossbeam_queue::ArrayQueue;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Point-in-time tracker counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerStats {
    pub live_buffers: usize,
    pub live_bytes: usize,
    pub peak_bytes: usize,
    pub allocations: u64,
    pub reallocations: u64,
    pub frees: u64,
    /// Frees whose size differed from the size on record
    pub size_mismatches: u64,
    /// Frees or reallocations of addresses that were never tracked
    pub unknown_addresses: u64,
    pub events_dropped: u64,
}

pub struct AllocationTracker {
    live: DashMap<Address, Size, RandomState>,
    live_bytes: AtomicUsize,
    peak_bytes: AtomicUsize,
    allocations: AtomicU64,
    reallocations: AtomicU64,
    frees: AtomicU64,
    size_mismatches: AtomicU64,
    unknown_addresses: AtomicU64,
    events: ArrayQueue<TraceEvent>,
    dropped: AtomicU64,
}

impl AllocationTracker {
    pub fn new() -> Self {
        Self::with_capacity(TRACE_RING_SIZE)
    }

    /// Tracker whose event ring holds `events` entries
    pub fn with_capacity(events: usize) -> Self {
        Self {
            live: DashMap::with_hasher(RandomState::new()),
            live_bytes: AtomicUsize::new(0),
            peak_bytes: AtomicUsize::new(0),
            allocations: AtomicU64::new(0),
            reallocations: AtomicU64::new(0),
            frees: AtomicU64::new(0),
            size_mismatches: AtomicU64::new(0),
            unknown_addresses: AtomicU64::new(0),
            events: ArrayQueue::new(events.max(1)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Record a new buffer
    pub fn track(&self, address: Address, size: Size) {
        if let Some(stale) = self.live.insert(address, size) {
            self.live_bytes.fetch_sub(stale, Ordering::Relaxed);
        }
        self.grow(size);
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.publish(TraceEvent::new(TraceKind::Allocate, address, size));
    }

    /// First half of a reallocation: forget `old` before the block is handed
    /// to `realloc`, which may free it for reuse by another thread
    ///
    /// Returns the size on record, for `abort_realloc` if `realloc` fails.
    pub fn begin_realloc(&self, old: Address) -> Option<Size> {
        match self.live.remove(&old) {
            Some((_, recorded)) => {
                self.live_bytes.fetch_sub(recorded, Ordering::Relaxed);
                Some(recorded)
            }
            None => {
                self.unknown_addresses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Second half of a successful reallocation: the buffer now lives at `new`
    pub fn finish_realloc(&self, old: Address, new: Address, new_size: Size) {
        if let Some(stale) = self.live.insert(new, new_size) {
            self.live_bytes.fetch_sub(stale, Ordering::Relaxed);
        }
        self.grow(new_size);
        self.reallocations.fetch_add(1, Ordering::Relaxed);
        self.publish(TraceEvent::new(TraceKind::Reallocate, new, new_size).with_previous(old));
    }

    /// `realloc` failed and `old` is still live with the size it had
    pub fn abort_realloc(&self, old: Address, recorded: Size) {
        self.live.insert(old, recorded);
        self.live_bytes.fetch_add(recorded, Ordering::Relaxed);
    }

    /// Record a buffer being freed with the size its owner recorded
    pub fn untrack(&self, address: Address, size: Size) {
        match self.live.remove(&address) {
            Some((_, recorded)) => {
                if recorded != size {
                    self.size_mismatches.fetch_add(1, Ordering::Relaxed);
                }
                self.live_bytes.fetch_sub(recorded, Ordering::Relaxed);
            }
            None => {
                self.unknown_addresses.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.frees.fetch_add(1, Ordering::Relaxed);
        self.publish(TraceEvent::new(TraceKind::Free, address, size));
    }

    /// Size on record for a live address
    pub fn size_of(&self, address: Address) -> Option<Size> {
        self.live.get(&address).map(|entry| *entry.value())
    }

    pub fn is_live(&self, address: Address) -> bool {
        self.live.contains_key(&address)
    }

    /// Take every buffered event, oldest first
    pub fn drain_events(&self) -> Vec<TraceEvent> {
        std::iter::from_fn(|| self.events.pop()).collect()
    }

    pub fn snapshot(&self) -> TrackerStats {
        TrackerStats {
            live_buffers: self.live.len(),
            live_bytes: self.live_bytes.load(Ordering::Relaxed),
            peak_bytes: self.peak_bytes.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
            reallocations: self.reallocations.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            size_mismatches: self.size_mismatches.load(Ordering::Relaxed),
            unknown_addresses: self.unknown_addresses.load(Ordering::Relaxed),
            events_dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Forget all live buffers, counters and events
    pub fn reset(&self) {
        self.live.clear();
        self.live_bytes.store(0, Ordering::Relaxed);
        self.peak_bytes.store(0, Ordering::Relaxed);
        for counter in [
            &self.allocations,
            &self.reallocations,
            &self.frees,
            &self.size_mismatches,
            &self.unknown_addresses,
            &self.dropped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        while self.events.pop().is_some() {}
    }

    fn grow(&self, size: Size) {
        let live = self.live_bytes.fetch_add(size, Ordering::Relaxed) + size;
        self.peak_bytes.fetch_max(live, Ordering::Relaxed);
    }

    #[inline]
    fn publish(&self, event: TraceEvent) {
        if self.events.push(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Default for AllocationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AllocationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocationTracker")
            .field("stats", &self.snapshot())
            .finish()
    }
}
