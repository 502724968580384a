/*!
 * Limits and Constants
 *
 * Centralized location for the sizes and thresholds used by the allocation
 * policy layer. Grouped by the component that consumes them.
 */

// =============================================================================
// HANDLE TABLE
// =============================================================================

/// Size of the fixed name buffer at the head of a handle table
/// Multiple of the pointer width so the whole C struct stays naturally aligned
pub const HANDLER_NAME_LEN: usize = 128;

/// Longest accepted name in bytes (one byte is reserved for the NUL terminator)
pub const HANDLER_NAME_MAX: usize = HANDLER_NAME_LEN - 1;

/// Name reported by the built-in default table
pub const DEFAULT_HANDLER_NAME: &str = "default_allocator";

// =============================================================================
// DEFAULT HANDLER
// =============================================================================

/// Exclusive upper bound of the sizes the small-block cache parks (bytes)
/// One bucket per exact byte size below this
pub const SMALL_CACHE_BUCKETS: usize = 1024;

/// Maximum blocks parked per bucket
pub const SMALL_CACHE_DEPTH: usize = 7;

/// Allocations (plain or zeroed) at least this large get hugepage advice (4MB)
pub const HUGEPAGE_THRESHOLD: usize = 4 * 1024 * 1024;

/// Page granularity used to find the advisable interior of a buffer
pub const PAGE_SIZE: usize = 4096;

// =============================================================================
// SHIFT TABLE
// =============================================================================

/// Freed sizes a shift table remembers before overwriting the oldest
pub const SHIFT_FREED_HISTORY: usize = 1024;

// =============================================================================
// ALLOCATION TRACKER
// =============================================================================

/// Capacity of the tracker's event ring (power of 2)
pub const TRACE_RING_SIZE: usize = 16384;
