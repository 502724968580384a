/*!
 * Bridge
 * Process-wide allocation tracker slot used by the default table
 */

use super::tracker::AllocationTracker;
use std::sync::{Arc, OnceLock};

static GLOBAL_TRACKER: OnceLock<Arc<AllocationTracker>> = OnceLock::new();

/// Install the process-wide tracker; later calls return the existing one
pub fn init_tracker(tracker: AllocationTracker) -> &'static Arc<AllocationTracker> {
    GLOBAL_TRACKER.get_or_init(|| Arc::new(tracker))
}

/// Get global tracker if initialized
#[inline]
pub fn tracker() -> Option<&'static Arc<AllocationTracker>> {
    GLOBAL_TRACKER.get()
}
