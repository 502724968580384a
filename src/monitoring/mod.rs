/*!
 * Monitoring
 * Structured logging setup and the allocation-tracking side channel
 */

mod bridge;
pub mod events;
mod tracer;
pub mod tracker;

pub use bridge::{init_tracker, tracker};
pub use events::{TraceEvent, TraceKind};
pub use tracer::init_tracing;
pub use tracker::{AllocationTracker, TrackerStats};
