/*!
 * datamem
 * Pluggable data-buffer allocation policies with per-buffer binding
 *
 * A process-wide registry holds the "current" handle table. Every buffer
 * captures the table it was allocated with and uses that same table for
 * every later resize and for the final free, so swapping the global policy
 * never affects buffers that already exist.
 */

pub mod buffer;
pub mod core;
pub mod ffi;
pub mod handler;
pub mod monitoring;
pub mod policy;

// Re-exports
pub use crate::core::limits::DEFAULT_HANDLER_NAME;
pub use crate::core::{DataMemError, DataMemResult, OwnerState};
pub use buffer::{BoundPolicy, BufferOwner, BufferView, DataArray, RawParts};
pub use handler::{
    default_allocator, default_handler, DataAllocator, DefaultHandler, DefaultHandlerConfig,
    HandleTable, Handler, RawHandler, ShiftAllocator, ShiftStats,
};
pub use monitoring::{init_tracing, init_tracker, tracker, AllocationTracker, TrackerStats};
pub use policy::{
    current_policy, install_policy, query_current_policy_name, query_object_policy_name,
    scoped_policy, PolicyRegistry, PolicyScope,
};
