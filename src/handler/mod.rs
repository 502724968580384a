/*!
 * Handle Tables
 * Allocation policies: the C-layout table, the safe allocator trait, and the
 * built-in tables
 */

pub mod allocator;
mod cache;
pub mod config;
pub mod default;
pub mod shift;
pub mod table;

pub use allocator::DataAllocator;
pub use config::DefaultHandlerConfig;
pub use default::{default_allocator, default_handler, DefaultHandler};
pub use shift::{ShiftAllocator, ShiftStats, SHIFT_HANDLER_NAME};
pub use table::{
    encode_name, AllocateFn, DeallocateFn, HandleTable, Handler, RawHandler, ReallocateFn,
    ZeroAllocateFn,
};
