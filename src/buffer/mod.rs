/*!
 * Buffers
 * Per-object policy binding: owners, host arrays and views
 */

pub mod array;
pub mod owner;
pub mod traits;
pub mod view;

pub use array::DataArray;
pub use owner::{BufferOwner, RawParts};
pub use traits::BoundPolicy;
pub use view::BufferView;
