/*!
 * Error Types
 * Allocation-policy error taxonomy with thiserror, miette, and serde support
 *
 * Freeing or reallocating a buffer through a table other than the one that
 * produced it cannot be detected at runtime. It is excluded structurally:
 * every buffer operation goes through the owner's bound table and never
 * through the registry's current value. Bypassing that through the unsafe
 * escape hatches on `BufferOwner` is undefined behavior, not an error.
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for allocation-policy operations
pub type DataMemResult<T> = Result<T, DataMemError>;

/// Allocation-policy errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum DataMemError {
    #[error("Invalid handle table: {reason}")]
    #[diagnostic(
        code(datamem::invalid_handle),
        help("All four operations must be present and the name must fit in 127 bytes of UTF-8.")
    )]
    InvalidHandle { reason: String },

    #[error("Out of memory: policy '{policy}' could not provide {requested} bytes")]
    #[diagnostic(
        code(datamem::out_of_memory),
        help("The buffer was left untouched. Free memory or install a different policy and retry.")
    )]
    OutOfMemory { requested: usize, policy: String },

    #[error("Requested size overflows: {count} elements of {elem_size} bytes")]
    #[diagnostic(
        code(datamem::size_overflow),
        help("The element count times the element size does not fit in usize.")
    )]
    SizeOverflow { count: usize, elem_size: usize },

    #[error("Cannot {operation} a buffer owner in state {state}")]
    #[diagnostic(
        code(datamem::invalid_state),
        help("Only bound owners can be resized or released; only unbound owners can be bound.")
    )]
    InvalidState { operation: String, state: String },

    #[error("Cannot resize a buffer that is referenced by {references} other handle(s)")]
    #[diagnostic(
        code(datamem::buffer_shared),
        help("Drop all views of the array before resizing it.")
    )]
    BufferShared { references: usize },

    #[error("Range {offset}..{offset}+{len} is outside a buffer of {size} bytes")]
    #[diagnostic(code(datamem::out_of_bounds))]
    OutOfBounds { offset: usize, len: usize, size: usize },

    #[error("Invalid element layout: {reason}")]
    #[diagnostic(code(datamem::invalid_layout))]
    InvalidLayout { reason: String },
}

impl DataMemError {
    pub(crate) fn invalid_handle(reason: impl Into<String>) -> Self {
        DataMemError::InvalidHandle {
            reason: reason.into(),
        }
    }

    pub(crate) fn out_of_memory(requested: usize, policy: &str) -> Self {
        DataMemError::OutOfMemory {
            requested,
            policy: policy.to_string(),
        }
    }
}
