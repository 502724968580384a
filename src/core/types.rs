/*!
 * Core Types
 * Common types used across the allocation policy layer
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address type for tracking and diagnostics
pub type Address = usize;

/// Size type for buffer operations
pub type Size = usize;

/// Lifecycle state of a buffer owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwnerState {
    /// No buffer yet (or no own buffer, e.g. a view's base placeholder)
    Unbound,
    /// Buffer allocated and bound to a handle table
    Bound,
    /// Buffer returned to its table; terminal
    Freed,
}

impl fmt::Display for OwnerState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OwnerState::Unbound => write!(f, "UNBOUND"),
            OwnerState::Bound => write!(f, "BOUND"),
            OwnerState::Freed => write!(f, "FREED"),
        }
    }
}
