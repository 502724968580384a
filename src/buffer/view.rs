/*!
 * Buffer Views
 * Non-owning windows into an array's buffer
 */

use super::owner::BufferOwner;
use super::traits::BoundPolicy;
use crate::core::{DataMemError, DataMemResult};
use crate::handler::Handler;
use std::sync::Arc;

/// Byte window into a buffer owned by someone else
///
/// A view keeps its base owner alive but never allocates or frees. While any
/// view exists, the base array cannot be resized or written through.
#[derive(Debug, Clone)]
pub struct BufferView {
    base: Arc<BufferOwner>,
    offset: usize,
    len: usize,
}

impl BufferView {
    /// Caller guarantees the first `offset + len` bytes of `base` are initialized
    pub(crate) fn new(base: Arc<BufferOwner>, offset: usize, len: usize) -> DataMemResult<Self> {
        let size = base.size();
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(Self { base, offset, len }),
            _ => Err(DataMemError::OutOfBounds { offset, len, size }),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self.base.data() {
            // Safety: range checked in `new`, initialized per its contract, and
            // the base cannot be mutated while this view holds a reference
            Some(data) if self.len > 0 => unsafe {
                std::slice::from_raw_parts(data.as_ptr().add(self.offset), self.len)
            },
            _ => &[],
        }
    }

    /// Narrower view of this one; `offset` is relative to this view
    pub fn slice(&self, offset: usize, len: usize) -> DataMemResult<Self> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => {
                Self::new(Arc::clone(&self.base), self.offset + offset, len)
            }
            _ => Err(DataMemError::OutOfBounds {
                offset,
                len,
                size: self.len,
            }),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Owner of the underlying buffer
    pub fn base(&self) -> &BufferOwner {
        &self.base
    }
}

impl BoundPolicy for BufferView {
    fn bound_handler(&self) -> Option<&Handler> {
        self.base.bound_handler()
    }
}
