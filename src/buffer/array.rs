/*!
 * Data Array
 *
 * Minimal array-like host object: element size, element count and a shared
 * buffer owner. Shape and strides are deliberately absent; the array only
 * exists to exercise the binding discipline the way a numeric library would.
 */

use super::owner::BufferOwner;
use super::traits::BoundPolicy;
use super::view::BufferView;
use crate::core::types::Size;
use crate::core::{DataMemError, DataMemResult};
use crate::handler::Handler;
use crate::policy::{self, PolicyRegistry};
use std::ops::Range;
use std::sync::Arc;

/// One-dimensional array of fixed-size elements
///
/// Buffers are always fully initialized: constructors zero or copy, and
/// growth through `resize` is zero-filled.
#[derive(Debug)]
pub struct DataArray {
    owner: Arc<BufferOwner>,
    elem_size: Size,
    len: usize,
}

impl DataArray {
    /// `len` zeroed elements of `elem_size` bytes, using the global policy
    pub fn zeros(len: usize, elem_size: Size) -> DataMemResult<Self> {
        Self::zeros_in(policy::global(), len, elem_size)
    }

    pub fn zeros_in(registry: &PolicyRegistry, len: usize, elem_size: Size) -> DataMemResult<Self> {
        check_elem_size(elem_size)?;
        let owner = BufferOwner::zero_allocate_in(registry, len, elem_size)?;
        Ok(Self::from_owner(owner, elem_size, len))
    }

    /// Copy of `bytes`, interpreted as elements of `elem_size` bytes
    pub fn from_bytes(bytes: &[u8], elem_size: Size) -> DataMemResult<Self> {
        Self::from_bytes_in(policy::global(), bytes, elem_size)
    }

    pub fn from_bytes_in(
        registry: &PolicyRegistry,
        bytes: &[u8],
        elem_size: Size,
    ) -> DataMemResult<Self> {
        check_elem_size(elem_size)?;
        if bytes.len() % elem_size != 0 {
            return Err(DataMemError::InvalidLayout {
                reason: format!(
                    "{} bytes is not a whole number of {}-byte elements",
                    bytes.len(),
                    elem_size
                ),
            });
        }
        let mut owner = BufferOwner::allocate_in(registry, bytes.len())?;
        // Safety: the buffer holds at least `bytes.len()` bytes and is not aliased
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), owner.as_mut_ptr(), bytes.len());
        }
        Ok(Self::from_owner(owner, elem_size, bytes.len() / elem_size))
    }

    /// `len` copies of `value`; the element size is `value.len()`
    pub fn filled(len: usize, value: &[u8]) -> DataMemResult<Self> {
        Self::filled_in(policy::global(), len, value)
    }

    pub fn filled_in(registry: &PolicyRegistry, len: usize, value: &[u8]) -> DataMemResult<Self> {
        let elem_size = value.len();
        check_elem_size(elem_size)?;
        let nbytes = len
            .checked_mul(elem_size)
            .ok_or(DataMemError::SizeOverflow {
                count: len,
                elem_size,
            })?;
        let mut owner = BufferOwner::allocate_in(registry, nbytes)?;
        let ptr = owner.as_mut_ptr();
        for i in 0..len {
            // Safety: element `i` lies within the `nbytes` just allocated
            unsafe {
                std::ptr::copy_nonoverlapping(value.as_ptr(), ptr.add(i * elem_size), elem_size);
            }
        }
        Ok(Self::from_owner(owner, elem_size, len))
    }

    fn from_owner(owner: BufferOwner, elem_size: Size, len: usize) -> Self {
        Self {
            owner: Arc::new(owner),
            elem_size,
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn elem_size(&self) -> Size {
        self.elem_size
    }

    /// Bytes of element data (the recorded buffer size may be larger for empty arrays)
    pub fn nbytes(&self) -> Size {
        self.len * self.elem_size
    }

    pub fn owner(&self) -> &BufferOwner {
        &self.owner
    }

    /// Views currently referencing the buffer
    pub fn references(&self) -> usize {
        Arc::strong_count(&self.owner) - 1
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self.owner.data() {
            // Safety: the first `nbytes` bytes are always initialized
            Some(data) => unsafe { std::slice::from_raw_parts(data.as_ptr(), self.nbytes()) },
            None => &[],
        }
    }

    /// Mutable access; refused while views exist
    pub fn as_bytes_mut(&mut self) -> DataMemResult<&mut [u8]> {
        let nbytes = self.nbytes();
        let owner = self.exclusive_owner()?;
        match owner.data() {
            // Safety: as in `as_bytes`, and no view can observe the write
            Some(data) => Ok(unsafe { std::slice::from_raw_parts_mut(data.as_ptr(), nbytes) }),
            None => Ok(&mut []),
        }
    }

    /// View of the elements in `range`
    pub fn view(&self, range: Range<usize>) -> DataMemResult<BufferView> {
        if range.start > range.end || range.end > self.len {
            return Err(DataMemError::OutOfBounds {
                offset: range.start * self.elem_size,
                len: range.end.saturating_sub(range.start) * self.elem_size,
                size: self.nbytes(),
            });
        }
        BufferView::new(
            Arc::clone(&self.owner),
            range.start * self.elem_size,
            (range.end - range.start) * self.elem_size,
        )
    }

    /// Change the element count through the bound table
    ///
    /// New elements are zeroed. Fails with `BufferShared` while views exist
    /// and with `OutOfMemory` if the table cannot reallocate; in both cases
    /// the array is untouched.
    pub fn resize(&mut self, new_len: usize) -> DataMemResult<()> {
        let elem_size = self.elem_size;
        let old_bytes = self.nbytes();
        let new_bytes = new_len
            .checked_mul(elem_size)
            .ok_or(DataMemError::SizeOverflow {
                count: new_len,
                elem_size,
            })?;
        let owner = self.exclusive_owner()?;
        owner.resize(new_bytes)?;
        if new_bytes > old_bytes {
            // Safety: the buffer now holds at least `new_bytes` bytes
            unsafe {
                owner
                    .as_mut_ptr()
                    .add(old_bytes)
                    .write_bytes(0, new_bytes - old_bytes);
            }
        }
        self.len = new_len;
        Ok(())
    }

    fn exclusive_owner(&mut self) -> DataMemResult<&mut BufferOwner> {
        let references = Arc::strong_count(&self.owner) - 1;
        Arc::get_mut(&mut self.owner).ok_or(DataMemError::BufferShared { references })
    }
}

impl BoundPolicy for DataArray {
    fn bound_handler(&self) -> Option<&Handler> {
        self.owner.bound_handler()
    }
}

fn check_elem_size(elem_size: Size) -> DataMemResult<()> {
    if elem_size == 0 {
        return Err(DataMemError::InvalidLayout {
            reason: "element size is zero".to_string(),
        });
    }
    Ok(())
}
