/*!
 * Buffer Owner
 *
 * Per-object record of which table produced the current data buffer, and the
 * only place buffers are allocated, resized and freed.
 *
 * ## State machine
 *
 * ```text
 * Unbound ──bind──▶ Bound ──release / drop──▶ Freed
 *                   │   ▲
 *                   └───┘ resize (same table)
 * ```
 *
 * The table is captured from the registry exactly once, at bind time. Every
 * later resize and the final free go through that captured table, whatever
 * the registry holds by then.
 */

use super::traits::BoundPolicy;
use crate::core::types::{OwnerState, Size};
use crate::core::{DataMemError, DataMemResult};
use crate::handler::Handler;
use crate::policy::{self, PolicyRegistry};
use std::fmt;
use std::ptr::NonNull;
use tracing::warn;

enum Binding {
    Unbound,
    Bound {
        data: NonNull<u8>,
        size: Size,
        handler: Handler,
    },
    Freed,
}

/// Buffer and table handed out by `into_raw_parts` / taken by `from_raw_parts`
#[derive(Debug)]
pub struct RawParts {
    pub data: NonNull<u8>,
    /// Size last recorded with the table; passed back to `deallocate`
    pub size: Size,
    pub handler: Handler,
}

/// Exclusive owner of one data buffer and the table it came from
pub struct BufferOwner {
    binding: Binding,
}

// Safety: the buffer is exclusively owned; `&self` only exposes reads and the
// table's operations are callable from any thread.
unsafe impl Send for BufferOwner {}
unsafe impl Sync for BufferOwner {}

impl BufferOwner {
    /// Owner with no buffer yet
    pub const fn unbound() -> Self {
        Self {
            binding: Binding::Unbound,
        }
    }

    /// Allocate `size` uninitialized bytes with the global policy
    pub fn allocate(size: Size) -> DataMemResult<Self> {
        Self::allocate_in(policy::global(), size)
    }

    pub fn allocate_in(registry: &PolicyRegistry, size: Size) -> DataMemResult<Self> {
        let mut owner = Self::unbound();
        owner.bind_in(registry, size)?;
        Ok(owner)
    }

    /// Allocate with an explicit table, bypassing the registry
    pub fn allocate_with(handler: &Handler, size: Size) -> DataMemResult<Self> {
        handler.validate()?;
        let mut owner = Self::unbound();
        owner.bind_with(handler.clone(), size)?;
        Ok(owner)
    }

    /// Allocate `count * elem_size` zeroed bytes with the global policy
    pub fn zero_allocate(count: Size, elem_size: Size) -> DataMemResult<Self> {
        Self::zero_allocate_in(policy::global(), count, elem_size)
    }

    pub fn zero_allocate_in(
        registry: &PolicyRegistry,
        count: Size,
        elem_size: Size,
    ) -> DataMemResult<Self> {
        let mut owner = Self::unbound();
        owner.bind_zeroed_in(registry, count, elem_size)?;
        Ok(owner)
    }

    pub fn zero_allocate_with(
        handler: &Handler,
        count: Size,
        elem_size: Size,
    ) -> DataMemResult<Self> {
        handler.validate()?;
        let mut owner = Self::unbound();
        owner.bind_zeroed_with(handler.clone(), count, elem_size)?;
        Ok(owner)
    }

    /// Lazily bind an unbound owner to a fresh buffer from the global policy
    pub fn bind(&mut self, size: Size) -> DataMemResult<()> {
        self.bind_in(policy::global(), size)
    }

    pub fn bind_in(&mut self, registry: &PolicyRegistry, size: Size) -> DataMemResult<()> {
        self.require_unbound("bind")?;
        self.bind_with(registry.resolve(), size)
    }

    pub fn bind_zeroed(&mut self, count: Size, elem_size: Size) -> DataMemResult<()> {
        self.bind_zeroed_in(policy::global(), count, elem_size)
    }

    pub fn bind_zeroed_in(
        &mut self,
        registry: &PolicyRegistry,
        count: Size,
        elem_size: Size,
    ) -> DataMemResult<()> {
        self.require_unbound("bind")?;
        self.bind_zeroed_with(registry.resolve(), count, elem_size)
    }

    fn bind_with(&mut self, handler: Handler, size: Size) -> DataMemResult<()> {
        self.require_unbound("bind")?;
        let size = size.max(1);
        let data = handler.allocate(size).ok_or_else(|| {
            warn!(policy = %handler.name(), size, "data allocation failed");
            DataMemError::out_of_memory(size, handler.name())
        })?;
        self.binding = Binding::Bound {
            data,
            size,
            handler,
        };
        Ok(())
    }

    fn bind_zeroed_with(
        &mut self,
        handler: Handler,
        count: Size,
        elem_size: Size,
    ) -> DataMemResult<()> {
        self.require_unbound("bind")?;
        let size = count
            .checked_mul(elem_size)
            .ok_or(DataMemError::SizeOverflow { count, elem_size })?;
        let (count, elem_size, size) = if size == 0 {
            (1, 1, 1)
        } else {
            (count, elem_size, size)
        };
        let data = handler.zero_allocate(count, elem_size).ok_or_else(|| {
            warn!(policy = %handler.name(), size, "zeroed data allocation failed");
            DataMemError::out_of_memory(size, handler.name())
        })?;
        self.binding = Binding::Bound {
            data,
            size,
            handler,
        };
        Ok(())
    }

    /// Resize through the bound table
    ///
    /// On failure the buffer, its contents and its recorded size are unchanged.
    pub fn resize(&mut self, new_size: Size) -> DataMemResult<()> {
        let state = self.state();
        let Binding::Bound {
            data,
            size,
            handler,
        } = &mut self.binding
        else {
            return Err(invalid_state("resize", state));
        };
        let new_size = new_size.max(1);
        // Safety: `data` came from `handler` and is live
        match unsafe { handler.reallocate(*data, new_size) } {
            Some(new) => {
                *data = new;
                *size = new_size;
                Ok(())
            }
            None => {
                warn!(policy = %handler.name(), size = *size, new_size, "data reallocation failed");
                Err(DataMemError::out_of_memory(new_size, handler.name()))
            }
        }
    }

    /// Free the buffer now (`Bound -> Freed`); an unbound owner just becomes freed
    pub fn release(&mut self) -> DataMemResult<()> {
        match std::mem::replace(&mut self.binding, Binding::Freed) {
            Binding::Bound {
                data,
                size,
                handler,
            } => {
                // Safety: `data` came from `handler` with recorded size `size`
                unsafe { handler.deallocate(data, size) };
                Ok(())
            }
            Binding::Unbound => Ok(()),
            Binding::Freed => Err(invalid_state("release", OwnerState::Freed)),
        }
    }

    pub fn state(&self) -> OwnerState {
        match self.binding {
            Binding::Unbound => OwnerState::Unbound,
            Binding::Bound { .. } => OwnerState::Bound,
            Binding::Freed => OwnerState::Freed,
        }
    }

    /// Size recorded with the bound table; 0 without a buffer
    pub fn size(&self) -> Size {
        match self.binding {
            Binding::Bound { size, .. } => size,
            _ => 0,
        }
    }

    /// Buffer address, `None` without a buffer
    pub fn data(&self) -> Option<NonNull<u8>> {
        match self.binding {
            Binding::Bound { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.data().map_or(std::ptr::null(), |p| p.as_ptr().cast_const())
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.data().map_or(std::ptr::null_mut(), NonNull::as_ptr)
    }

    /// # Safety
    ///
    /// The first `size()` bytes must have been initialized.
    pub unsafe fn as_slice(&self) -> &[u8] {
        match self.binding {
            Binding::Bound { data, size, .. } => std::slice::from_raw_parts(data.as_ptr(), size),
            _ => &[],
        }
    }

    /// # Safety
    ///
    /// The first `size()` bytes must have been initialized.
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        match self.binding {
            Binding::Bound { data, size, .. } => {
                std::slice::from_raw_parts_mut(data.as_ptr(), size)
            }
            _ => &mut [],
        }
    }

    /// Bound table, `None` without a buffer
    pub fn handler(&self) -> Option<&Handler> {
        match &self.binding {
            Binding::Bound { handler, .. } => Some(handler),
            _ => None,
        }
    }

    /// Swap in a caller-supplied buffer and table, returning the previous ones
    /// without freeing them
    ///
    /// # Safety
    ///
    /// `data` must come from `handler`, hold `size` bytes and be owned by
    /// nobody else. Freeing it through any other table is undefined behavior;
    /// the caller takes responsibility for the returned parts.
    pub unsafe fn replace_raw(
        &mut self,
        data: NonNull<u8>,
        size: Size,
        handler: Handler,
    ) -> DataMemResult<Option<RawParts>> {
        if let Binding::Freed = self.binding {
            return Err(invalid_state("replace", OwnerState::Freed));
        }
        handler.validate()?;
        let previous = std::mem::replace(
            &mut self.binding,
            Binding::Bound {
                data,
                size,
                handler,
            },
        );
        Ok(match previous {
            Binding::Bound {
                data,
                size,
                handler,
            } => Some(RawParts {
                data,
                size,
                handler,
            }),
            _ => None,
        })
    }

    /// Disown the buffer; `None` without a buffer
    pub fn into_raw_parts(mut self) -> Option<RawParts> {
        match std::mem::replace(&mut self.binding, Binding::Freed) {
            Binding::Bound {
                data,
                size,
                handler,
            } => Some(RawParts {
                data,
                size,
                handler,
            }),
            _ => None,
        }
    }

    /// Adopt a buffer previously disowned with `into_raw_parts`
    ///
    /// The table is validated like `replace_raw`; on `InvalidHandle` the
    /// buffer is not adopted and stays the caller's to free.
    ///
    /// # Safety
    ///
    /// `parts.data` must come from `parts.handler`, hold `parts.size` bytes and
    /// be owned by nobody else.
    pub unsafe fn from_raw_parts(parts: RawParts) -> DataMemResult<Self> {
        parts.handler.validate()?;
        Ok(Self {
            binding: Binding::Bound {
                data: parts.data,
                size: parts.size,
                handler: parts.handler,
            },
        })
    }

    fn require_unbound(&self, operation: &str) -> DataMemResult<()> {
        match self.state() {
            OwnerState::Unbound => Ok(()),
            state => Err(invalid_state(operation, state)),
        }
    }
}

fn invalid_state(operation: &str, state: OwnerState) -> DataMemError {
    DataMemError::InvalidState {
        operation: operation.to_string(),
        state: state.to_string(),
    }
}

impl BoundPolicy for BufferOwner {
    fn bound_handler(&self) -> Option<&Handler> {
        self.handler()
    }
}

impl Default for BufferOwner {
    fn default() -> Self {
        Self::unbound()
    }
}

impl Drop for BufferOwner {
    fn drop(&mut self) {
        if let Binding::Bound {
            data,
            size,
            handler,
        } = &self.binding
        {
            // Safety: `data` came from `handler` with recorded size `size`
            unsafe { handler.deallocate(*data, *size) };
        }
    }
}

impl fmt::Debug for BufferOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferOwner")
            .field("state", &self.state())
            .field("data", &self.as_ptr())
            .field("size", &self.size())
            .field("policy", &self.bound_name())
            .finish()
    }
}
