/*!
 * Handle Table
 *
 * The unit of pluggable policy: four allocation-family operations plus a
 * name. `RawHandler` is the C layout shared across module boundaries;
 * `HandleTable` wraps it together with whatever keeps its `ctx` alive.
 *
 * ## Layout
 *
 * ```text
 * RawHandler (repr(C))
 * ├── name: [u8; 128]        NUL-terminated UTF-8, at most 127 bytes
 * ├── allocate               (ctx, size) -> ptr
 * ├── zero_allocate          (ctx, count, elem_size) -> ptr
 * ├── deallocate             (ctx, ptr, size)
 * ├── reallocate             (ctx, ptr, new_size) -> ptr
 * └── ctx: *mut c_void       passed as the first argument of every operation
 * ```
 *
 * A null operation pointer is `None`. Tables are validated when installed,
 * not when built, so a malformed table can exist but never becomes current.
 */

use super::allocator::{self, DataAllocator};
use crate::core::limits::{HANDLER_NAME_LEN, HANDLER_NAME_MAX};
use crate::core::types::Size;
use crate::core::{DataMemError, DataMemResult};
use std::any::Any;
use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;
use tracing::error;

/// Allocate `size` bytes; null on failure
pub type AllocateFn = unsafe extern "C" fn(ctx: *mut c_void, size: usize) -> *mut c_void;

/// Allocate `count * elem_size` zeroed bytes; null on failure
pub type ZeroAllocateFn =
    unsafe extern "C" fn(ctx: *mut c_void, count: usize, elem_size: usize) -> *mut c_void;

/// Free a buffer; `size` is the size last recorded for it
pub type DeallocateFn = unsafe extern "C" fn(ctx: *mut c_void, ptr: *mut c_void, size: usize);

/// Resize a buffer; null on failure, in which case `ptr` stays valid
pub type ReallocateFn =
    unsafe extern "C" fn(ctx: *mut c_void, ptr: *mut c_void, new_size: usize) -> *mut c_void;

/// Shared handle to an installed or bound table
pub type Handler = Arc<HandleTable>;

/// C layout of a handle table
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawHandler {
    pub name: [u8; HANDLER_NAME_LEN],
    pub allocate: Option<AllocateFn>,
    pub zero_allocate: Option<ZeroAllocateFn>,
    pub deallocate: Option<DeallocateFn>,
    pub reallocate: Option<ReallocateFn>,
    pub ctx: *mut c_void,
}

impl RawHandler {
    /// Empty table with the given name and no operations
    pub fn named(name: &str) -> DataMemResult<Self> {
        Ok(Self {
            name: encode_name(name)?,
            allocate: None,
            zero_allocate: None,
            deallocate: None,
            reallocate: None,
            ctx: std::ptr::null_mut(),
        })
    }

    /// Decode the name buffer
    pub fn name_str(&self) -> DataMemResult<&str> {
        decode_name(&self.name).map_err(DataMemError::invalid_handle)
    }

    /// Registration checks: every operation present, name well-formed
    pub fn validate(&self) -> DataMemResult<()> {
        let missing = [
            ("allocate", self.allocate.is_none()),
            ("zero_allocate", self.zero_allocate.is_none()),
            ("deallocate", self.deallocate.is_none()),
            ("reallocate", self.reallocate.is_none()),
        ];
        if let Some((op, _)) = missing.iter().find(|(_, absent)| *absent) {
            return Err(DataMemError::invalid_handle(format!("{} is null", op)));
        }
        self.name_str().map(|_| ())
    }
}

impl fmt::Debug for RawHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawHandler")
            .field("name", &decode_name(&self.name).unwrap_or("<invalid>"))
            .field("allocate", &self.allocate.is_some())
            .field("zero_allocate", &self.zero_allocate.is_some())
            .field("deallocate", &self.deallocate.is_some())
            .field("reallocate", &self.reallocate.is_some())
            .field("ctx", &self.ctx)
            .finish()
    }
}

/// Handle table plus ownership of the state behind its `ctx`
pub struct HandleTable {
    raw: RawHandler,
    _ctx_owner: Option<Arc<dyn Any + Send + Sync>>,
}

// Safety: the operations and `ctx` of a table are required to be usable from
// any thread (see `from_raw`); tables built from a `DataAllocator` satisfy
// this through its `Send + Sync` bound.
unsafe impl Send for HandleTable {}
unsafe impl Sync for HandleTable {}

impl HandleTable {
    /// Wrap a raw table without taking ownership of its `ctx`
    ///
    /// The table is not validated here; installation validates it.
    ///
    /// # Safety
    ///
    /// `ctx` must stay valid for as long as the table (or any buffer bound to
    /// it) is alive, and the operations must be callable from any thread.
    pub unsafe fn from_raw(raw: RawHandler) -> Self {
        Self {
            raw,
            _ctx_owner: None,
        }
    }

    /// Build a table that dispatches to a Rust allocator
    pub fn from_allocator<A: DataAllocator>(name: &str, allocator: A) -> DataMemResult<Self> {
        Self::from_shared_allocator(name, Arc::new(allocator))
    }

    /// Build a table around an allocator the caller keeps a handle to
    pub fn from_shared_allocator<A: DataAllocator>(
        name: &str,
        allocator: Arc<A>,
    ) -> DataMemResult<Self> {
        Ok(Self::with_encoded_name(encode_name(name)?, allocator))
    }

    pub(crate) fn with_encoded_name<A: DataAllocator>(
        name: [u8; HANDLER_NAME_LEN],
        allocator: Arc<A>,
    ) -> Self {
        let raw = RawHandler {
            name,
            allocate: Some(allocator::allocate_trampoline::<A>),
            zero_allocate: Some(allocator::zero_allocate_trampoline::<A>),
            deallocate: Some(allocator::deallocate_trampoline::<A>),
            reallocate: Some(allocator::reallocate_trampoline::<A>),
            ctx: Arc::as_ptr(&allocator) as *mut c_void,
        };
        Self {
            raw,
            _ctx_owner: Some(allocator as Arc<dyn Any + Send + Sync>),
        }
    }

    /// Table name, or `<invalid>` for a table that would fail validation
    pub fn name(&self) -> &str {
        decode_name(&self.raw.name).unwrap_or("<invalid>")
    }

    /// Underlying C layout
    pub fn raw(&self) -> &RawHandler {
        &self.raw
    }

    pub fn validate(&self) -> DataMemResult<()> {
        self.raw.validate()
    }

    /// Name equality, used for diagnostics only; identity is `Arc::ptr_eq`
    pub fn same_name(&self, other: &HandleTable) -> bool {
        self.raw.name == other.raw.name
    }

    pub(crate) fn allocate(&self, size: Size) -> Option<NonNull<u8>> {
        let f = self.raw.allocate?;
        // Safety: contract of `from_raw` / `DataAllocator`
        NonNull::new(unsafe { f(self.raw.ctx, size) }.cast())
    }

    pub(crate) fn zero_allocate(&self, count: Size, elem_size: Size) -> Option<NonNull<u8>> {
        let f = self.raw.zero_allocate?;
        NonNull::new(unsafe { f(self.raw.ctx, count, elem_size) }.cast())
    }

    /// # Safety
    ///
    /// `ptr` came from this table and `size` is the size last recorded for it.
    pub(crate) unsafe fn deallocate(&self, ptr: NonNull<u8>, size: Size) {
        match self.raw.deallocate {
            Some(f) => f(self.raw.ctx, ptr.as_ptr().cast(), size),
            None => error!(
                policy = self.name(),
                address = ptr.as_ptr() as usize,
                size,
                "table has no deallocate, leaking buffer"
            ),
        }
    }

    /// # Safety
    ///
    /// `ptr` came from this table and has not been freed.
    pub(crate) unsafe fn reallocate(&self, ptr: NonNull<u8>, new_size: Size) -> Option<NonNull<u8>> {
        let f = self.raw.reallocate?;
        NonNull::new(f(self.raw.ctx, ptr.as_ptr().cast(), new_size).cast())
    }
}

impl fmt::Debug for HandleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleTable")
            .field("name", &self.name())
            .field("owns_ctx", &self._ctx_owner.is_some())
            .finish()
    }
}

/// Encode a name into the fixed buffer, rejecting anything that does not fit
pub fn encode_name(name: &str) -> DataMemResult<[u8; HANDLER_NAME_LEN]> {
    let bytes = name.as_bytes();
    if bytes.len() > HANDLER_NAME_MAX {
        return Err(DataMemError::invalid_handle(format!(
            "name is {} bytes, limit is {}",
            bytes.len(),
            HANDLER_NAME_MAX
        )));
    }
    if bytes.contains(&0) {
        return Err(DataMemError::invalid_handle("name contains a NUL byte"));
    }
    let mut buf = [0u8; HANDLER_NAME_LEN];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(buf)
}

/// Compile-time variant of `encode_name` for built-in tables
pub(crate) const fn encode_name_const(name: &str) -> [u8; HANDLER_NAME_LEN] {
    let bytes = name.as_bytes();
    assert!(bytes.len() <= HANDLER_NAME_MAX, "handler name too long");
    let mut buf = [0u8; HANDLER_NAME_LEN];
    let mut i = 0;
    while i < bytes.len() {
        buf[i] = bytes[i];
        i += 1;
    }
    buf
}

fn decode_name(buf: &[u8; HANDLER_NAME_LEN]) -> Result<&str, &'static str> {
    let end = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or("name is not NUL-terminated")?;
    std::str::from_utf8(&buf[..end]).map_err(|_| "name is not valid UTF-8")
}
