/*!
 * Policy Registry
 *
 * The process-wide "current handle table" slot. Reads are lock-free loads of
 * an `Arc`; writes swap the whole `Arc`, so a reader observes either the old
 * table or the new one and never a mix of both. `None` is the default
 * sentinel and resolves to the built-in `default_allocator` table.
 *
 * Swapping the slot only affects buffers allocated afterwards. Buffers keep
 * the table they were allocated with (see `BufferOwner`).
 */

use super::scope::PolicyScope;
use crate::buffer::BoundPolicy;
use crate::core::limits::DEFAULT_HANDLER_NAME;
use crate::core::DataMemResult;
use crate::handler::{default_handler, HandleTable, Handler};
use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

static GLOBAL_REGISTRY: PolicyRegistry = PolicyRegistry::new();

/// The process-wide registry consulted by buffer constructors
#[inline]
pub fn global() -> &'static PolicyRegistry {
    &GLOBAL_REGISTRY
}

/// Allocation policy slot
#[derive(Debug)]
pub struct PolicyRegistry {
    current: ArcSwapOption<HandleTable>,
    swaps: AtomicU64,
}

impl PolicyRegistry {
    /// Registry with the default sentinel installed
    pub const fn new() -> Self {
        Self {
            current: ArcSwapOption::const_empty(),
            swaps: AtomicU64::new(0),
        }
    }

    /// Install `table` (or the default for `None`), returning what was current
    ///
    /// The table is validated first; on `InvalidHandle` nothing changes.
    pub fn set(&self, table: Option<Handler>) -> DataMemResult<Option<Handler>> {
        if let Some(table) = &table {
            table.validate()?;
        }
        let installed = name_of(table.as_ref()).to_string();
        let previous = self.exchange(table);
        info!(
            policy = %installed,
            previous = %name_of(previous.as_ref()),
            "allocation policy installed"
        );
        Ok(previous)
    }

    /// Swap without validation or logging; callers hold an already-validated table
    pub(crate) fn exchange(&self, table: Option<Handler>) -> Option<Handler> {
        let previous = self.current.swap(table);
        self.swaps.fetch_add(1, Ordering::Relaxed);
        previous
    }

    /// Installed table, or `None` when the default is in effect
    #[inline]
    pub fn current(&self) -> Option<Handler> {
        self.current.load_full()
    }

    /// Table the next allocation will use
    #[inline]
    pub fn resolve(&self) -> Handler {
        self.current.load_full().unwrap_or_else(default_handler)
    }

    /// Name of the table the next allocation will use
    pub fn current_name(&self) -> String {
        let current = self.current.load();
        name_of((*current).as_ref()).to_string()
    }

    /// Whether the default sentinel is installed
    pub fn is_default(&self) -> bool {
        self.current.load().is_none()
    }

    /// Number of swaps performed on this registry, restores included
    pub fn swap_count(&self) -> u64 {
        self.swaps.load(Ordering::Relaxed)
    }

    /// Install `table` until the returned guard is dropped
    pub fn scoped(&self, table: Option<Handler>) -> DataMemResult<PolicyScope<'_>> {
        PolicyScope::enter(self, table)
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn name_of(table: Option<&Arc<HandleTable>>) -> &str {
    table.map_or(DEFAULT_HANDLER_NAME, |t| t.name())
}

// =============================================================================
// PUBLIC OPERATIONS (process-wide registry)
// =============================================================================

/// Install a policy globally; returns the previous one (`None` = default)
pub fn install_policy(table: Option<Handler>) -> DataMemResult<Option<Handler>> {
    global().set(table)
}

/// Name of the policy the next allocation will use
pub fn query_current_policy_name() -> String {
    global().current_name()
}

/// Name of the policy actually bound to an object's buffer
pub fn query_object_policy_name<O: BoundPolicy + ?Sized>(object: &O) -> &str {
    object.bound_name()
}

/// Installed global policy, `None` when the default is in effect
pub fn current_policy() -> Option<Handler> {
    global().current()
}

/// Install a policy globally until the returned guard is dropped
pub fn scoped_policy(table: Option<Handler>) -> DataMemResult<PolicyScope<'static>> {
    global().scoped(table)
}
