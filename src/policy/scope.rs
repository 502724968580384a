/*!
 * Policy Scope
 * RAII swap/restore of the registry slot
 */

use super::registry::PolicyRegistry;
use crate::core::limits::DEFAULT_HANDLER_NAME;
use crate::core::DataMemResult;
use crate::handler::Handler;
use std::sync::Arc;
use tracing::{debug, warn};

/// Installs a table on creation and puts the previous one back on drop
///
/// # Example
///
/// ```ignore
/// let _scope = registry.scoped(Some(shift_table))?;
/// let array = DataArray::zeros_in(&registry, 16, 8)?; // bound to "shift"
/// // previous policy restored here; `array` stays bound to "shift"
/// ```
#[must_use = "the previous policy is restored as soon as the scope is dropped"]
pub struct PolicyScope<'a> {
    registry: &'a PolicyRegistry,
    installed: Option<Handler>,
    previous: Option<Handler>,
}

impl<'a> PolicyScope<'a> {
    pub(crate) fn enter(
        registry: &'a PolicyRegistry,
        table: Option<Handler>,
    ) -> DataMemResult<Self> {
        let previous = registry.set(table.clone())?;
        Ok(Self {
            registry,
            installed: table,
            previous,
        })
    }

    /// Table that will be restored on drop (`None` = default)
    pub fn previous(&self) -> Option<&Handler> {
        self.previous.as_ref()
    }
}

impl Drop for PolicyScope<'_> {
    fn drop(&mut self) {
        let restored = self.previous.take();
        let restored_name = restored
            .as_ref()
            .map_or(DEFAULT_HANDLER_NAME, |t| t.name())
            .to_string();
        let displaced = self.registry.exchange(restored);

        let intact = match (&displaced, &self.installed) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if !intact {
            let displaced_name = displaced.as_ref().map_or(DEFAULT_HANDLER_NAME, |t| t.name());
            warn!(
                restored = %restored_name,
                displaced = %displaced_name,
                "policy slot changed inside a scope; restoring anyway"
            );
        } else {
            debug!(restored = %restored_name, "policy scope restored");
        }
    }
}
