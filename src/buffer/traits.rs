/*!
 * Buffer Traits
 */

use crate::core::limits::DEFAULT_HANDLER_NAME;
use crate::handler::Handler;

/// Objects that record which table produced their data buffer
pub trait BoundPolicy {
    /// Table bound to the buffer, `None` when no buffer is owned
    fn bound_handler(&self) -> Option<&Handler>;

    /// Name of the bound table; objects without a buffer report the default
    fn bound_name(&self) -> &str {
        self.bound_handler()
            .map_or(DEFAULT_HANDLER_NAME, |handler| handler.name())
    }
}

impl<T: BoundPolicy + ?Sized> BoundPolicy for std::sync::Arc<T> {
    fn bound_handler(&self) -> Option<&Handler> {
        (**self).bound_handler()
    }
}
