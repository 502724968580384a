/*!
 * Policy Registry
 * Process-wide current-policy slot and its public operations
 */

pub mod registry;
pub mod scope;

pub use registry::{
    current_policy, global, install_policy, query_current_policy_name, query_object_policy_name,
    scoped_policy, PolicyRegistry,
};
pub use scope::PolicyScope;
