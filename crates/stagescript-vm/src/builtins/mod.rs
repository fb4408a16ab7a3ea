//! Native functions
//!
//! - `registry`: name/ID lookup and the native calling convention
//! - `operators`: general forms of the arithmetic, comparison, array and cast
//!   operations

pub mod operators;
pub mod registry;

pub use registry::{BuiltinMetadata, BuiltinRegistry, NativeFn, INVOKE};

/// Registry holding every core native
pub fn create_builtin_registry() -> BuiltinRegistry {
    let mut registry = BuiltinRegistry::new();
    operators::register_functions(&mut registry);
    registry
}
