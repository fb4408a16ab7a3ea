//! Native function registry
//!
//! Natives are registered by name and looked up by name (program loading)
//! or numeric ID. A native receives the machine and a read-only slice of
//! its arguments, copied from the caller's operand stack.

use crate::error::VmError;
use crate::machine::ScriptMachine;
use crate::program::{Block, NativeBinding};
use stagescript_types::Value;
use std::collections::HashMap;

/// Type signature for native functions
///
/// Takes a mutable reference to the machine and a slice of argument values,
/// returns a Result with the computed value or a VmError. The result is
/// discarded when the call site does not ask for one.
pub type NativeFn = fn(&mut ScriptMachine, &[Value]) -> Result<Value, VmError>;

/// Name of the first-class function trampoline
pub const INVOKE: &str = "invoke";

/// Metadata for a single native function
#[derive(Clone)]
pub struct BuiltinMetadata {
    /// Function name
    pub name: String,
    /// Function pointer
    pub func: NativeFn,
    /// Declared argument count
    pub arity: usize,
}

/// Registry of native functions
pub struct BuiltinRegistry {
    /// Name to index mapping
    pub name_to_id: HashMap<String, u16>,
    /// Index to function mapping
    pub functions: Vec<BuiltinMetadata>,
}

impl BuiltinRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            name_to_id: HashMap::new(),
            functions: Vec::new(),
        }
    }

    /// Register a native function
    ///
    /// # Panics
    /// Panics if the name is already registered, is the reserved `invoke`
    /// name, or if more than 65536 functions are registered.
    pub fn register(&mut self, name: &str, func: NativeFn, arity: usize) {
        if name == INVOKE || self.name_to_id.contains_key(name) {
            panic!("Native function '{}' already registered", name);
        }

        let id = self.functions.len();
        if id > u16::MAX as usize {
            panic!("Too many native functions (max 65536)");
        }

        self.name_to_id.insert(name.to_string(), id as u16);
        self.functions.push(BuiltinMetadata {
            name: name.to_string(),
            func,
            arity,
        });
    }

    #[inline]
    pub fn get_fn(&self, id: u16) -> Option<NativeFn> {
        self.functions.get(id as usize).map(|m| m.func)
    }

    #[inline]
    pub fn get_metadata(&self, id: u16) -> Option<&BuiltinMetadata> {
        self.functions.get(id as usize)
    }

    #[inline]
    pub fn get_id(&self, name: &str) -> Option<u16> {
        self.name_to_id.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        name == INVOKE || self.name_to_id.contains_key(name)
    }

    /// Native block for `name`, ready to add to a program
    pub fn native_block(&self, name: &str) -> Option<Block> {
        if name == INVOKE {
            return Some(Block::invoke());
        }
        self.get_id(name)
            .and_then(|id| self.get_metadata(id))
            .map(|meta| Block::native(meta.name.clone(), meta.arity, meta.func))
    }

    /// Binding and arity for `name`
    pub fn binding(&self, name: &str) -> Option<(NativeBinding, usize)> {
        self.native_block(name)
            .and_then(|block| block.native.map(|native| (native, block.arguments)))
    }

    /// Get number of registered functions
    #[inline]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::new()
    }
}
