//! Error types for the machine and the program loader

use thiserror::Error;

/// VM runtime errors
///
/// Every variant except [`VmError::Internal`] is an ordinary script-level
/// fault: the machine records it and stops the current step loop, leaving
/// all frames in place for inspection.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    /// No enclosing frame has the requested lexical level
    #[error("Variable not found (level={level},id={index})")]
    VariableNotFound { level: u32, index: usize },

    /// The slot exists but was never assigned
    #[error("Variable hasn't been initialized.")]
    VariableNotInitialized { level: u32, index: usize },

    /// Fewer values on the operand stack than a call declares
    #[error("Stack size[{stack}] is less than the number of arguments[{arguments}].")]
    ArgumentUnderflow { stack: usize, arguments: usize },

    /// Pop from an empty operand stack
    #[error("Stack underflow")]
    StackUnderflow,

    /// Operand stack grew past the configured limit
    #[error("Stack overflow: operand stack exceeded {0} values")]
    StackOverflow(usize),

    /// Incompatible types in an assignment, cast or array operation
    #[error("Type mismatch: cannot convert {found} to {expected}")]
    TypeMismatch { expected: String, found: String },

    /// Operation applied to operands it does not support
    #[error("Type error in {operation}: expected {expected}, got {got}")]
    TypeError {
        operation: String,
        expected: String,
        got: String,
    },

    /// Integer division or remainder by zero
    #[error("Division by zero")]
    DivisionByZero,

    #[error("Array index out of bounds (index={index}, length={length})")]
    IndexOutOfBounds { index: i64, length: usize },

    /// An alias or frame handle outlived the slot it pointed at
    #[error("Invalid reference: {0}")]
    DanglingReference(String),

    #[error("Event doesn't exist. [{0}]")]
    UnknownEvent(String),

    /// Call target cannot be resolved to a block
    #[error("Invalid function: {0}")]
    InvalidFunction(String),

    #[error("Invalid block index: {0}")]
    InvalidBlock(usize),

    /// Runtime error with message, raised by natives
    #[error("{0}")]
    Runtime(String),

    /// Engine fault, never caused by a script
    #[error("Internal error, this should not happen: {0}")]
    Internal(String),
}

impl VmError {
    /// Fatal errors halt every thread and terminate the machine
    pub fn is_fatal(&self) -> bool {
        matches!(self, VmError::Internal(_))
    }

    pub(crate) fn type_error(operation: &str, expected: &str, got: impl ToString) -> Self {
        VmError::TypeError {
            operation: operation.to_string(),
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }
}

/// A fault recorded on the machine
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} (line {line})")]
pub struct RuntimeFault {
    pub message: String,
    /// Source line of the instruction that raised the fault
    pub line: u32,
    pub fatal: bool,
}

impl RuntimeFault {
    pub(crate) fn new(error: &VmError, line: u32) -> Self {
        Self {
            message: error.to_string(),
            line,
            fatal: error.is_fatal(),
        }
    }
}
