//! Execution result types

/// Result of instruction execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecutionResult {
    /// Keep stepping the current thread
    Continue,
    /// Hand control to the next thread
    Yield,
}
