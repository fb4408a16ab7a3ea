//! Environment (activation record) implementation

use crate::error::VmError;
use crate::program::BlockId;
use stagescript_types::{FrameId, Value};

/// One activation of a block
///
/// Environments live in the [`super::pool::EnvironmentPool`] and refer to
/// their parent by handle only, so a chain is acyclic and every frame can
/// be recycled by index.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// Enclosing frame, `None` for a root
    pub(crate) parent: Option<FrameId>,

    /// Block being executed
    pub(crate) block: BlockId,

    /// Instruction pointer (next instruction to run)
    pub(crate) ip: usize,

    /// Local variables
    pub(crate) variables: Vec<Value>,

    /// Operand stack
    stack: Vec<Value>,

    /// Push sequence number of every stack entry, checked by stack aliases
    stack_tags: Vec<u64>,

    /// Next push sequence number; never reused within a frame
    next_tag: u64,

    /// Scheduler ticks to skip before the next instruction
    pub(crate) wait_count: i64,

    /// Whether the caller expects variable 0 pushed on return
    pub(crate) has_result: bool,
}

impl Environment {
    /// Reinitialize a recycled record for a new activation
    pub(crate) fn activate(&mut self, parent: Option<FrameId>, block: BlockId) {
        self.parent = parent;
        self.block = block;
        self.ip = 0;
        self.wait_count = 0;
        self.has_result = false;
        self.variables.clear();
        self.stack.clear();
        self.stack_tags.clear();
    }

    /// Wipe scratch contents, keeping the allocations
    pub(crate) fn clear(&mut self) {
        self.parent = None;
        self.variables.clear();
        self.stack.clear();
        self.stack_tags.clear();
        self.wait_count = 0;
        self.has_result = false;
    }

    pub fn parent(&self) -> Option<FrameId> {
        self.parent
    }

    pub fn block(&self) -> BlockId {
        self.block
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn variables(&self) -> &[Value] {
        &self.variables
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn wait_count(&self) -> i64 {
        self.wait_count
    }

    pub fn has_result(&self) -> bool {
        self.has_result
    }

    /// In-place access to the stack entries; the length can only change
    /// through the push/pop helpers below
    pub(crate) fn stack_mut(&mut self) -> &mut [Value] {
        &mut self.stack
    }

    /// Push sequence number of the entry at `index`
    pub fn stack_tag(&self, index: usize) -> Option<u64> {
        self.stack_tags.get(index).copied()
    }

    #[inline]
    pub(crate) fn push(&mut self, value: Value) {
        self.stack.push(value);
        self.stack_tags.push(self.next_tag);
        self.next_tag += 1;
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> Result<Value, VmError> {
        let value = self.stack.pop().ok_or(VmError::StackUnderflow)?;
        self.stack_tags.pop();
        Ok(value)
    }

    /// Exchange the two topmost entries; tags travel with their values
    pub(crate) fn swap_top(&mut self) {
        let len = self.stack.len();
        if len >= 2 {
            self.stack.swap(len - 1, len - 2);
            self.stack_tags.swap(len - 1, len - 2);
        }
    }

    /// Remove the top `count` entries, bottom-most first
    pub(crate) fn split_top(&mut self, count: usize) -> Result<Vec<Value>, VmError> {
        let start = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or(VmError::StackUnderflow)?;
        self.stack_tags.truncate(start);
        Ok(self.stack.split_off(start))
    }

    #[inline]
    pub(crate) fn top(&self) -> Result<&Value, VmError> {
        self.stack.last().ok_or(VmError::StackUnderflow)
    }

    #[inline]
    pub(crate) fn top_mut(&mut self) -> Result<&mut Value, VmError> {
        self.stack.last_mut().ok_or(VmError::StackUnderflow)
    }

    /// Stack position `depth` values below the top
    #[inline]
    pub(crate) fn position_from_top(&self, depth: usize) -> Result<usize, VmError> {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .ok_or(VmError::StackUnderflow)
    }

    /// Drop `count` values from the top
    pub(crate) fn discard(&mut self, count: usize) -> Result<(), VmError> {
        let len = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or(VmError::StackUnderflow)?;
        self.stack.truncate(len);
        self.stack_tags.truncate(len);
        Ok(())
    }

    /// Mutable local slot, growing the variable array when needed
    pub(crate) fn variable_slot(&mut self, index: usize) -> &mut Value {
        if index >= self.variables.len() {
            self.variables.resize(index + 1, Value::Empty);
        }
        &mut self.variables[index]
    }
}
