//! Assignment instruction execution
//!
//! Both forms keep the destination's type: the incoming value is checked
//! for assignability, detached from shared storage and cast to the type
//! the destination held before the write.

use crate::error::VmError;
use crate::machine::result::ExecutionResult;
use crate::machine::ScriptMachine;
use crate::opcode::OpCode;
use crate::ops::{type_name, ValueOps};
use crate::program::Code;
use stagescript_types::{FrameId, Value};

impl ScriptMachine {
    /// Execute assignment instructions
    pub(crate) fn execute_assign(
        &mut self,
        frame: FrameId,
        code: &Code,
    ) -> Result<ExecutionResult, VmError> {
        match code.op {
            OpCode::CopyAssign => {
                let index = code.arg1 as usize;
                let owner = self.resolve_variable(frame, code.arg0, index)?;
                let source = self.env(frame)?.top()?.clone();
                let value = {
                    let dest = self.env(owner)?.variables.get(index);
                    assigned_value(&self.ops(), source, dest)?
                };
                *self.env_mut(owner)?.variable_slot(index) = value;
                self.env_mut(frame)?.discard(1)?;
            }

            OpCode::RefAssign => {
                let env = self.env(frame)?;
                let position = env.position_from_top(1)?;
                let target = match &env.stack()[position] {
                    Value::Alias(slot) => slot.clone(),
                    other => {
                        return Err(VmError::type_error(
                            "reference assignment",
                            "reference",
                            type_name(other),
                        ))
                    }
                };
                let source = env.stack()[position + 1].clone();
                let value = assigned_value(&self.ops(), source, Some(self.slot(&target)?))?;
                *self.slot_mut(&target)? = value;
                self.env_mut(frame)?.discard(2)?;
            }

            _ => unreachable!("Non-assignment opcode in assignment handler"),
        }

        Ok(ExecutionResult::Continue)
    }
}

/// Value to store when `source` is assigned over `dest`
fn assigned_value(ops: &ValueOps<'_>, source: Value, dest: Option<&Value>) -> Result<Value, VmError> {
    let mut value = source;
    if let Some(dest) = dest {
        ops.type_assign_check(&value, dest)?;
    }
    value.make_unique();

    match dest.and_then(|dest| dest.type_ref()) {
        Some(previous) if value.type_ref() != Some(previous) => ops.cast(&value, previous),
        _ => Ok(value),
    }
}
