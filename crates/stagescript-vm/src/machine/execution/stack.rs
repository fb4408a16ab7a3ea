//! Stack and variable instruction execution

use crate::error::VmError;
use crate::machine::result::ExecutionResult;
use crate::machine::ScriptMachine;
use crate::opcode::OpCode;
use crate::ops::type_name;
use crate::program::Code;
use stagescript_types::{FrameId, SlotRef, Value};

impl ScriptMachine {
    /// Execute stack and variable instructions
    pub(crate) fn execute_stack(
        &mut self,
        frame: FrameId,
        code: &Code,
    ) -> Result<ExecutionResult, VmError> {
        match code.op {
            OpCode::VarAlloc => {
                self.env_mut(frame)?
                    .variables
                    .resize(code.arg0 as usize, Value::Empty);
            }

            OpCode::VarFormat => {
                let env = self.env_mut(frame)?;
                let start = code.arg0 as usize;
                let end = start.saturating_add(code.arg1 as usize);
                for variable in env.variables.iter_mut().take(end).skip(start) {
                    *variable = Value::Empty;
                }
            }

            OpCode::Pop => {
                self.env_mut(frame)?.discard(code.arg0 as usize)?;
            }

            OpCode::PushValue => {
                self.env_mut(frame)?.push(code.data.clone());
            }

            OpCode::PushVariable => {
                let (_, value) = self.find_variable(frame, code.arg0, code.arg1 as usize)?;
                let value = value.clone();
                self.env_mut(frame)?.push(value);
            }

            OpCode::PushVariableAlias => {
                // Assignment target: the slot may still be unassigned
                let index = code.arg1 as usize;
                let owner = self.resolve_variable(frame, code.arg0, index)?;
                self.env_mut(owner)?.variable_slot(index);
                self.env_mut(frame)?
                    .push(Value::alias(SlotRef::Variable { frame: owner, index }));
            }

            OpCode::DupN => {
                let env = self.env_mut(frame)?;
                if let Ok(position) = env.position_from_top(code.arg0 as usize) {
                    let value = env.stack()[position].clone();
                    env.push(value);
                }
            }

            OpCode::Swap => {
                self.env_mut(frame)?.swap_top();
            }

            OpCode::LoadAlias => {
                let env = self.env_mut(frame)?;
                if let Ok(index) = env.position_from_top(code.arg0 as usize) {
                    if let Some(tag) = env.stack_tag(index) {
                        env.push(Value::alias(SlotRef::Stack { frame, index, tag }));
                    }
                }
            }

            OpCode::UnloadAlias => {
                let slot = match self.env(frame)?.top()? {
                    Value::Alias(slot) => slot.clone(),
                    other => return Err(VmError::type_error("dereference", "reference", type_name(other))),
                };
                let value = self.slot(&slot)?.clone();
                *self.env_mut(frame)?.top_mut()? = value;
            }

            OpCode::MakeUnique => {
                let env = self.env_mut(frame)?;
                if let Ok(position) = env.position_from_top(code.arg0 as usize) {
                    env.stack_mut()[position].make_unique();
                }
            }

            _ => unreachable!("Non-stack opcode in stack handler"),
        }

        Ok(ExecutionResult::Continue)
    }
}
