//! Array instruction execution

use crate::error::VmError;
use crate::machine::result::ExecutionResult;
use crate::machine::ScriptMachine;
use crate::opcode::OpCode;
use crate::ops::{type_name, ValueOps};
use crate::program::Code;
use stagescript_types::{FrameId, SlotRef, Value};
use std::rc::Rc;

impl ScriptMachine {
    /// Execute array construction, indexing and length instructions
    pub(crate) fn execute_arrays(
        &mut self,
        frame: FrameId,
        code: &Code,
    ) -> Result<ExecutionResult, VmError> {
        let types = Rc::clone(self.types());
        let ops = ValueOps::new(&types);

        match code.op {
            OpCode::ConstructArray => {
                let count = code.arg0 as usize;
                if count == 0 {
                    self.env_mut(frame)?.push(types.empty_array());
                    return Ok(ExecutionResult::Continue);
                }

                let env = self.env(frame)?;
                let start = env.position_from_top(count - 1)?;
                let values = &env.stack()[start..];
                let element_type = values[0].type_ref().cloned().ok_or_else(|| {
                    VmError::type_error("array construction", "a typed value", type_name(&values[0]))
                })?;
                let array_type = types.get_array_type(&element_type);

                let mut items = Vec::with_capacity(count);
                for value in values {
                    ops.append_check(&array_type, value)?;
                    if value.kind() != element_type.kind() {
                        items.push(ops.cast(value, &element_type)?);
                    } else {
                        items.push(value.clone());
                    }
                }
                let array = types.array_value(&element_type, items);

                let env = self.env_mut(frame)?;
                env.discard(count)?;
                env.push(array);
            }

            OpCode::InlineIndexArray => {
                let env = self.env(frame)?;
                let position = env.position_from_top(1)?;
                let base = match &env.stack()[position] {
                    Value::Alias(slot) => slot.clone(),
                    other => {
                        return Err(VmError::type_error("indexing", "array reference", type_name(other)))
                    }
                };
                let index = env.stack()[position + 1].clone();

                let array = self.slot(&base)?;
                let length = array
                    .array_items()
                    .ok_or_else(|| VmError::type_error("indexing", "array", type_name(array)))?
                    .len();
                let index = ops.index_position(&index, length)?;

                let env = self.env_mut(frame)?;
                env.pop()?;
                *env.top_mut()? = Value::alias(SlotRef::Element {
                    base: Box::new(base),
                    index,
                });
            }

            OpCode::InlineIndexArray2 => {
                let env = self.env(frame)?;
                let position = env.position_from_top(1)?;
                let element = ops
                    .index(&env.stack()[position], &env.stack()[position + 1])?
                    .clone();

                let env = self.env_mut(frame)?;
                env.pop()?;
                *env.top_mut()? = element;
            }

            OpCode::InlineLengthArray => {
                let length = ops.length(self.env(frame)?.top()?);
                *self.env_mut(frame)?.top_mut()? = length;
            }

            _ => unreachable!("Non-array opcode in array handler"),
        }

        Ok(ExecutionResult::Continue)
    }
}
