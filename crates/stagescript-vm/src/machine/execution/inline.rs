//! Inline operator instruction execution
//!
//! Increment, decrement and compound assignments address their target
//! either as a lexically resolved local (`arg0` non-zero, packed slot in
//! `arg1`) or through an alias on the stack (`arg0` zero). The alias forms
//! of inc/dec pop the alias only when `arg1` is non-zero.

use crate::error::VmError;
use crate::machine::result::ExecutionResult;
use crate::machine::ScriptMachine;
use crate::opcode::{unpack_slot, OpCode};
use crate::ops::{type_name, ValueOps};
use crate::program::Code;
use stagescript_types::{FrameId, SlotRef, Value};
use std::rc::Rc;

impl ScriptMachine {
    /// Execute inline operator instructions
    pub(crate) fn execute_inline(
        &mut self,
        frame: FrameId,
        code: &Code,
    ) -> Result<ExecutionResult, VmError> {
        let types = Rc::clone(self.types());
        let ops = ValueOps::new(&types);
        let local = code.arg0 != 0;

        match code.op {
            OpCode::InlineInc | OpCode::InlineDec => {
                let target = self.inline_target(frame, code, 0)?;
                let current = self.slot(&target)?;
                // Only reachable through an alias to an unassigned slot
                if !current.has_data() {
                    return Ok(ExecutionResult::Continue);
                }
                let next = if code.op == OpCode::InlineInc {
                    ops.successor(current)?
                } else {
                    ops.predecessor(current)?
                };
                *self.slot_mut(&target)? = next;
                if !local && code.arg1 != 0 {
                    self.env_mut(frame)?.pop()?;
                }
            }

            OpCode::InlineAddAsi
            | OpCode::InlineSubAsi
            | OpCode::InlineMulAsi
            | OpCode::InlineDivAsi
            | OpCode::InlineFdivAsi
            | OpCode::InlineModAsi
            | OpCode::InlinePowAsi => {
                let target = self.inline_target(frame, code, 1)?;
                let rhs = self.env(frame)?.top()?;
                let current = self.slot(&target)?;
                let result = match code.op {
                    OpCode::InlineAddAsi => ops.add(current, rhs)?,
                    OpCode::InlineSubAsi => ops.subtract(current, rhs)?,
                    OpCode::InlineMulAsi => ops.multiply(current, rhs)?,
                    OpCode::InlineDivAsi => ops.divide(current, rhs)?,
                    OpCode::InlineFdivAsi => ops.fdivide(current, rhs)?,
                    OpCode::InlineModAsi => ops.remainder(current, rhs)?,
                    _ => ops.power(current, rhs)?,
                };
                let result = match current.type_ref() {
                    Some(ty) => ops.cast(&result, ty)?,
                    None => result,
                };
                *self.slot_mut(&target)? = result;
                self.env_mut(frame)?.discard(if local { 1 } else { 2 })?;
            }

            OpCode::InlineCatAsi => {
                let target = self.inline_target(frame, code, 1)?;
                let rhs = self.env(frame)?.top()?.clone();
                ops.concatenate_into(self.slot_mut(&target)?, &rhs)?;
                self.env_mut(frame)?.discard(if local { 1 } else { 2 })?;
            }

            OpCode::InlineNeg | OpCode::InlineNot | OpCode::InlineAbs => {
                let value = self.env(frame)?.top()?;
                let result = match code.op {
                    OpCode::InlineNeg => ops.negative(value)?,
                    OpCode::InlineNot => ops.not(value)?,
                    _ => ops.absolute(value)?,
                };
                *self.env_mut(frame)?.top_mut()? = result;
            }

            OpCode::InlineAdd
            | OpCode::InlineSub
            | OpCode::InlineMul
            | OpCode::InlineDiv
            | OpCode::InlineFdiv
            | OpCode::InlineMod
            | OpCode::InlinePow => {
                let env = self.env(frame)?;
                let position = env.position_from_top(1)?;
                let (left, right) = (&env.stack()[position], &env.stack()[position + 1]);
                let result = match code.op {
                    OpCode::InlineAdd => ops.add(left, right)?,
                    OpCode::InlineSub => ops.subtract(left, right)?,
                    OpCode::InlineMul => ops.multiply(left, right)?,
                    OpCode::InlineDiv => ops.divide(left, right)?,
                    OpCode::InlineFdiv => ops.fdivide(left, right)?,
                    OpCode::InlineMod => ops.remainder(left, right)?,
                    _ => ops.power(left, right)?,
                };
                self.replace_pair(frame, result)?;
            }

            OpCode::InlineApp | OpCode::InlineCat => {
                let env = self.env_mut(frame)?;
                let position = env.position_from_top(1)?;
                let right = env.stack()[position + 1].clone();
                let left = &mut env.stack_mut()[position];
                if code.op == OpCode::InlineApp {
                    ops.append_into(left, &right)?;
                } else {
                    ops.concatenate_into(left, &right)?;
                }
                env.pop()?;
            }

            OpCode::InlineCmpE
            | OpCode::InlineCmpG
            | OpCode::InlineCmpGe
            | OpCode::InlineCmpL
            | OpCode::InlineCmpLe
            | OpCode::InlineCmpNe => {
                let env = self.env(frame)?;
                let position = env.position_from_top(1)?;
                let ordering = ops.compare(&env.stack()[position], &env.stack()[position + 1])?;
                let result = match code.op {
                    OpCode::InlineCmpE => ordering == 0,
                    OpCode::InlineCmpG => ordering > 0,
                    OpCode::InlineCmpGe => ordering >= 0,
                    OpCode::InlineCmpL => ordering < 0,
                    OpCode::InlineCmpLe => ordering <= 0,
                    _ => ordering != 0,
                };
                self.replace_pair(frame, types.boolean_value(result))?;
            }

            OpCode::InlineLogicAnd | OpCode::InlineLogicOr => {
                let env = self.env(frame)?;
                let position = env.position_from_top(1)?;
                let (left, right) = (
                    env.stack()[position].as_boolean(),
                    env.stack()[position + 1].as_boolean(),
                );
                let result = if code.op == OpCode::InlineLogicAnd {
                    left && right
                } else {
                    left || right
                };
                self.replace_pair(frame, types.boolean_value(result))?;
            }

            OpCode::InlineCastVar => {
                let target = code
                    .ty
                    .as_ref()
                    .ok_or_else(|| VmError::Runtime("Cast without a target type.".to_string()))?;
                let value = self.env(frame)?.top()?;
                let checked = code.arg1 != 0;
                let result = match value.type_ref() {
                    Some(from) if checked && from != target => {
                        ops.check_assignable(from, target)?;
                        ops.cast(value, target)?
                    }
                    _ if !checked => ops.cast(value, target)?,
                    _ => return Ok(ExecutionResult::Continue),
                };
                *self.env_mut(frame)?.top_mut()? = result;
            }

            _ => unreachable!("Non-inline opcode in inline handler"),
        }

        Ok(ExecutionResult::Continue)
    }

    /// Slot written by an inc/dec or compound assignment. Alias targets sit
    /// `depth` values below the top.
    fn inline_target(&self, frame: FrameId, code: &Code, depth: usize) -> Result<SlotRef, VmError> {
        if code.arg0 != 0 {
            let (level, index) = unpack_slot(code.arg1);
            let index = index as usize;
            // The current value is an operand, so the local must be assigned
            let (owner, _) = self.find_variable(frame, level, index)?;
            return Ok(SlotRef::Variable { frame: owner, index });
        }

        let env = self.env(frame)?;
        match &env.stack()[env.position_from_top(depth)?] {
            Value::Alias(slot) => Ok(slot.clone()),
            other => Err(VmError::type_error("assignment", "reference", type_name(other))),
        }
    }

    /// Pop two operands, push `result`
    fn replace_pair(&mut self, frame: FrameId, result: Value) -> Result<(), VmError> {
        let env = self.env_mut(frame)?;
        env.pop()?;
        *env.top_mut()? = result;
        Ok(())
    }
}
