//! Control flow and scheduling instruction execution

use crate::error::VmError;
use crate::machine::result::ExecutionResult;
use crate::machine::ScriptMachine;
use crate::opcode::OpCode;
use crate::program::Code;
use stagescript_types::FrameId;
use std::rc::Rc;

impl ScriptMachine {
    /// Execute control flow instructions
    pub(crate) fn execute_control(
        &mut self,
        frame: FrameId,
        code: &Code,
    ) -> Result<ExecutionResult, VmError> {
        match code.op {
            OpCode::Wait => {
                let env = self.env_mut(frame)?;
                let ticks = env.pop()?.as_int();
                if ticks < 1 {
                    return Ok(ExecutionResult::Continue);
                }
                env.wait_count = ticks - 1;
                Ok(ExecutionResult::Yield)
            }

            OpCode::Yield => Ok(ExecutionResult::Yield),

            OpCode::Jump => {
                self.env_mut(frame)?.ip = code.arg0 as usize;
                Ok(ExecutionResult::Continue)
            }

            OpCode::JumpIf | OpCode::JumpIfNot => {
                let env = self.env_mut(frame)?;
                let condition = env.pop()?.as_boolean();
                if condition == (code.op == OpCode::JumpIf) {
                    env.ip = code.arg0 as usize;
                }
                Ok(ExecutionResult::Continue)
            }

            OpCode::JumpIfNopop | OpCode::JumpIfNotNopop => {
                let env = self.env_mut(frame)?;
                let condition = env.top()?.as_boolean();
                if condition == (code.op == OpCode::JumpIfNopop) {
                    env.ip = code.arg0 as usize;
                }
                Ok(ExecutionResult::Continue)
            }

            OpCode::SubReturn => {
                let program = Rc::clone(self.program());
                let mut cursor = Some(frame);
                while let Some(handle) = cursor {
                    let env = self.env_mut(handle)?;
                    let block = program.block(env.block)?;
                    env.ip = block.codes.len();
                    if block.kind.is_callable() {
                        break;
                    }
                    cursor = env.parent;
                }
                Ok(ExecutionResult::Continue)
            }

            OpCode::CompareE
            | OpCode::CompareG
            | OpCode::CompareGe
            | OpCode::CompareL
            | OpCode::CompareLe
            | OpCode::CompareNe => {
                let ordering = self.env(frame)?.top()?.as_int();
                let result = match code.op {
                    OpCode::CompareE => ordering == 0,
                    OpCode::CompareG => ordering > 0,
                    OpCode::CompareGe => ordering >= 0,
                    OpCode::CompareL => ordering < 0,
                    OpCode::CompareLe => ordering <= 0,
                    _ => ordering != 0,
                };
                let value = self.types().boolean_value(result);
                *self.env_mut(frame)?.top_mut()? = value;
                Ok(ExecutionResult::Continue)
            }

            _ => unreachable!("Non-control opcode in control handler"),
        }
    }
}
