//! Loop instruction execution

use crate::error::VmError;
use crate::machine::result::ExecutionResult;
use crate::machine::ScriptMachine;
use crate::opcode::OpCode;
use crate::program::Code;
use stagescript_types::FrameId;

impl ScriptMachine {
    /// Execute loop instructions
    pub(crate) fn execute_loops(
        &mut self,
        frame: FrameId,
        code: &Code,
    ) -> Result<ExecutionResult, VmError> {
        let types = std::rc::Rc::clone(self.types());

        match code.op {
            OpCode::LoopAscent | OpCode::LoopDescent => {
                let env = self.env(frame)?;
                let position = env.position_from_top(1)?;
                let ordering = self
                    .ops()
                    .compare(&env.stack()[position], &env.stack()[position + 1])?;
                let stop = if code.op == OpCode::LoopAscent {
                    ordering <= 0
                } else {
                    ordering >= 0
                };
                self.env_mut(frame)?.push(types.boolean_value(stop));
            }

            OpCode::LoopCount => {
                let env = self.env_mut(frame)?;
                let counter = env.top_mut()?;
                let remaining = counter.as_int();
                if remaining > 0 {
                    *counter = types.int_value(remaining - 1);
                }
                env.push(types.boolean_value(remaining > 0));
            }

            OpCode::LoopForeach => {
                let env = self.env_mut(frame)?;
                let position = env.position_from_top(1)?;
                let counter = env.stack()[position + 1].as_int();
                let next = usize::try_from(counter)
                    .ok()
                    .and_then(|index| env.stack()[position].index_as_array(index))
                    .cloned();

                match next {
                    Some(item) => {
                        env.push(item);
                        env.stack_mut()[position + 1] = types.int_value(counter + 1);
                        env.push(types.boolean_value(false));
                    }
                    None => env.push(types.boolean_value(true)),
                }
            }

            _ => unreachable!("Non-loop opcode in loop handler"),
        }

        Ok(ExecutionResult::Continue)
    }
}
