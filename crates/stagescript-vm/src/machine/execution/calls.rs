//! Call instruction execution
//!
//! A call names its target block in `code.block` and its argument count in
//! `arg1`. Natives run immediately on a copy of the arguments. Script
//! blocks get a fresh frame: microthreads become a new thread, everything
//! else a child frame on the calling thread. The `invoke` trampoline reads
//! the real target from its first argument, an int holding a block id.

use crate::error::VmError;
use crate::machine::result::ExecutionResult;
use crate::machine::ScriptMachine;
use crate::opcode::OpCode;
use crate::program::{BlockId, BlockKind, Code, NativeBinding};
use stagescript_types::{FrameId, Value};
use std::rc::Rc;

impl ScriptMachine {
    /// Execute call instructions
    pub(crate) fn execute_calls(
        &mut self,
        frame: FrameId,
        code: &Code,
    ) -> Result<ExecutionResult, VmError> {
        let push_result = code.op == OpCode::CallAndPushResult;
        let argc = code.arg1 as usize;

        let depth = self.env(frame)?.stack().len();
        if depth < argc {
            return Err(VmError::ArgumentUnderflow {
                stack: depth,
                arguments: argc,
            });
        }

        let target = code
            .block
            .ok_or_else(|| VmError::InvalidFunction("call without a target block".to_string()))?;
        let program = Rc::clone(self.program());
        let callee = program.block(target)?;

        match callee.native {
            Some(NativeBinding::Function(func)) => {
                let args = self.env(frame)?.stack()[depth - argc..].to_vec();
                let result = func(self, &args)?;
                if self.is_stopped() {
                    // Run the call again on resume
                    let env = self.env_mut(frame)?;
                    env.ip = env.ip.saturating_sub(1);
                } else {
                    self.resuming = false;
                    self.finish_native_call(frame, argc, push_result, result)?;
                }
            }

            Some(NativeBinding::Invoke) => self.invoke(frame, argc, push_result)?,

            None if callee.kind == BlockKind::Microthread => {
                let thread = self.add_thread(target)?;
                self.pass_args(frame, thread, argc)?;
            }

            None => {
                let child = self.add_child_block(target)?;
                self.env_mut(child)?.has_result = push_result;
                self.pass_args(frame, child, argc)?;
            }
        }

        Ok(ExecutionResult::Continue)
    }

    /// Call through a function value: stack holds [function][args...]
    fn invoke(&mut self, frame: FrameId, argc: usize, push_result: bool) -> Result<(), VmError> {
        if argc == 0 {
            return Err(VmError::InvalidFunction(
                "invoke without a function value".to_string(),
            ));
        }
        let env = self.env(frame)?;
        let base = env.stack().len() - argc;
        let function = &env.stack()[base];
        let target = function_target(function)?;

        let program = Rc::clone(self.program());
        let callee = program.block(target)?;
        if argc - 1 != callee.arguments {
            return Err(VmError::InvalidFunction(format!(
                "{} expects {} arguments, got {}",
                callee.name,
                callee.arguments,
                argc - 1
            )));
        }

        match callee.native {
            Some(NativeBinding::Function(func)) => {
                let args = self.env(frame)?.stack()[base + 1..].to_vec();
                let result = func(self, &args)?;
                self.finish_native_call(frame, argc, push_result, result)?;
            }

            Some(NativeBinding::Invoke) => {
                return Err(VmError::InvalidFunction(
                    "invoke cannot target itself".to_string(),
                ))
            }

            None if callee.kind == BlockKind::Microthread => {
                let thread = self.add_thread(target)?;
                self.pass_args(frame, thread, callee.arguments)?;
                let env = self.env_mut(frame)?;
                env.pop()?;
                if push_result {
                    env.push(Value::Empty);
                }
            }

            None => {
                let child = self.add_child_block(target)?;
                self.env_mut(child)?.has_result = push_result;
                self.pass_args(frame, child, callee.arguments)?;
                self.env_mut(frame)?.pop()?;
            }
        }
        Ok(())
    }

    fn finish_native_call(
        &mut self,
        frame: FrameId,
        argc: usize,
        push_result: bool,
        result: Value,
    ) -> Result<(), VmError> {
        let env = self.env_mut(frame)?;
        env.discard(argc)?;
        if push_result {
            env.push(result);
        }
        Ok(())
    }
}

/// Block id carried by a function value
fn function_target(function: &Value) -> Result<BlockId, VmError> {
    if !function.has_data() || function.is_array() {
        return Err(VmError::InvalidFunction(format!(
            "{} is not a function",
            crate::ops::type_name(function)
        )));
    }
    let id = function.as_int();
    BlockId::try_from(id).map_err(|_| VmError::InvalidFunction(format!("{} is not a function", id)))
}
