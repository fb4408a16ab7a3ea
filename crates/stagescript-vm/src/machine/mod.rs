//! Script machine
//!
//! Runs a [`Program`] as a set of cooperative threads. Each thread is a
//! chain of frames (environments) linked through their parents; the
//! thread list holds the innermost frame of every thread. Threads hand
//! over control explicitly (`yield`, `wait`, microthread completion) and
//! the scheduler moves to the previous entry of the list, wrapping from
//! the first entry to the last.
//!
//! Host entry points: [`ScriptMachine::run`], [`ScriptMachine::resume`],
//! [`ScriptMachine::call`] and [`ScriptMachine::interrupt`]. Script faults
//! never escape as `Err`; they are recorded and reported through
//! [`ScriptMachine::fault`] and [`ScriptMachine::state`].

use crate::config::MachineConfig;
use crate::error::{RuntimeFault, VmError};
use crate::opcode::OpCode;
use crate::ops::ValueOps;
use crate::program::{BlockId, BlockKind, Code, Program};
use log::{debug, error, trace, warn};
use stagescript_types::{FrameId, SlotRef, TypeRegistry, Value};
use std::any::Any;
use std::rc::Rc;

// Module structure
mod environment;
mod execution;
mod pool;
mod result;

// Re-export public types
pub use environment::Environment;
pub use pool::EnvironmentPool;

use result::ExecutionResult;

/// Coarse machine state for hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    /// No thread exists yet (fresh or reset)
    Idle,
    /// Inside a host entry point
    Running,
    /// Threads exist but nothing is executing
    Finished,
    /// A script fault is recorded
    Error,
    /// Terminated by the host
    Terminated,
}

/// Script machine
pub struct ScriptMachine {
    program: Rc<Program>,
    types: Rc<TypeRegistry>,
    config: MachineConfig,

    /// Frame storage
    pub(crate) pool: EnvironmentPool,

    /// Innermost frame of every live thread
    pub(crate) threads: Vec<FrameId>,

    /// Index of the running thread in `threads`
    pub(crate) current: usize,

    /// Interrupt frames currently executing, innermost last
    barriers: Vec<FrameId>,

    /// Ends the current step loop
    finished: bool,
    stopped: bool,
    resuming: bool,
    terminated: bool,
    terminate_message: Option<String>,

    fault: Option<RuntimeFault>,

    /// Line of the instruction being executed
    current_line: Option<u32>,

    /// Nesting depth of step loops
    depth: usize,

    host_data: Option<Box<dyn Any>>,
}

impl ScriptMachine {
    /// Create a machine for `program` with the default configuration
    pub fn new(program: Rc<Program>) -> Self {
        Self::with_config(program, MachineConfig::default())
    }

    pub fn with_config(program: Rc<Program>, config: MachineConfig) -> Self {
        let types = Rc::clone(program.types());
        let pool = EnvironmentPool::new(&config);
        Self {
            program,
            types,
            config,
            pool,
            threads: Vec::new(),
            current: 0,
            barriers: Vec::new(),
            finished: false,
            stopped: false,
            resuming: false,
            terminated: false,
            terminate_message: None,
            fault: None,
            current_line: None,
            depth: 0,
            host_data: None,
        }
    }

    pub fn program(&self) -> &Rc<Program> {
        &self.program
    }

    pub fn types(&self) -> &Rc<TypeRegistry> {
        &self.types
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Value operations over this machine's type registry
    pub fn ops(&self) -> ValueOps<'_> {
        ValueOps::new(&self.types)
    }

    // ===== Host entry points =====

    /// Bootstrap the main block and run until every thread has yielded
    /// once. Does nothing when threads already exist.
    pub fn run(&mut self) {
        if !self.accepts_entry() || !self.threads.is_empty() {
            return;
        }

        let main = self.program.main();
        debug!("Starting main block {}", main);
        match self.pool.allocate(None, main) {
            Ok(frame) => {
                self.threads.push(frame);
                self.current = 0;
                self.finished = false;
                self.stopped = false;
                self.resuming = false;
                self.run_code();
            }
            Err(err) => self.raise(err),
        }
    }

    /// Continue after [`ScriptMachine::stop`]; the interrupted call is
    /// executed again with [`ScriptMachine::is_resuming`] set
    pub fn resume(&mut self) {
        if !self.accepts_entry() {
            return;
        }
        self.stopped = false;
        self.finished = false;
        self.resuming = true;
        self.run_code();
    }

    /// Run the named event block as an interrupt, bootstrapping main first
    /// if needed. An unknown event records a fault.
    pub fn call(&mut self, event: &str) {
        if !self.accepts_entry() {
            return;
        }
        let Some(block) = self.program.event(event) else {
            self.raise(VmError::UnknownEvent(event.to_string()));
            return;
        };

        debug!("Calling event '{}'", event);
        self.run();
        if self.fault.is_none() {
            self.interrupt(block);
        }
    }

    /// Run `block` to completion on top of the first thread, then restore
    /// the first thread and the previously current thread
    pub fn interrupt(&mut self, block: BlockId) {
        if !self.accepts_entry() {
            return;
        }
        let Some(&first) = self.threads.first() else {
            warn!("Interrupt of block {} ignored: no thread is running", block);
            return;
        };

        let previous_index = self.current;
        let previous = self.threads.get(previous_index).copied();

        self.current = 0;
        let frame = match self.push_interrupt(first, block) {
            Ok(frame) => frame,
            Err(err) => {
                self.current = previous_index;
                self.raise(err);
                return;
            }
        };

        trace!("Interrupt frame {} for block {}", frame, block);
        self.barriers.push(frame);
        self.finished = false;
        self.run_code();
        self.barriers.pop();
        // An enclosing step loop keeps going unless the interrupt faulted or stopped
        self.finished = self.fault.is_some() || self.stopped;

        self.current = previous
            .and_then(|handle| self.threads.iter().position(|&thread| thread == handle))
            .unwrap_or_else(|| previous_index.min(self.threads.len().saturating_sub(1)));
    }

    fn push_interrupt(&mut self, first: FrameId, block: BlockId) -> Result<FrameId, VmError> {
        self.program.block(block)?;
        let frame = self.pool.allocate(Some(first), block)?;
        self.threads[0] = frame;
        // The thread list's reference now lives in the frame's parent link
        self.pool.release(first)?;
        Ok(frame)
    }

    /// Drop every thread and clear fault, finish and stop flags.
    /// Termination is permanent and survives a reset.
    pub fn reset(&mut self) {
        debug!("Resetting machine ({} threads)", self.threads.len());
        for thread in std::mem::take(&mut self.threads) {
            if let Err(err) = self.pool.release(thread) {
                warn!("Releasing thread {} failed: {}", thread, err);
            }
        }
        self.barriers.clear();
        self.current = 0;
        self.finished = false;
        self.stopped = false;
        self.resuming = false;
        self.fault = None;
        self.current_line = None;
    }

    /// Stop every step loop for good
    pub fn terminate(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!("Terminated: {}", message);
        self.terminated = true;
        self.terminate_message = Some(message);
    }

    /// Leave the step loop after the current instruction. Called from a
    /// native, the native call runs again on [`ScriptMachine::resume`].
    pub fn stop(&mut self) {
        self.finished = true;
        self.stopped = true;
    }

    fn accepts_entry(&self) -> bool {
        !self.terminated && self.fault.is_none()
    }

    // ===== Introspection =====

    pub fn state(&self) -> MachineState {
        if self.terminated {
            MachineState::Terminated
        } else if self.fault.is_some() {
            MachineState::Error
        } else if self.depth > 0 {
            MachineState::Running
        } else if self.threads.is_empty() {
            MachineState::Idle
        } else {
            MachineState::Finished
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn is_resuming(&self) -> bool {
        self.resuming
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn terminate_message(&self) -> Option<&str> {
        self.terminate_message.as_deref()
    }

    pub fn fault(&self) -> Option<&RuntimeFault> {
        self.fault.as_ref()
    }

    pub fn has_error(&self) -> bool {
        self.fault.is_some()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.fault.as_ref().map(|fault| fault.message.as_str())
    }

    pub fn error_line(&self) -> Option<u32> {
        self.fault.as_ref().map(|fault| fault.line)
    }

    pub fn has_event(&self, name: &str) -> bool {
        self.program.event(name).is_some()
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Position of the running thread in [`ScriptMachine::thread_frames`]
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Source line of the instruction executed last
    pub fn current_line(&self) -> Option<u32> {
        self.current_line
    }

    /// Innermost frame of every thread, in scheduling-list order
    pub fn thread_frames(&self) -> &[FrameId] {
        &self.threads
    }

    pub fn frame(&self, handle: FrameId) -> Option<&Environment> {
        self.pool.get(handle).ok()
    }

    pub fn pool(&self) -> &EnvironmentPool {
        &self.pool
    }

    // ===== Host data =====

    /// Attach host state that natives can reach through the machine
    pub fn set_host_data<T: Any>(&mut self, data: T) {
        self.host_data = Some(Box::new(data));
    }

    pub fn host_data<T: Any>(&self) -> Option<&T> {
        self.host_data.as_ref().and_then(|data| data.downcast_ref::<T>())
    }

    pub fn host_data_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.host_data.as_mut().and_then(|data| data.downcast_mut::<T>())
    }

    pub fn take_host_data(&mut self) -> Option<Box<dyn Any>> {
        self.host_data.take()
    }

    // ===== Slots =====

    /// Value an alias points at
    pub fn slot(&self, slot: &SlotRef) -> Result<&Value, VmError> {
        match slot {
            SlotRef::Variable { frame, index } => self
                .pool
                .get(*frame)?
                .variables
                .get(*index)
                .ok_or_else(|| VmError::DanglingReference(format!("variable {} of {}", index, frame))),
            SlotRef::Stack { frame, index, tag } => {
                let env = self.pool.get(*frame)?;
                stack_entry(env, *frame, *index, *tag)?;
                Ok(&env.stack()[*index])
            }
            SlotRef::Element { base, index } => {
                let array = self.slot(base)?;
                let items = array
                    .array_items()
                    .ok_or_else(|| VmError::type_error("element access", "array", crate::ops::type_name(array)))?;
                items.get(*index).ok_or(VmError::IndexOutOfBounds {
                    index: *index as i64,
                    length: items.len(),
                })
            }
        }
    }

    /// Writable value an alias points at; element slots detach the
    /// containing array from any sharers first
    pub fn slot_mut(&mut self, slot: &SlotRef) -> Result<&mut Value, VmError> {
        match slot {
            SlotRef::Variable { frame, index } => self
                .pool
                .get_mut(*frame)?
                .variables
                .get_mut(*index)
                .ok_or_else(|| VmError::DanglingReference(format!("variable {} of {}", index, frame))),
            SlotRef::Stack { frame, index, tag } => {
                let env = self.pool.get_mut(*frame)?;
                stack_entry(env, *frame, *index, *tag)?;
                Ok(&mut env.stack_mut()[*index])
            }
            SlotRef::Element { base, index } => {
                let array = self.slot_mut(base)?;
                let items = array.detach_array().ok_or_else(|| {
                    VmError::type_error("element access", "array", "a non-array value")
                })?;
                let length = items.len();
                items.get_mut(*index).ok_or(VmError::IndexOutOfBounds {
                    index: *index as i64,
                    length,
                })
            }
        }
    }

    // ===== Frames & variables =====

    pub(crate) fn env(&self, frame: FrameId) -> Result<&Environment, VmError> {
        self.pool.get(frame)
    }

    pub(crate) fn env_mut(&mut self, frame: FrameId) -> Result<&mut Environment, VmError> {
        self.pool.get_mut(frame)
    }

    /// Nearest frame on the parent chain whose block sits at `level`
    pub(crate) fn resolve_variable(
        &self,
        from: FrameId,
        level: u32,
        index: usize,
    ) -> Result<FrameId, VmError> {
        let mut cursor = Some(from);
        while let Some(handle) = cursor {
            let env = self.pool.get(handle)?;
            if self.program.block(env.block)?.level == level {
                return Ok(handle);
            }
            cursor = env.parent;
        }
        Err(VmError::VariableNotFound { level, index })
    }

    /// Owner frame and value of an initialized variable
    pub(crate) fn find_variable(
        &self,
        from: FrameId,
        level: u32,
        index: usize,
    ) -> Result<(FrameId, &Value), VmError> {
        let owner = self.resolve_variable(from, level, index)?;
        match self.pool.get(owner)?.variables.get(index) {
            Some(value) if value.has_data() => Ok((owner, value)),
            _ => Err(VmError::VariableNotInitialized { level, index }),
        }
    }

    /// Move the top `count` values of `from` onto `to`, first argument on top
    pub(crate) fn pass_args(&mut self, from: FrameId, to: FrameId, count: usize) -> Result<(), VmError> {
        let source = self.pool.get_mut(from)?;
        let depth = source.stack().len();
        if depth < count {
            return Err(VmError::ArgumentUnderflow {
                stack: depth,
                arguments: count,
            });
        }
        let args = source.split_top(count)?;
        let target = self.pool.get_mut(to)?;
        for arg in args.into_iter().rev() {
            target.push(arg);
        }
        Ok(())
    }

    // ===== Scheduling =====

    fn current_thread(&self) -> Result<FrameId, VmError> {
        self.threads
            .get(self.current)
            .copied()
            .ok_or_else(|| VmError::Internal(format!("no thread at index {}", self.current)))
    }

    /// Start `block` as a new thread right after the current one and make
    /// it current
    pub(crate) fn add_thread(&mut self, block: BlockId) -> Result<FrameId, VmError> {
        let spawner = self.current_thread()?;
        let frame = self.pool.allocate(Some(spawner), block)?;
        self.current += 1;
        self.threads.insert(self.current, frame);
        trace!("Spawned thread {} ({} threads)", frame, self.threads.len());
        Ok(frame)
    }

    /// Push a child frame for `block` onto the current thread
    pub(crate) fn add_child_block(&mut self, block: BlockId) -> Result<FrameId, VmError> {
        let parent = self.current_thread()?;
        let frame = self.pool.allocate(Some(parent), block)?;
        self.threads[self.current] = frame;
        // The thread list's reference now lives in the child's parent link
        self.pool.release(parent)?;
        Ok(frame)
    }

    /// Point the current thread at `frame`, dropping the frame it held
    fn replace_current(&mut self, frame: FrameId) -> Result<(), VmError> {
        self.pool.retain(frame)?;
        let previous = std::mem::replace(&mut self.threads[self.current], frame);
        self.pool.release(previous)
    }

    pub(crate) fn yield_thread(&mut self) {
        if self.threads.is_empty() {
            self.finished = true;
            return;
        }
        self.current = if self.current == 0 {
            self.threads.len() - 1
        } else {
            self.current - 1
        };
    }

    // ===== Execution =====

    fn run_code(&mut self) {
        if self.threads.is_empty() {
            self.current = 0;
            return;
        }

        self.depth += 1;
        while !self.finished && !self.terminated {
            if let Err(err) = self.step() {
                self.raise(err);
            }
        }
        self.depth -= 1;
    }

    /// Execute one instruction of the current thread, or complete its
    /// innermost frame
    fn step(&mut self) -> Result<(), VmError> {
        let Some(&handle) = self.threads.get(self.current) else {
            self.finished = true;
            return Ok(());
        };
        let program = Rc::clone(&self.program);

        let env = self.pool.get_mut(handle)?;
        if env.wait_count > 0 {
            env.wait_count -= 1;
            self.yield_thread();
            return Ok(());
        }

        let block = program.block(env.block)?;
        let Some(code) = block.codes.get(env.ip) else {
            return self.complete_frame(handle, block.kind);
        };
        env.ip += 1;
        self.current_line = Some(code.line);

        if self.execute_instruction(handle, code)? == ExecutionResult::Yield {
            self.yield_thread();
        }

        if let Some(max) = self.config.max_stack {
            if let Ok(env) = self.pool.get(handle) {
                if env.stack().len() > max {
                    return Err(VmError::StackOverflow(max));
                }
            }
        }
        Ok(())
    }

    /// Dispatch to the handler for the instruction's category
    fn execute_instruction(
        &mut self,
        frame: FrameId,
        code: &Code,
    ) -> Result<ExecutionResult, VmError> {
        match code.op {
            OpCode::VarAlloc
            | OpCode::VarFormat
            | OpCode::Pop
            | OpCode::PushValue
            | OpCode::PushVariable
            | OpCode::PushVariableAlias
            | OpCode::DupN
            | OpCode::Swap
            | OpCode::LoadAlias
            | OpCode::UnloadAlias
            | OpCode::MakeUnique => self.execute_stack(frame, code),

            OpCode::Wait
            | OpCode::Yield
            | OpCode::Jump
            | OpCode::JumpIf
            | OpCode::JumpIfNot
            | OpCode::JumpIfNopop
            | OpCode::JumpIfNotNopop
            | OpCode::SubReturn
            | OpCode::CompareE
            | OpCode::CompareG
            | OpCode::CompareGe
            | OpCode::CompareL
            | OpCode::CompareLe
            | OpCode::CompareNe => self.execute_control(frame, code),

            OpCode::CopyAssign | OpCode::RefAssign => self.execute_assign(frame, code),

            OpCode::Call | OpCode::CallAndPushResult => self.execute_calls(frame, code),

            OpCode::LoopAscent | OpCode::LoopDescent | OpCode::LoopCount | OpCode::LoopForeach => {
                self.execute_loops(frame, code)
            }

            OpCode::ConstructArray
            | OpCode::InlineIndexArray
            | OpCode::InlineIndexArray2
            | OpCode::InlineLengthArray => self.execute_arrays(frame, code),

            _ => self.execute_inline(frame, code),
        }
    }

    /// Finish the innermost frame of the current thread
    fn complete_frame(&mut self, handle: FrameId, kind: BlockKind) -> Result<(), VmError> {
        let env = self.pool.get(handle)?;
        let has_result = env.has_result;
        let Some(parent) = env.parent else {
            // Main chain done
            self.finished = true;
            return Ok(());
        };

        if self.barriers.last() == Some(&handle) {
            self.replace_current(parent)?;
            self.finished = true;
            return Ok(());
        }

        if kind == BlockKind::Microthread {
            let thread = self.threads.remove(self.current);
            self.pool.release(thread)?;
            trace!("Thread {} retired ({} threads)", thread, self.threads.len());
            self.yield_thread();
            return Ok(());
        }

        if has_result {
            let result = env.variables.first().cloned().unwrap_or_default();
            self.pool.get_mut(parent)?.push(result);
        }
        self.replace_current(parent)
    }

    /// Record a fault and end the step loop; fatal faults also terminate
    pub(crate) fn raise(&mut self, err: VmError) {
        let line = self.current_line.unwrap_or(0);
        let fault = RuntimeFault::new(&err, line);
        if fault.fatal {
            error!("Fatal machine error at line {}: {}", line, fault.message);
            self.terminated = true;
            self.terminate_message = Some(fault.message.clone());
        } else {
            warn!("Script error at line {}: {}", line, fault.message);
        }
        self.fault = Some(fault);
        self.finished = true;
    }
}

/// Check that a stack alias still names the entry it was taken from
fn stack_entry(env: &Environment, frame: FrameId, index: usize, tag: u64) -> Result<(), VmError> {
    if env.stack_tag(index) == Some(tag) {
        Ok(())
    } else {
        Err(VmError::DanglingReference(format!("stack slot {} of {}", index, frame)))
    }
}
