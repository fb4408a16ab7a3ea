//! Program builders and accessors shared by the machine tests.

use crate::builtins::NativeFn;
use crate::error::VmError;
use crate::machine::ScriptMachine;
use crate::opcode::OpCode;
use crate::program::{Block, BlockId, BlockKind, Code, Program};
use stagescript_types::{FrameId, TypeRegistry, Value};
use std::rc::Rc;

/// Builds a program block by block
pub struct ScriptBuilder {
    program: Program,
    types: Rc<TypeRegistry>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        // RUST_LOG=trace shows scheduling while debugging a test
        let _ = env_logger::builder().is_test(true).try_init();
        let program = Program::new();
        let types = Rc::clone(program.types());
        Self { program, types }
    }

    pub fn types(&self) -> Rc<TypeRegistry> {
        Rc::clone(&self.types)
    }

    pub fn block(&mut self, name: &str, level: u32, kind: BlockKind, codes: Vec<Code>) -> BlockId {
        self.program
            .add_block(Block::new(name, level, kind).with_codes(codes))
    }

    /// Function block taking `arguments` values; its result is local 0
    pub fn function(&mut self, name: &str, level: u32, arguments: usize, codes: Vec<Code>) -> BlockId {
        self.program.add_block(
            Block::new(name, level, BlockKind::Function)
                .with_arguments(arguments)
                .with_codes(codes),
        )
    }

    pub fn microthread(&mut self, name: &str, codes: Vec<Code>) -> BlockId {
        self.block(name, 1, BlockKind::Microthread, codes)
    }

    pub fn native(&mut self, name: &str, arity: usize, func: NativeFn) -> BlockId {
        self.program.add_block(Block::native(name, arity, func))
    }

    pub fn add(&mut self, block: Block) -> BlockId {
        self.program.add_block(block)
    }

    /// Add a block now, fill its instructions later
    pub fn reserve(&mut self, name: &str, level: u32, kind: BlockKind) -> BlockId {
        self.block(name, level, kind, Vec::new())
    }

    pub fn set_codes(&mut self, id: BlockId, codes: Vec<Code>) {
        if let Some(block) = self.program.block_mut(id) {
            block.codes = codes;
        }
    }

    /// Level 0 block that runs first
    pub fn main(&mut self, codes: Vec<Code>) -> BlockId {
        let id = self.block("main", 0, BlockKind::Normal, codes);
        self.program.set_main(id);
        id
    }

    /// Level 1 event handler
    pub fn event(&mut self, name: &str, codes: Vec<Code>) -> BlockId {
        let id = self.block(name, 1, BlockKind::Sub, codes);
        self.program.add_event(name, id);
        id
    }

    pub fn build(self) -> Rc<Program> {
        Rc::new(self.program)
    }

    pub fn machine(self) -> ScriptMachine {
        ScriptMachine::new(self.build())
    }

    /// Machine with an empty trace attached for [`record`]
    pub fn traced_machine(self) -> ScriptMachine {
        let mut machine = self.machine();
        machine.set_host_data(Vec::<i64>::new());
        machine
    }
}

// ===== Instruction shorthands =====

pub fn push(value: Value) -> Code {
    Code::push(value)
}

pub fn op(op: OpCode) -> Code {
    Code::new(op)
}

pub fn op_arg(op: OpCode, arg0: u32) -> Code {
    Code::op(op, arg0, 0)
}

pub fn alloc(count: u32) -> Code {
    Code::op(OpCode::VarAlloc, count, 0)
}

pub fn load(level: u32, index: u32) -> Code {
    Code::op(OpCode::PushVariable, level, index)
}

pub fn load_alias(level: u32, index: u32) -> Code {
    Code::op(OpCode::PushVariableAlias, level, index)
}

pub fn store(level: u32, index: u32) -> Code {
    Code::op(OpCode::CopyAssign, level, index)
}

pub fn call(block: BlockId, argc: u32) -> Code {
    Code::call(OpCode::Call, block, argc)
}

pub fn call_result(block: BlockId, argc: u32) -> Code {
    Code::call(OpCode::CallAndPushResult, block, argc)
}

/// `push n; wait`
pub fn wait(types: &TypeRegistry, ticks: i64) -> Vec<Code> {
    vec![push(types.int_value(ticks)), op(OpCode::Wait)]
}

/// `push n; call record`
pub fn trace_point(types: &TypeRegistry, record_block: BlockId, mark: i64) -> Vec<Code> {
    vec![push(types.int_value(mark)), call(record_block, 1)]
}

// ===== Natives =====

/// Append the argument to the machine's trace
pub fn record(machine: &mut ScriptMachine, args: &[Value]) -> Result<Value, VmError> {
    let mark = args.first().map(Value::as_int).unwrap_or_default();
    if let Some(trace) = machine.host_data_mut::<Vec<i64>>() {
        trace.push(mark);
    }
    Ok(Value::Empty)
}

// ===== Accessors =====

pub fn trace(machine: &ScriptMachine) -> Vec<i64> {
    machine.host_data::<Vec<i64>>().cloned().unwrap_or_default()
}

/// Outermost frame of the first thread (the main block's frame)
pub fn root_frame(machine: &ScriptMachine) -> FrameId {
    let mut frame = machine.thread_frames()[0];
    while let Some(parent) = machine.frame(frame).and_then(|env| env.parent()) {
        frame = parent;
    }
    frame
}

/// Local `index` of the main block's frame
pub fn global(machine: &ScriptMachine, index: usize) -> Value {
    machine
        .frame(root_frame(machine))
        .and_then(|env| env.variables().get(index).cloned())
        .unwrap_or_default()
}

/// Operand stack of the main block's frame
pub fn root_stack(machine: &ScriptMachine) -> Vec<Value> {
    machine
        .frame(root_frame(machine))
        .map(|env| env.stack().to_vec())
        .unwrap_or_default()
}
