//! Compiled program container
//!
//! A [`Program`] is what a compiler hands to the machine: blocks of
//! instructions, a designated main block, a name -> block map of events and
//! the compile-time error fields. Machines share a program through `Rc` and
//! never mutate it.

use crate::builtins::registry::NativeFn;
use crate::error::VmError;
use crate::opcode::{pack_slot, OpCode};
use serde::{Deserialize, Serialize};
use stagescript_types::{TypeRef, TypeRegistry, Value};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Index of a block inside its program
pub type BlockId = usize;

/// What a block is, which decides how calls and returns treat it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Anonymous nested block (loop body, branch)
    #[default]
    Normal,
    Sub,
    Function,
    /// Spawned as its own scheduler thread when called
    Microthread,
}

impl BlockKind {
    /// Named callables stop `sub_return` unwinding
    pub fn is_callable(self) -> bool {
        matches!(
            self,
            BlockKind::Sub | BlockKind::Function | BlockKind::Microthread
        )
    }
}

/// Native implementation bound to a block
#[derive(Clone, Copy)]
pub enum NativeBinding {
    Function(NativeFn),
    /// First-class function trampoline: the first argument names the callee
    Invoke,
}

impl fmt::Debug for NativeBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeBinding::Function(_) => write!(f, "Function(<native>)"),
            NativeBinding::Invoke => write!(f, "Invoke"),
        }
    }
}

/// One instruction
#[derive(Debug, Clone)]
pub struct Code {
    pub op: OpCode,
    pub arg0: u32,
    pub arg1: u32,
    /// Literal for `PushValue`
    pub data: Value,
    /// Source line for error attribution
    pub line: u32,
    /// Target of call instructions
    pub block: Option<BlockId>,
    /// Target of `InlineCastVar`
    pub ty: Option<TypeRef>,
}

impl Code {
    pub fn new(op: OpCode) -> Self {
        Self {
            op,
            arg0: 0,
            arg1: 0,
            data: Value::Empty,
            line: 0,
            block: None,
            ty: None,
        }
    }

    /// Instruction with both integer operands
    pub fn op(op: OpCode, arg0: u32, arg1: u32) -> Self {
        Self::new(op).with_args(arg0, arg1)
    }

    /// `PushValue` of a literal
    pub fn push(value: Value) -> Self {
        Self {
            data: value,
            ..Self::new(OpCode::PushValue)
        }
    }

    /// `Call`/`CallAndPushResult` of `block` with `argc` arguments
    pub fn call(op: OpCode, block: BlockId, argc: u32) -> Self {
        Self {
            block: Some(block),
            ..Self::op(op, 0, argc)
        }
    }

    /// Inline op addressing a local through a packed slot
    pub fn inline_local(op: OpCode, level: u32, index: u32) -> Self {
        Self::op(op, 1, pack_slot(level, index))
    }

    /// `InlineCastVar` to `ty`, checked or unchecked
    pub fn cast(ty: TypeRef, checked: bool) -> Self {
        Self {
            ty: Some(ty),
            ..Self::op(OpCode::InlineCastVar, 0, checked as u32)
        }
    }

    pub fn with_args(mut self, arg0: u32, arg1: u32) -> Self {
        self.arg0 = arg0;
        self.arg1 = arg1;
        self
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }
}

/// A compiled unit of instructions
#[derive(Debug, Clone)]
pub struct Block {
    pub name: String,
    /// Lexical depth, matched when resolving variables
    pub level: u32,
    pub kind: BlockKind,
    /// Declared arity
    pub arguments: usize,
    /// When set, the block is native and `codes` is never executed
    pub native: Option<NativeBinding>,
    pub codes: Vec<Code>,
}

impl Block {
    pub fn new(name: impl Into<String>, level: u32, kind: BlockKind) -> Self {
        Self {
            name: name.into(),
            level,
            kind,
            arguments: 0,
            native: None,
            codes: Vec::new(),
        }
    }

    /// Block backed by a native function
    pub fn native(name: impl Into<String>, arguments: usize, func: NativeFn) -> Self {
        Self {
            arguments,
            native: Some(NativeBinding::Function(func)),
            ..Self::new(name, 0, BlockKind::Function)
        }
    }

    /// The `invoke` trampoline
    pub fn invoke() -> Self {
        Self {
            native: Some(NativeBinding::Invoke),
            ..Self::new("invoke", 0, BlockKind::Function)
        }
    }

    pub fn with_arguments(mut self, arguments: usize) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_codes(mut self, codes: Vec<Code>) -> Self {
        self.codes = codes;
        self
    }

    /// Append an instruction, returning its index
    pub fn add_code(&mut self, code: Code) -> usize {
        self.codes.push(code);
        self.codes.len() - 1
    }

    pub fn is_native(&self) -> bool {
        self.native.is_some()
    }
}

/// Error reported by the compiler that produced a program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileFault {
    pub message: String,
    pub line: u32,
}

/// Compiled program
#[derive(Debug)]
pub struct Program {
    types: Rc<TypeRegistry>,
    blocks: Vec<Block>,
    main: BlockId,
    events: HashMap<String, BlockId>,
    compile_error: Option<CompileFault>,
}

impl Program {
    /// Empty program with a fresh type registry
    pub fn new() -> Self {
        Self::with_types(Rc::new(TypeRegistry::new()))
    }

    /// Empty program sharing an existing type registry
    pub fn with_types(types: Rc<TypeRegistry>) -> Self {
        Self {
            types,
            blocks: Vec::new(),
            main: 0,
            events: HashMap::new(),
            compile_error: None,
        }
    }

    pub fn types(&self) -> &Rc<TypeRegistry> {
        &self.types
    }

    pub fn add_block(&mut self, block: Block) -> BlockId {
        self.blocks.push(block);
        self.blocks.len() - 1
    }

    pub fn block(&self, id: BlockId) -> Result<&Block, VmError> {
        self.blocks.get(id).ok_or(VmError::InvalidBlock(id))
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.blocks.get_mut(id)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn set_main(&mut self, id: BlockId) {
        self.main = id;
    }

    pub fn main(&self) -> BlockId {
        self.main
    }

    pub fn add_event(&mut self, name: impl Into<String>, id: BlockId) {
        self.events.insert(name.into(), id);
    }

    pub fn event(&self, name: &str) -> Option<BlockId> {
        self.events.get(name).copied()
    }

    pub fn events(&self) -> &HashMap<String, BlockId> {
        &self.events
    }

    /// Record a compile-time error
    pub fn set_compile_error(&mut self, message: impl Into<String>, line: u32) {
        self.compile_error = Some(CompileFault {
            message: message.into(),
            line,
        });
    }

    pub fn compile_error(&self) -> Option<&CompileFault> {
        self.compile_error.as_ref()
    }

    pub fn has_compile_error(&self) -> bool {
        self.compile_error.is_some()
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}
