//! StageScript Virtual Machine
//!
//! This crate runs compiled StageScript programs: a stack-based bytecode
//! interpreter with cooperative, non-preemptive threads driven one scheduler
//! tick at a time by an embedding host.
//!
//! # Architecture
//!
//! - A [`Program`] is an immutable set of blocks (main, subs, functions,
//!   microthreads, natives) plus a name → block event table
//! - Every block activation gets an environment from a generation-checked
//!   pool; frames link to their lexical parent by handle
//! - The [`ScriptMachine`] keeps the innermost frame of every thread and
//!   steps them round-robin until every thread has yielded
//! - Runtime faults are recorded on the machine, never thrown at the host
//!
//! # Modules
//!
//! - `opcode`: Instruction set
//! - `program`: Blocks, instructions and the program container
//! - `machine`: Scheduler, frames, frame pool and instruction handlers
//! - `ops`: Shared value operations used by opcodes and natives
//! - `builtins`: Native function registry and the core natives
//! - `assembly`: Serialized (JSON) program format and loader
//! - `disasm`: Human-readable program listings
//! - `client`: Host wrapper with script arguments and a result slot
//! - `config`: Machine configuration
//! - `error`: Error types

#![allow(clippy::result_large_err)]

pub mod assembly;
pub mod builtins;
pub mod client;
pub mod config;
pub mod disasm;
pub mod error;
pub mod machine;
pub mod opcode;
pub mod ops;
pub mod program;

// Re-export main types
pub use assembly::{AssemblyError, ProgramAsm};
pub use builtins::{create_builtin_registry, BuiltinRegistry, NativeFn};
pub use client::{ScriptClient, ScriptError};
pub use config::MachineConfig;
pub use disasm::{disassemble_block, disassemble_program};
pub use error::{RuntimeFault, VmError};
pub use machine::{MachineState, ScriptMachine};
pub use opcode::OpCode;
pub use ops::ValueOps;
pub use program::{Block, BlockId, BlockKind, Code, Program};
