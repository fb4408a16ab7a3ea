//! Serialized program format
//!
//! A compiled program travels between the compiler and a host as JSON.
//! Blocks are referred to by their position in `blocks`; natives by the
//! name they were registered under; literals and cast targets are spelled
//! out structurally and interned into the program's type registry while
//! loading.
//!
//! ```json
//! {
//!   "main": 0,
//!   "events": { "tick": 1 },
//!   "blocks": [
//!     { "name": "main", "codes": [
//!       { "op": "var_alloc", "arg0": 1 },
//!       { "op": "push_value", "value": { "int": 5 }, "line": 1 },
//!       { "op": "copy_assign", "slot": [0, 0], "line": 1 }
//!     ] },
//!     { "name": "tick", "level": 1, "codes": [] }
//!   ]
//! }
//! ```

use crate::builtins::BuiltinRegistry;
use crate::opcode::{pack_slot, OpCode, MAX_PACKED_INDEX, MAX_PACKED_LEVEL};
use crate::ops::ValueOps;
use crate::program::{Block, BlockId, BlockKind, Code, Program};
use serde::{Deserialize, Serialize};
use stagescript_types::{TypeRef, TypeRegistry, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while loading a serialized program
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("Malformed assembly: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Block {block} ({name}): unknown native '{native}'")]
    UnknownNative {
        block: BlockId,
        name: String,
        native: String,
    },

    #[error("Block {block}, instruction {index}: {op} needs a call target")]
    MissingCallTarget { block: BlockId, index: usize, op: OpCode },

    #[error("Block {block}, instruction {index}: call target {target} does not exist")]
    InvalidCallTarget {
        block: BlockId,
        index: usize,
        target: BlockId,
    },

    #[error("Block {block}, instruction {index}: {op} needs a target type")]
    MissingType { block: BlockId, index: usize, op: OpCode },

    #[error("Block {block}, instruction {index}: slot ({level}, {slot}) is out of range")]
    SlotOutOfRange {
        block: BlockId,
        index: usize,
        level: u32,
        slot: u32,
    },

    #[error("Block {block}, instruction {index}: jump target {target} is out of range")]
    InvalidJump {
        block: BlockId,
        index: usize,
        target: u32,
    },

    #[error("Block {block}, instruction {index}: {reason}")]
    InvalidLiteral {
        block: BlockId,
        index: usize,
        reason: String,
    },

    #[error("Main block {0} does not exist")]
    InvalidMain(BlockId),

    #[error("Event '{name}' targets missing block {block}")]
    InvalidEvent { name: String, block: BlockId },
}

/// Serialized program
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramAsm {
    #[serde(default)]
    pub main: BlockId,
    #[serde(default)]
    pub events: BTreeMap<String, BlockId>,
    pub blocks: Vec<BlockAsm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile_error: Option<CompileErrorAsm>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileErrorAsm {
    pub message: String,
    #[serde(default)]
    pub line: u32,
}

/// Serialized block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockAsm {
    pub name: String,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub kind: BlockKind,
    #[serde(default)]
    pub arguments: usize,
    /// Registered native implementing this block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native: Option<String>,
    #[serde(default)]
    pub codes: Vec<CodeAsm>,
}

/// Serialized instruction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeAsm {
    pub op: OpCode,
    #[serde(default)]
    pub arg0: u32,
    #[serde(default)]
    pub arg1: u32,
    /// Literal for `push_value`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Literal>,
    #[serde(default)]
    pub line: u32,
    /// Call target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<BlockId>,
    /// Cast target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeSpec>,
    /// `(level, index)` of a variable; fills `arg0`/`arg1` in the encoding
    /// the opcode expects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<(u32, u32)>,
}

/// Literal value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Int(i64),
    Float(f64),
    Char(char),
    Bool(bool),
    String(String),
    Array(Vec<Literal>),
    /// Function value naming a block, called through `invoke`
    Function(BlockId),
}

/// Type description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeSpec {
    Null,
    Int,
    Float,
    Char,
    Bool,
    String,
    Array(Box<TypeSpec>),
}

impl TypeSpec {
    /// Canonical type in `types`
    pub fn resolve(&self, types: &TypeRegistry) -> TypeRef {
        match self {
            TypeSpec::Null => types.null_type().clone(),
            TypeSpec::Int => types.int_type().clone(),
            TypeSpec::Float => types.float_type().clone(),
            TypeSpec::Char => types.char_type().clone(),
            TypeSpec::Bool => types.boolean_type().clone(),
            TypeSpec::String => types.string_type().clone(),
            TypeSpec::Array(element) => types.get_array_type(&element.resolve(types)),
        }
    }
}

impl ProgramAsm {
    pub fn from_json(text: &str) -> Result<Self, AssemblyError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, AssemblyError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Program {
    /// Build a runtime program, binding native blocks from `natives`
    pub fn from_assembly(asm: &ProgramAsm, natives: &BuiltinRegistry) -> Result<Self, AssemblyError> {
        let mut program = Program::new();
        let block_count = asm.blocks.len();

        for (id, block_asm) in asm.blocks.iter().enumerate() {
            let block = match &block_asm.native {
                Some(native) => {
                    natives
                        .native_block(native)
                        .ok_or_else(|| AssemblyError::UnknownNative {
                            block: id,
                            name: block_asm.name.clone(),
                            native: native.clone(),
                        })?
                }
                None => {
                    let types = program.types();
                    let codes = block_asm
                        .codes
                        .iter()
                        .enumerate()
                        .map(|(index, code)| {
                            build_code(types, code, id, index, block_count, block_asm.codes.len())
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    Block::new(block_asm.name.clone(), block_asm.level, block_asm.kind)
                        .with_arguments(block_asm.arguments)
                        .with_codes(codes)
                }
            };
            program.add_block(block);
        }

        if asm.main >= block_count {
            return Err(AssemblyError::InvalidMain(asm.main));
        }
        program.set_main(asm.main);

        for (name, &block) in &asm.events {
            if block >= block_count {
                return Err(AssemblyError::InvalidEvent {
                    name: name.clone(),
                    block,
                });
            }
            program.add_event(name.clone(), block);
        }

        if let Some(error) = &asm.compile_error {
            program.set_compile_error(error.message.clone(), error.line);
        }

        log::debug!(
            "Loaded program: {} blocks, {} events",
            block_count,
            asm.events.len()
        );
        Ok(program)
    }

    /// Parse and build a program from its JSON form
    pub fn from_json(text: &str, natives: &BuiltinRegistry) -> Result<Self, AssemblyError> {
        Self::from_assembly(&ProgramAsm::from_json(text)?, natives)
    }
}

fn build_code(
    types: &TypeRegistry,
    asm: &CodeAsm,
    block: BlockId,
    index: usize,
    block_count: usize,
    code_count: usize,
) -> Result<Code, AssemblyError> {
    let mut code = Code::op(asm.op, asm.arg0, asm.arg1).at_line(asm.line);

    if let Some((level, slot)) = asm.slot {
        if asm.op.uses_packed_slot() {
            if level > MAX_PACKED_LEVEL || slot > MAX_PACKED_INDEX {
                return Err(AssemblyError::SlotOutOfRange {
                    block,
                    index,
                    level,
                    slot,
                });
            }
            code = code.with_args(1, pack_slot(level, slot));
        } else {
            code = code.with_args(level, slot);
        }
    }

    if let Some(literal) = &asm.value {
        code.data = literal_value(types, literal, block_count).map_err(|reason| {
            AssemblyError::InvalidLiteral {
                block,
                index,
                reason,
            }
        })?;
    }

    match asm.op {
        OpCode::Call | OpCode::CallAndPushResult => {
            let target = asm.block.ok_or(AssemblyError::MissingCallTarget {
                block,
                index,
                op: asm.op,
            })?;
            if target >= block_count {
                return Err(AssemblyError::InvalidCallTarget {
                    block,
                    index,
                    target,
                });
            }
            code.block = Some(target);
        }
        OpCode::InlineCastVar => {
            let spec = asm.ty.as_ref().ok_or(AssemblyError::MissingType {
                block,
                index,
                op: asm.op,
            })?;
            code.ty = Some(spec.resolve(types));
        }
        op if op.is_jump() && code.arg0 as usize > code_count => {
            return Err(AssemblyError::InvalidJump {
                block,
                index,
                target: code.arg0,
            });
        }
        _ => {}
    }

    Ok(code)
}

fn literal_value(types: &TypeRegistry, literal: &Literal, block_count: usize) -> Result<Value, String> {
    match literal {
        Literal::Int(i) => Ok(types.int_value(*i)),
        Literal::Float(f) => Ok(types.float_value(*f)),
        Literal::Char(c) => Ok(types.char_value(*c)),
        Literal::Bool(b) => Ok(types.boolean_value(*b)),
        Literal::String(s) => Ok(types.string_value(s)),
        Literal::Function(target) if *target < block_count => Ok(types.int_value(*target as i64)),
        Literal::Function(target) => Err(format!("function literal targets missing block {}", target)),
        Literal::Array(items) => {
            let ops = ValueOps::new(types);
            let mut array = types.empty_array();
            for item in items {
                let value = literal_value(types, item, block_count)?;
                ops.append_into(&mut array, &value)
                    .map_err(|err| err.to_string())?;
            }
            Ok(array)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::create_builtin_registry;

    const SAMPLE: &str = r#"{
        "main": 0,
        "events": { "tick": 2 },
        "blocks": [
            { "name": "main", "codes": [
                { "op": "var_alloc", "arg0": 1 },
                { "op": "push_value", "value": { "array": [{ "int": 1 }, { "float": 2.5 }] }, "line": 1 },
                { "op": "copy_assign", "slot": [0, 0], "line": 1 },
                { "op": "push_value", "value": { "int": 3 }, "line": 2 },
                { "op": "inline_add_asi", "slot": [0, 0], "line": 2 }
            ] },
            { "name": "add", "native": "add" },
            { "name": "tick", "level": 1, "codes": [
                { "op": "push_value", "value": { "string": "hi" } },
                { "op": "inline_cast_var", "ty": { "array": "int" }, "arg1": 1 },
                { "op": "call", "block": 1, "arg1": 0 }
            ] }
        ]
    }"#;

    #[test]
    fn test_load_sample() {
        let program = Program::from_json(SAMPLE, &create_builtin_registry()).unwrap();
        assert_eq!(program.blocks().len(), 3);
        assert_eq!(program.event("tick"), Some(2));

        let main = program.block(0).unwrap();
        assert_eq!(main.codes[2].arg0, 0);
        assert_eq!(main.codes[4].arg0, 1);
        assert_eq!(main.codes[4].arg1, pack_slot(0, 0));

        let types = program.types();
        let literal = &main.codes[1].data;
        assert!(literal.is_type(types.int_array_type()));
        assert_eq!(literal.index_as_array(1), Some(&types.int_value(2)));

        assert!(program.block(1).unwrap().is_native());
        let cast = &program.block(2).unwrap().codes[1];
        assert_eq!(cast.ty.as_ref(), Some(types.int_array_type()));
    }

    #[test]
    fn test_rejects_bad_references() {
        let natives = create_builtin_registry();

        let missing_native = r#"{ "blocks": [{ "name": "f", "native": "nope" }] }"#;
        assert!(matches!(
            Program::from_json(missing_native, &natives),
            Err(AssemblyError::UnknownNative { .. })
        ));

        let bad_call = r#"{ "blocks": [{ "name": "main", "codes": [{ "op": "call", "block": 7 }] }] }"#;
        assert!(matches!(
            Program::from_json(bad_call, &natives),
            Err(AssemblyError::InvalidCallTarget { target: 7, .. })
        ));

        let bad_event = r#"{ "events": { "x": 4 }, "blocks": [{ "name": "main" }] }"#;
        assert!(matches!(
            Program::from_json(bad_event, &natives),
            Err(AssemblyError::InvalidEvent { block: 4, .. })
        ));

        let bad_jump = r#"{ "blocks": [{ "name": "main", "codes": [{ "op": "jump", "arg0": 9 }] }] }"#;
        assert!(matches!(
            Program::from_json(bad_jump, &natives),
            Err(AssemblyError::InvalidJump { target: 9, .. })
        ));

        assert!(matches!(
            Program::from_json("{", &natives),
            Err(AssemblyError::Json(_))
        ));
    }

    #[test]
    fn test_mixed_array_literal_is_rejected() {
        let text = r#"{ "blocks": [{ "name": "main", "codes": [
            { "op": "push_value", "value": { "array": [{ "int": 1 }, { "array": [] }] } }
        ] }] }"#;
        assert!(matches!(
            Program::from_json(text, &create_builtin_registry()),
            Err(AssemblyError::InvalidLiteral { .. })
        ));
    }

    fn print(
        machine: &mut crate::machine::ScriptMachine,
        args: &[Value],
    ) -> Result<Value, crate::error::VmError> {
        let text = args.first().map(Value::to_display_string).unwrap_or_default();
        if let Some(lines) = machine.host_data_mut::<Vec<String>>() {
            lines.push(text);
        }
        Ok(Value::Empty)
    }

    #[test]
    fn test_ticker_demo_runs() {
        let mut natives = create_builtin_registry();
        natives.register("Print", print, 1);
        let program = Program::from_json(include_str!("../../../demos/ticker.json"), &natives).unwrap();

        let mut machine = crate::machine::ScriptMachine::new(std::rc::Rc::new(program));
        machine.set_host_data(Vec::<String>::new());
        machine.run();
        assert_eq!(machine.thread_count(), 2);

        for _ in 0..3 {
            machine.call("tick");
        }

        assert!(!machine.has_error(), "{:?}", machine.fault());
        assert_eq!(machine.thread_count(), 1);
        let lines = machine.host_data::<Vec<String>>().cloned().unwrap_or_default();
        assert_eq!(lines, vec!["countdown", "0", "1", "2", "done"]);
    }
}
