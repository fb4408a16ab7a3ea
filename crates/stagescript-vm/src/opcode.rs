//! Instruction set
//!
//! Every instruction works on the operand stack of the frame executing it.
//! Operands live in [`crate::program::Code`]: `arg0`/`arg1` hold jump targets,
//! counts, variable slots or flags; `data` holds literals; `block` names a
//! call target; `ty` names a cast target.
//!
//! Variable slots come in two encodings. Plain opcodes use `arg0 = level`,
//! `arg1 = index`. Inline opcodes pack both into `arg1` (see [`pack_slot`])
//! and use `arg0` as an addressing flag: non-zero for a lexically resolved
//! local, zero for an alias sitting on the stack.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Virtual machine instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpCode {
    // ===== Scheduling =====
    /// Pop N; sleep for N scheduler ticks (N <= 0 continues at once)
    Wait,
    /// Hand control to the next thread
    Yield,

    // ===== Stack & variables =====
    /// Size the local variable array to `arg0`
    VarAlloc,
    /// Clear locals `arg0 .. arg0 + arg1`
    VarFormat,
    /// Pop `arg0` values
    Pop,
    /// Push the literal in `data`
    PushValue,
    /// Push a copy of variable (`arg0` level, `arg1` index)
    PushVariable,
    /// Push an alias to variable (`arg0` level, `arg1` index)
    PushVariableAlias,
    /// Push a copy of the value `arg0` below the top
    DupN,
    /// Swap the two top values
    Swap,
    /// Push an alias to the stack slot `arg0` below the top
    LoadAlias,
    /// Replace the alias on top with the value it points at
    UnloadAlias,
    /// Deep-copy any shared storage of the value `arg0` below the top
    MakeUnique,

    // ===== Control flow =====
    /// ip = `arg0`
    Jump,
    /// Pop; jump to `arg0` if true
    JumpIf,
    /// Pop; jump to `arg0` if false
    JumpIfNot,
    /// Jump to `arg0` if top is true, keep it
    JumpIfNopop,
    /// Jump to `arg0` if top is false, keep it
    JumpIfNotNopop,
    /// Unwind to the innermost sub/function/microthread boundary
    SubReturn,

    // ===== Assignment =====
    /// Pop into variable (`arg0` level, `arg1` index), keeping its type
    CopyAssign,
    /// Pop value and target alias, write through the alias
    RefAssign,

    // ===== Calls =====
    /// Call `block` with the top `arg1` values as arguments
    Call,
    /// Same as `Call`, pushing the result
    CallAndPushResult,

    // ===== Three-way compare reduction =====
    /// top = (top == 0)
    CompareE,
    /// top = (top > 0)
    CompareG,
    /// top = (top >= 0)
    CompareGe,
    /// top = (top < 0)
    CompareL,
    /// top = (top <= 0)
    CompareLe,
    /// top = (top != 0)
    CompareNe,

    // ===== Loops =====
    /// [bound][counter]: push "stop" once counter >= bound, operands stay
    LoopAscent,
    /// [bound][counter]: push "stop" once counter <= bound, operands stay
    LoopDescent,
    /// Decrement the counter on top when positive, push "continue"
    LoopCount,
    /// [array][counter]: push next element and bump counter, then push "stop"
    LoopForeach,

    // ===== Arrays =====
    /// Pop `arg0` values into a new array
    ConstructArray,

    // ===== Inline fast paths =====
    InlineInc,
    InlineDec,
    InlineAddAsi,
    InlineSubAsi,
    InlineMulAsi,
    InlineDivAsi,
    InlineFdivAsi,
    InlineModAsi,
    InlinePowAsi,
    InlineCatAsi,
    InlineNeg,
    InlineNot,
    InlineAbs,
    InlineAdd,
    InlineSub,
    InlineMul,
    InlineDiv,
    InlineFdiv,
    InlineMod,
    InlinePow,
    InlineApp,
    InlineCat,
    InlineCmpE,
    InlineCmpG,
    InlineCmpGe,
    InlineCmpL,
    InlineCmpLe,
    InlineCmpNe,
    InlineLogicAnd,
    InlineLogicOr,
    /// Cast top to `ty`; `arg1` non-zero checks assignability first
    InlineCastVar,
    /// [alias to array][index] -> [alias to element]
    InlineIndexArray,
    /// [array][index] -> [element copy]
    InlineIndexArray2,
    /// top = length of top
    InlineLengthArray,
}

impl OpCode {
    /// Mnemonic used by listings
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Wait => "WAIT",
            OpCode::Yield => "YIELD",
            OpCode::VarAlloc => "VAR_ALLOC",
            OpCode::VarFormat => "VAR_FORMAT",
            OpCode::Pop => "POP",
            OpCode::PushValue => "PUSH_VALUE",
            OpCode::PushVariable => "PUSH_VAR",
            OpCode::PushVariableAlias => "PUSH_VAR_ALIAS",
            OpCode::DupN => "DUP_N",
            OpCode::Swap => "SWAP",
            OpCode::LoadAlias => "LOAD_ALIAS",
            OpCode::UnloadAlias => "UNLOAD_ALIAS",
            OpCode::MakeUnique => "MAKE_UNIQUE",
            OpCode::Jump => "JUMP",
            OpCode::JumpIf => "JUMP_IF",
            OpCode::JumpIfNot => "JUMP_IF_NOT",
            OpCode::JumpIfNopop => "JUMP_IF_NOPOP",
            OpCode::JumpIfNotNopop => "JUMP_IF_NOT_NOPOP",
            OpCode::SubReturn => "SUB_RETURN",
            OpCode::CopyAssign => "COPY_ASSIGN",
            OpCode::RefAssign => "REF_ASSIGN",
            OpCode::Call => "CALL",
            OpCode::CallAndPushResult => "CALL_PUSH",
            OpCode::CompareE => "CMP_E",
            OpCode::CompareG => "CMP_G",
            OpCode::CompareGe => "CMP_GE",
            OpCode::CompareL => "CMP_L",
            OpCode::CompareLe => "CMP_LE",
            OpCode::CompareNe => "CMP_NE",
            OpCode::LoopAscent => "LOOP_ASCENT",
            OpCode::LoopDescent => "LOOP_DESCENT",
            OpCode::LoopCount => "LOOP_COUNT",
            OpCode::LoopForeach => "LOOP_FOREACH",
            OpCode::ConstructArray => "CONSTRUCT_ARRAY",
            OpCode::InlineInc => "INC",
            OpCode::InlineDec => "DEC",
            OpCode::InlineAddAsi => "ADD_ASI",
            OpCode::InlineSubAsi => "SUB_ASI",
            OpCode::InlineMulAsi => "MUL_ASI",
            OpCode::InlineDivAsi => "DIV_ASI",
            OpCode::InlineFdivAsi => "FDIV_ASI",
            OpCode::InlineModAsi => "MOD_ASI",
            OpCode::InlinePowAsi => "POW_ASI",
            OpCode::InlineCatAsi => "CAT_ASI",
            OpCode::InlineNeg => "NEG",
            OpCode::InlineNot => "NOT",
            OpCode::InlineAbs => "ABS",
            OpCode::InlineAdd => "ADD",
            OpCode::InlineSub => "SUB",
            OpCode::InlineMul => "MUL",
            OpCode::InlineDiv => "DIV",
            OpCode::InlineFdiv => "FDIV",
            OpCode::InlineMod => "MOD",
            OpCode::InlinePow => "POW",
            OpCode::InlineApp => "APP",
            OpCode::InlineCat => "CAT",
            OpCode::InlineCmpE => "ICMP_E",
            OpCode::InlineCmpG => "ICMP_G",
            OpCode::InlineCmpGe => "ICMP_GE",
            OpCode::InlineCmpL => "ICMP_L",
            OpCode::InlineCmpLe => "ICMP_LE",
            OpCode::InlineCmpNe => "ICMP_NE",
            OpCode::InlineLogicAnd => "AND",
            OpCode::InlineLogicOr => "OR",
            OpCode::InlineCastVar => "CAST",
            OpCode::InlineIndexArray => "INDEX_ALIAS",
            OpCode::InlineIndexArray2 => "INDEX",
            OpCode::InlineLengthArray => "LENGTH",
        }
    }

    /// Inline opcodes that address their target through a packed slot
    pub fn uses_packed_slot(self) -> bool {
        matches!(
            self,
            OpCode::InlineInc
                | OpCode::InlineDec
                | OpCode::InlineAddAsi
                | OpCode::InlineSubAsi
                | OpCode::InlineMulAsi
                | OpCode::InlineDivAsi
                | OpCode::InlineFdivAsi
                | OpCode::InlineModAsi
                | OpCode::InlinePowAsi
                | OpCode::InlineCatAsi
        )
    }

    pub fn is_jump(self) -> bool {
        matches!(
            self,
            OpCode::Jump
                | OpCode::JumpIf
                | OpCode::JumpIfNot
                | OpCode::JumpIfNopop
                | OpCode::JumpIfNotNopop
        )
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Bits of a packed slot holding the variable index
pub const SLOT_INDEX_BITS: u32 = 20;
/// Largest lexical level a packed slot can hold
pub const MAX_PACKED_LEVEL: u32 = 0xfff;
/// Largest variable index a packed slot can hold
pub const MAX_PACKED_INDEX: u32 = (1 << SLOT_INDEX_BITS) - 1;

/// Pack a (level, index) pair into one operand: 12 bits of level above
/// 20 bits of index
#[inline]
pub fn pack_slot(level: u32, index: u32) -> u32 {
    debug_assert!(level <= MAX_PACKED_LEVEL && index <= MAX_PACKED_INDEX);
    ((level & MAX_PACKED_LEVEL) << SLOT_INDEX_BITS) | (index & MAX_PACKED_INDEX)
}

/// Inverse of [`pack_slot`]
#[inline]
pub fn unpack_slot(packed: u32) -> (u32, u32) {
    (packed >> SLOT_INDEX_BITS, packed & MAX_PACKED_INDEX)
}
