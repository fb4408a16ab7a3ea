//! Program listings

use crate::opcode::{unpack_slot, OpCode};
use crate::program::{Block, BlockKind, Code, Program};
use std::fmt::Write;

/// Listing of every block in `program`
pub fn disassemble_program(program: &Program) -> String {
    let mut out = String::new();
    for (id, block) in program.blocks().iter().enumerate() {
        let mut markers = Vec::new();
        if id == program.main() {
            markers.push("main".to_string());
        }
        let mut events: Vec<&str> = program
            .events()
            .iter()
            .filter(|(_, target)| **target == id)
            .map(|(name, _)| name.as_str())
            .collect();
        events.sort_unstable();
        markers.extend(events.into_iter().map(|name| format!("event {}", name)));

        let _ = write!(out, "; block {}", id);
        if !markers.is_empty() {
            let _ = write!(out, " [{}]", markers.join(", "));
        }
        out.push('\n');
        out.push_str(&disassemble_block(block, program));
        out.push('\n');
    }
    out
}

/// Listing of a single block; `program` names call targets
pub fn disassemble_block(block: &Block, program: &Program) -> String {
    let mut out = String::new();
    let kind = match block.kind {
        BlockKind::Normal => "block",
        BlockKind::Sub => "sub",
        BlockKind::Function => "function",
        BlockKind::Microthread => "microthread",
    };
    let _ = writeln!(
        out,
        "{} {} (level {}, {} args)",
        kind, block.name, block.level, block.arguments
    );

    if block.is_native() {
        let _ = writeln!(out, "    <native>");
        return out;
    }

    for (index, code) in block.codes.iter().enumerate() {
        let line = if code.line > 0 {
            format!("L{}", code.line)
        } else {
            String::new()
        };
        let _ = writeln!(
            out,
            "{:04}  {:<6}{:<18}{}",
            index,
            line,
            code.op.name(),
            operands(code, program)
        );
    }
    out
}

fn operands(code: &Code, program: &Program) -> String {
    match code.op {
        OpCode::PushValue => {
            let text = code.data.to_display_string();
            if program.types().is_string(&code.data) {
                format!("{:?}", text)
            } else {
                text
            }
        }
        OpCode::PushVariable | OpCode::PushVariableAlias | OpCode::CopyAssign => {
            format!("L{}[{}]", code.arg0, code.arg1)
        }
        OpCode::Call | OpCode::CallAndPushResult => {
            let target = code
                .block
                .and_then(|id| program.block(id).ok().map(|block| (id, block)));
            match target {
                Some((id, block)) => format!("#{} {} argc={}", id, block.name, code.arg1),
                None => format!("#? argc={}", code.arg1),
            }
        }
        op if op.is_jump() => format!("-> {:04}", code.arg0),
        OpCode::InlineCastVar => {
            let ty = code
                .ty
                .as_ref()
                .map(|ty| ty.to_string())
                .unwrap_or_else(|| "?".to_string());
            let checked = if code.arg1 != 0 { " checked" } else { "" };
            format!("{}{}", ty, checked)
        }
        op if op.uses_packed_slot() => {
            if code.arg0 != 0 {
                let (level, index) = unpack_slot(code.arg1);
                format!("L{}[{}]", level, index)
            } else if matches!(op, OpCode::InlineInc | OpCode::InlineDec) && code.arg1 != 0 {
                "*alias pop".to_string()
            } else {
                "*alias".to_string()
            }
        }
        OpCode::VarAlloc
        | OpCode::Pop
        | OpCode::DupN
        | OpCode::LoadAlias
        | OpCode::MakeUnique
        | OpCode::ConstructArray => code.arg0.to_string(),
        OpCode::VarFormat => format!("{}..{}", code.arg0, code.arg0.saturating_add(code.arg1)),
        _ => String::new(),
    }
}
