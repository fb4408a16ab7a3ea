use super::helpers::*;
use crate::opcode::OpCode;
use crate::program::{BlockKind, Code};

#[test]
fn test_conditional_jumps() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    script.main(vec![
        alloc(2),
        // if false { v0 = 1 } else { v0 = 2 }
        push(t.boolean_value(false)),
        op_arg(OpCode::JumpIfNot, 5),
        push(t.int_value(1)),
        op_arg(OpCode::Jump, 6),
        push(t.int_value(2)),
        store(0, 0),
        // if true { v1 = 3 }
        push(t.boolean_value(true)),
        op_arg(OpCode::JumpIf, 11),
        push(t.int_value(4)),
        store(0, 1),
        push(t.int_value(3)),
        store(0, 1),
    ]);

    let mut machine = script.machine();
    machine.run();

    assert_eq!(global(&machine, 0), t.int_value(2));
    assert_eq!(global(&machine, 1), t.int_value(3));
    assert!(root_stack(&machine).is_empty());
}

#[test]
fn test_nopop_jumps_keep_condition() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    script.main(vec![
        push(t.boolean_value(true)),
        op_arg(OpCode::JumpIfNopop, 3),
        push(t.int_value(9)),
        push(t.boolean_value(true)),
        op_arg(OpCode::JumpIfNotNopop, 6),
        push(t.int_value(1)),
    ]);

    let mut machine = script.machine();
    machine.run();

    assert_eq!(
        root_stack(&machine),
        vec![
            t.boolean_value(true),
            t.boolean_value(true),
            t.int_value(1),
        ]
    );
}

#[test]
fn test_loop_count() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    script.main(vec![
        alloc(1),
        push(t.int_value(0)),
        store(0, 0),
        push(t.int_value(4)),
        op(OpCode::LoopCount),
        op_arg(OpCode::JumpIfNot, 9),
        push(t.int_value(10)),
        Code::inline_local(OpCode::InlineAddAsi, 0, 0),
        op_arg(OpCode::Jump, 4),
        op_arg(OpCode::Pop, 1),
    ]);

    let mut machine = script.machine();
    machine.run();

    assert_eq!(global(&machine, 0), t.int_value(40));
    assert!(root_stack(&machine).is_empty());
}

#[test]
fn test_ascending_loop() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    // for i in 0..4 { sum += i }
    script.main(vec![
        alloc(1),
        push(t.int_value(0)),
        store(0, 0),
        push(t.int_value(4)),
        push(t.int_value(0)),
        op(OpCode::LoopAscent),
        op_arg(OpCode::JumpIf, 12),
        op_arg(OpCode::DupN, 0),
        Code::inline_local(OpCode::InlineAddAsi, 0, 0),
        op_arg(OpCode::LoadAlias, 0),
        Code::op(OpCode::InlineInc, 0, 1),
        op_arg(OpCode::Jump, 5),
        op_arg(OpCode::Pop, 2),
    ]);

    let mut machine = script.machine();
    machine.run();

    assert!(!machine.has_error(), "{:?}", machine.fault());
    assert_eq!(global(&machine, 0), t.int_value(6));
    assert!(root_stack(&machine).is_empty());
}

#[test]
fn test_descending_loop() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    let record = script.native("record", 1, record);
    // for i in (1..=3).rev() { record(i) }
    script.main(vec![
        push(t.int_value(0)),
        push(t.int_value(3)),
        op(OpCode::LoopDescent),
        op_arg(OpCode::JumpIf, 9),
        op_arg(OpCode::DupN, 0),
        call(record, 1),
        op_arg(OpCode::LoadAlias, 0),
        Code::op(OpCode::InlineDec, 0, 1),
        op_arg(OpCode::Jump, 2),
        op_arg(OpCode::Pop, 2),
    ]);

    let mut machine = script.traced_machine();
    machine.run();

    assert_eq!(trace(&machine), vec![3, 2, 1]);
}

#[test]
fn test_normal_block_sees_enclosing_locals() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    let inner = script.block(
        "inner",
        1,
        BlockKind::Normal,
        vec![
            alloc(1),
            push(t.int_value(5)),
            store(1, 0),
            load(1, 0),
            load(0, 0),
            op(OpCode::InlineAdd),
            store(0, 0),
        ],
    );
    script.main(vec![alloc(1), push(t.int_value(10)), store(0, 0), call(inner, 0)]);

    let mut machine = script.machine();
    machine.run();

    assert_eq!(global(&machine, 0), t.int_value(15));
    // The child frame went back to the pool
    assert_eq!(machine.pool().live_count(), 1);
}

#[test]
fn test_sub_return_unwinds_nested_blocks() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    let nested = script.block(
        "nested",
        2,
        BlockKind::Normal,
        vec![op(OpCode::SubReturn), push(t.int_value(50)), store(0, 0)],
    );
    let sub = script.block(
        "sub",
        1,
        BlockKind::Sub,
        vec![call(nested, 0), push(t.int_value(100)), store(0, 0)],
    );
    script.main(vec![
        alloc(1),
        push(t.int_value(1)),
        store(0, 0),
        call(sub, 0),
        push(t.int_value(2)),
        Code::inline_local(OpCode::InlineAddAsi, 0, 0),
    ]);

    let mut machine = script.machine();
    machine.run();

    assert!(!machine.has_error());
    assert_eq!(global(&machine, 0), t.int_value(3));
}
