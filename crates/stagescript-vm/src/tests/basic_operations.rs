use super::helpers::*;
use crate::machine::MachineState;
use crate::opcode::OpCode;
use crate::program::Code;

#[test]
fn test_assign_literal() {
    let mut script = ScriptBuilder::new();
    let types = script.types();
    script.main(vec![alloc(1), push(types.int_value(42)), store(0, 0)]);

    let mut machine = script.machine();
    machine.run();

    assert!(!machine.has_error());
    assert_eq!(machine.state(), MachineState::Finished);
    assert_eq!(global(&machine, 0), types.int_value(42));
    assert!(root_stack(&machine).is_empty());
}

#[test]
fn test_inline_arithmetic() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    let binary = |a, b, code| {
        vec![push(t.int_value(a)), push(t.int_value(b)), op(code)]
    };

    let mut codes = vec![alloc(5)];
    codes.extend(binary(7, 2, OpCode::InlineDiv));
    codes.push(store(0, 0));
    codes.extend(binary(-7, 2, OpCode::InlineFdiv));
    codes.push(store(0, 1));
    codes.extend(binary(-7, 2, OpCode::InlineMod));
    codes.push(store(0, 2));
    codes.extend(binary(2, 10, OpCode::InlinePow));
    codes.push(store(0, 3));
    codes.extend([
        push(t.float_value(7.0)),
        push(t.int_value(2)),
        op(OpCode::InlineDiv),
        store(0, 4),
    ]);
    script.main(codes);

    let mut machine = script.machine();
    machine.run();

    assert!(!machine.has_error(), "{:?}", machine.fault());
    assert_eq!(global(&machine, 0), t.int_value(3));
    assert_eq!(global(&machine, 1), t.int_value(-4));
    assert_eq!(global(&machine, 2), t.int_value(-1));
    assert_eq!(global(&machine, 3), t.int_value(1024));
    assert_eq!(global(&machine, 4), t.float_value(3.5));
}

#[test]
fn test_copy_assign_keeps_declared_type() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    script.main(vec![
        alloc(1),
        push(t.int_value(1)),
        store(0, 0),
        push(t.float_value(2.9)),
        store(0, 0),
    ]);

    let mut machine = script.machine();
    machine.run();

    let value = global(&machine, 0);
    assert!(t.is_int(&value));
    assert_eq!(value.as_int(), 2);
}

#[test]
fn test_compound_assignment_on_local() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    script.main(vec![
        alloc(1),
        push(t.int_value(10)),
        store(0, 0),
        push(t.int_value(5)),
        Code::inline_local(OpCode::InlineAddAsi, 0, 0),
        push(t.float_value(2.5)),
        Code::inline_local(OpCode::InlineMulAsi, 0, 0),
    ]);

    let mut machine = script.machine();
    machine.run();

    // 15 * 2.5 truncated back to the declared int
    assert_eq!(global(&machine, 0), t.int_value(37));
    assert!(root_stack(&machine).is_empty());
}

#[test]
fn test_inc_dec_local() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    script.main(vec![
        alloc(2),
        push(t.char_value('a')),
        store(0, 0),
        Code::inline_local(OpCode::InlineInc, 0, 0),
        Code::inline_local(OpCode::InlineInc, 0, 0),
        push(t.int_value(0)),
        store(0, 1),
        Code::inline_local(OpCode::InlineDec, 0, 1),
    ]);

    let mut machine = script.machine();
    machine.run();

    assert_eq!(global(&machine, 0), t.char_value('c'));
    assert_eq!(global(&machine, 1), t.int_value(-1));
}

#[test]
fn test_ref_assign_writes_through_alias() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    script.main(vec![
        alloc(1),
        push(t.int_value(1)),
        store(0, 0),
        load_alias(0, 0),
        push(t.int_value(9)),
        op(OpCode::RefAssign),
    ]);

    let mut machine = script.machine();
    machine.run();

    assert_eq!(global(&machine, 0), t.int_value(9));
    assert!(root_stack(&machine).is_empty());
}

#[test]
fn test_alias_inc_pop_flag() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    script.main(vec![
        alloc(1),
        push(t.int_value(1)),
        store(0, 0),
        load_alias(0, 0),
        Code::op(OpCode::InlineInc, 0, 1),
        load_alias(0, 0),
        Code::op(OpCode::InlineInc, 0, 0),
    ]);

    let mut machine = script.machine();
    machine.run();

    assert_eq!(global(&machine, 0), t.int_value(3));
    // Only the second alias is left behind
    let stack = root_stack(&machine);
    assert_eq!(stack.len(), 1);
    assert!(stack[0].is_alias());
}

#[test]
fn test_stack_shuffles() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    script.main(vec![
        push(t.int_value(1)),
        push(t.int_value(2)),
        op_arg(OpCode::DupN, 1),
        op(OpCode::Swap),
        op_arg(OpCode::LoadAlias, 0),
        op(OpCode::UnloadAlias),
        op_arg(OpCode::Pop, 2),
    ]);

    let mut machine = script.machine();
    machine.run();

    // [1, 2] -> [1, 2, 1] -> [1, 1, 2] -> [1, 1, 2, 2] -> [1, 1]
    assert_eq!(root_stack(&machine), vec![t.int_value(1), t.int_value(1)]);
}

#[test]
fn test_unary_and_logic() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    script.main(vec![
        push(t.int_value(5)),
        op(OpCode::InlineNeg),
        op(OpCode::InlineAbs),
        push(t.boolean_value(true)),
        push(t.boolean_value(false)),
        op(OpCode::InlineLogicAnd),
        op(OpCode::InlineNot),
        push(t.boolean_value(false)),
        op(OpCode::InlineLogicOr),
    ]);

    let mut machine = script.machine();
    machine.run();

    assert_eq!(
        root_stack(&machine),
        vec![t.int_value(5), t.boolean_value(true)]
    );
}

#[test]
fn test_casts() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    script.main(vec![
        push(t.float_value(3.7)),
        Code::cast(t.int_type().clone(), false),
        push(t.int_value(66)),
        Code::cast(t.char_type().clone(), true),
        push(t.int_value(12)),
        Code::cast(t.string_type().clone(), false),
    ]);

    let mut machine = script.machine();
    machine.run();

    assert!(!machine.has_error());
    let stack = root_stack(&machine);
    assert_eq!(stack[0], t.int_value(3));
    assert_eq!(stack[1], t.char_value('B'));
    assert!(t.is_string(&stack[2]));
    assert_eq!(stack[2].to_display_string(), "12");
}

#[test]
fn test_var_format_clears_range() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    script.main(vec![
        alloc(3),
        push(t.int_value(1)),
        store(0, 0),
        push(t.int_value(2)),
        store(0, 1),
        push(t.int_value(3)),
        store(0, 2),
        Code::op(OpCode::VarFormat, 1, 5),
    ]);

    let mut machine = script.machine();
    machine.run();

    assert_eq!(global(&machine, 0), t.int_value(1));
    assert!(!global(&machine, 1).has_data());
    assert!(!global(&machine, 2).has_data());
}

#[test]
fn test_comparisons() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    script.main(vec![
        push(t.int_value(3)),
        push(t.int_value(5)),
        op(OpCode::InlineCmpL),
        push(t.int_value(3)),
        push(t.float_value(3.0)),
        op(OpCode::InlineCmpE),
        push(t.string_value("abc")),
        push(t.string_value("abd")),
        op(OpCode::InlineCmpGe),
        push(t.int_value(-1)),
        op(OpCode::CompareL),
    ]);

    let mut machine = script.machine();
    machine.run();

    assert!(!machine.has_error());
    assert_eq!(
        root_stack(&machine),
        vec![
            t.boolean_value(true),
            t.boolean_value(true),
            t.boolean_value(false),
            t.boolean_value(true),
        ]
    );
}

#[test]
fn test_alias_to_unassigned_slot() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    script.main(vec![
        alloc(2),
        // Incrementing through an alias to an unassigned slot leaves it unassigned
        load_alias(0, 1),
        Code::op(OpCode::InlineInc, 0, 1),
        load_alias(0, 0),
        push(t.int_value(4)),
        op(OpCode::RefAssign),
    ]);

    let mut machine = script.machine();
    machine.run();

    assert!(!machine.has_error(), "{:?}", machine.fault());
    assert_eq!(global(&machine, 0), t.int_value(4));
    assert!(!global(&machine, 1).has_data());
    assert!(root_stack(&machine).is_empty());
}
