use super::helpers::*;
use crate::config::MachineConfig;
use crate::error::VmError;
use crate::machine::{MachineState, ScriptMachine};
use crate::opcode::OpCode;
use crate::program::Code;
use stagescript_types::{TypeRegistry, Value};

#[test]
fn test_variable_not_found_keeps_other_threads() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    let waiter = script.microthread("waiter", wait(&t, 5));
    script.main(vec![call(waiter, 0), load(5, 0).at_line(12)]);

    let mut machine = script.machine();
    machine.run();

    assert_eq!(machine.state(), MachineState::Error);
    assert!(!machine.is_terminated());
    assert_eq!(machine.error_line(), Some(12));
    assert_eq!(
        machine.error_message(),
        Some("Variable not found (level=5,id=0)")
    );
    assert_eq!(machine.thread_count(), 2);
    let waiter = machine.thread_frames()[1];
    assert_eq!(machine.frame(waiter).map(|env| env.wait_count()), Some(4));
}

#[test]
fn test_uninitialized_variable() {
    let mut script = ScriptBuilder::new();
    script.main(vec![alloc(1), load(0, 0).at_line(3)]);

    let mut machine = script.machine();
    machine.run();

    assert_eq!(machine.error_line(), Some(3));
    assert_eq!(
        machine.error_message(),
        Some("Variable hasn't been initialized.")
    );

    let mut script = ScriptBuilder::new();
    let t = script.types();
    script.main(vec![alloc(1), push(t.int_value(1)), store(0, 0), load(0, 0)]);

    let mut machine = script.machine();
    machine.run();

    assert!(!machine.has_error());
    assert_eq!(root_stack(&machine), vec![t.int_value(1)]);
}

#[test]
fn test_inline_local_targets_must_be_initialized() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    script.main(vec![
        alloc(1),
        push(t.int_value(10)),
        Code::inline_local(OpCode::InlineAddAsi, 0, 0).at_line(7),
    ]);

    let mut machine = script.machine();
    machine.run();

    assert_eq!(machine.error_line(), Some(7));
    assert_eq!(
        machine.error_message(),
        Some("Variable hasn't been initialized.")
    );

    let mut script = ScriptBuilder::new();
    script.main(vec![
        alloc(1),
        Code::inline_local(OpCode::InlineInc, 0, 0).at_line(8),
    ]);

    let mut machine = script.machine();
    machine.run();

    assert_eq!(machine.error_line(), Some(8));
    assert_eq!(
        machine.error_message(),
        Some("Variable hasn't been initialized.")
    );
}

#[test]
fn test_stack_alias_outliving_its_entry() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    script.main(vec![
        push(t.int_value(1)),
        op_arg(OpCode::LoadAlias, 0),
        op(OpCode::Swap),
        // The aliased entry is gone; the alias itself now sits at its index
        op_arg(OpCode::Pop, 1),
        op(OpCode::UnloadAlias).at_line(4),
    ]);

    let mut machine = script.machine();
    machine.run();

    assert_eq!(machine.error_line(), Some(4));
    assert!(machine
        .error_message()
        .is_some_and(|message| message.starts_with("Invalid reference: stack slot 0")));

    let mut script = ScriptBuilder::new();
    let t = script.types();
    script.main(vec![
        push(t.int_value(1)),
        push(t.int_value(2)),
        op_arg(OpCode::LoadAlias, 0),
        op(OpCode::Swap),
        op_arg(OpCode::Pop, 1),
        // Refilled under a new tag
        push(t.int_value(5)),
        op(OpCode::Swap),
        op(OpCode::UnloadAlias),
    ]);

    let mut machine = script.machine();
    machine.run();

    assert!(machine
        .error_message()
        .is_some_and(|message| message.starts_with("Invalid reference: stack slot 1")));
}

#[test]
fn test_argument_underflow() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    let record = script.native("record", 2, record);
    script.main(vec![push(t.int_value(1)), call(record, 2).at_line(4)]);

    let mut machine = script.traced_machine();
    machine.run();

    assert_eq!(machine.error_line(), Some(4));
    assert_eq!(
        machine.error_message(),
        Some("Stack size[1] is less than the number of arguments[2].")
    );
    assert!(trace(&machine).is_empty());
}

#[test]
fn test_type_errors() {
    let cases: Vec<(&str, Box<dyn Fn(&TypeRegistry) -> Vec<Code>>)> = vec![
        (
            "mixed array",
            Box::new(|t: &TypeRegistry| {
                vec![
                    push(t.int_value(1)),
                    push(t.string_value("x")),
                    op_arg(OpCode::ConstructArray, 2),
                ]
            }),
        ),
        (
            "checked cast",
            Box::new(|t: &TypeRegistry| {
                vec![
                    push(t.int_value(1)),
                    Code::cast(t.string_type().clone(), true),
                ]
            }),
        ),
        (
            "array into int",
            Box::new(|t: &TypeRegistry| {
                vec![
                    alloc(1),
                    push(t.int_value(1)),
                    store(0, 0),
                    push(t.string_value("x")),
                    store(0, 0),
                ]
            }),
        ),
    ];

    for (name, build) in cases {
        let mut script = ScriptBuilder::new();
        let t = script.types();
        script.main(build(&*t));

        let mut machine = script.machine();
        machine.run();

        let message = machine.error_message().unwrap_or_default();
        assert!(message.starts_with("Type mismatch"), "{}: {}", name, message);
    }
}

#[test]
fn test_division_by_zero() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    script.main(vec![
        push(t.int_value(1)),
        push(t.int_value(0)),
        op(OpCode::InlineDiv).at_line(2),
    ]);

    let mut machine = script.machine();
    machine.run();

    assert_eq!(machine.error_message(), Some("Division by zero"));
    assert_eq!(machine.state(), MachineState::Error);
}

#[test]
fn test_stack_limit() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    script.main(vec![
        push(t.int_value(1)),
        push(t.int_value(2)),
        push(t.int_value(3)).at_line(9),
    ]);

    let mut machine = ScriptMachine::with_config(
        script.build(),
        MachineConfig::new().with_max_stack(2),
    );
    machine.run();

    assert_eq!(machine.error_line(), Some(9));
    assert!(machine
        .error_message()
        .is_some_and(|message| message.starts_with("Stack overflow")));
    assert!(!machine.is_terminated());
}

#[test]
fn test_pool_exhaustion_is_fatal() {
    let mut script = ScriptBuilder::new();
    let first = script.microthread("first", vec![op(OpCode::Yield)]);
    let second = script.microthread("second", vec![op(OpCode::Yield)]);
    script.main(vec![alloc(1), call(first, 0), call(second, 0).at_line(6)]);
    script.event("tick", vec![]);

    let config = MachineConfig::new()
        .with_initial_environments(1)
        .with_pool_chunk(1)
        .with_max_environments(2);
    let mut machine = ScriptMachine::with_config(script.build(), config);
    machine.run();

    assert_eq!(machine.state(), MachineState::Terminated);
    assert!(machine.fault().is_some_and(|fault| fault.fatal));
    assert_eq!(machine.error_line(), Some(6));

    // Entry points are dead from here on
    machine.call("tick");
    machine.resume();
    machine.reset();
    assert!(machine.is_terminated());
    assert_eq!(machine.state(), MachineState::Terminated);
}

fn halt(machine: &mut ScriptMachine, _args: &[Value]) -> Result<Value, VmError> {
    machine.terminate("bye");
    Ok(Value::Empty)
}

#[test]
fn test_terminate_from_native() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    let record = script.native("record", 1, record);
    let halt = script.native("halt", 0, halt);
    let mut main = vec![call(halt, 0)];
    main.extend(trace_point(&t, record, 1));
    script.main(main);

    let mut machine = script.traced_machine();
    machine.run();

    assert!(trace(&machine).is_empty());
    assert_eq!(machine.state(), MachineState::Terminated);
    assert_eq!(machine.terminate_message(), Some("bye"));
    assert!(!machine.has_error());
}

fn failing(_machine: &mut ScriptMachine, _args: &[Value]) -> Result<Value, VmError> {
    Err(VmError::Runtime("native failed".to_string()))
}

#[test]
fn test_fault_sticks_until_reset() {
    let mut script = ScriptBuilder::new();
    let t = script.types();
    let record = script.native("record", 1, record);
    let failing = script.native("failing", 0, failing);
    script.main(vec![call(failing, 0).at_line(5)]);
    script.event("tick", trace_point(&t, record, 1));

    let mut machine = script.traced_machine();
    machine.run();
    assert_eq!(machine.error_message(), Some("native failed"));
    assert_eq!(machine.error_line(), Some(5));

    machine.call("tick");
    assert!(trace(&machine).is_empty());

    machine.reset();
    assert!(!machine.has_error());
    assert_eq!(machine.state(), MachineState::Idle);
    assert_eq!(machine.pool().live_count(), 0);
}
