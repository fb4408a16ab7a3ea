use crate::builtins::{create_builtin_registry, BuiltinRegistry};
use crate::client::{ScriptClient, ScriptError};
use crate::program::Program;
use std::rc::Rc;

const SCRIPT: &str = r#"{
  "main": 0,
  "events": { "count": 4, "bad": 5 },
  "blocks": [
    { "name": "main", "codes": [
      { "op": "push_value", "value": { "int": 0 }, "line": 1 },
      { "op": "call_and_push_result", "block": 1, "arg1": 1, "line": 1 },
      { "op": "push_value", "value": { "int": 2 }, "line": 1 },
      { "op": "inline_mul", "line": 1 },
      { "op": "call", "block": 2, "arg1": 1, "line": 2 }
    ] },
    { "name": "GetScriptArgument", "native": "GetScriptArgument" },
    { "name": "SetScriptResult", "native": "SetScriptResult" },
    { "name": "GetScriptArgumentCount", "native": "GetScriptArgumentCount" },
    { "name": "count", "level": 1, "kind": "sub", "codes": [
      { "op": "call_and_push_result", "block": 3, "line": 5 },
      { "op": "call", "block": 2, "arg1": 1, "line": 5 }
    ] },
    { "name": "bad", "level": 1, "kind": "sub", "codes": [
      { "op": "push_value", "value": { "int": 9 }, "line": 8 },
      { "op": "call_and_push_result", "block": 1, "arg1": 1, "line": 8 }
    ] }
  ]
}"#;

fn registry() -> BuiltinRegistry {
    let mut registry = create_builtin_registry();
    ScriptClient::register_natives(&mut registry);
    registry
}

fn client() -> ScriptClient {
    let program = Program::from_json(SCRIPT, &registry()).unwrap();
    ScriptClient::new(Rc::new(program)).unwrap()
}

#[test]
fn test_arguments_and_result() {
    let mut client = client();
    let types = Rc::clone(client.machine().types());
    client.set_argument(0, types.int_value(21));

    client.run().unwrap();
    assert_eq!(client.result(), types.int_value(42));

    client.run_event("count").unwrap();
    assert_eq!(client.result(), types.int_value(1));
    assert_eq!(client.thread_count(), 1);
}

#[test]
fn test_set_argument_pads_missing_slots() {
    let mut client = client();
    let types = Rc::clone(client.machine().types());
    client.set_argument(2, types.int_value(5));

    assert_eq!(client.argument_count(), 3);
    client.run_event("count").unwrap_err();
    // Argument 0 is empty: doubling it is a type error in main
    assert!(client.error().is_some());
}

#[test]
fn test_invalid_argument_index_sticks() {
    let mut client = client();
    let types = Rc::clone(client.machine().types());
    client.set_argument(0, types.int_value(1));
    client.run().unwrap();

    let error = client.run_event("bad").unwrap_err();
    assert_eq!(
        error,
        ScriptError {
            line: 8,
            message: "Invalid script argument index.".to_string(),
        }
    );
    assert!(!client.is_event_exists("count"));
    assert_eq!(client.run(), Err(error.clone()));

    // Reset keeps the recorded error
    client.reset();
    assert_eq!(client.run_event("count"), Err(error));
}

#[test]
fn test_unknown_event() {
    let mut client = client();
    assert!(client.is_event_exists("count"));

    let error = client.run_event("missing").unwrap_err();
    assert_eq!(error.line, 0);
    assert_eq!(error.message, "Event doesn't exist. [missing]");
    assert_eq!(error.to_string(), "Event doesn't exist. [missing] (line 0)");
}

#[test]
fn test_compile_error_is_refused() {
    let mut program = Program::new();
    program.set_compile_error("unexpected token", 3);

    let error = ScriptClient::new(Rc::new(program)).err();
    assert_eq!(
        error,
        Some(ScriptError {
            line: 3,
            message: "unexpected token".to_string(),
        })
    );
}
