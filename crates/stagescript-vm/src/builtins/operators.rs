//! Operator natives
//!
//! The general-purpose forms of the operations the inline opcodes shortcut,
//! plus conversions. Each one defers to [`crate::ops::ValueOps`].

use super::registry::BuiltinRegistry;
use crate::error::VmError;
use crate::machine::ScriptMachine;
use stagescript_types::Value;

fn arg<'a>(args: &'a [Value], index: usize, name: &str) -> Result<&'a Value, VmError> {
    args.get(index).ok_or_else(|| {
        VmError::Runtime(format!("{}: missing argument {}", name, index + 1))
    })
}

macro_rules! binary_native {
    ($fn_name:ident, $op:ident) => {
        fn $fn_name(machine: &mut ScriptMachine, args: &[Value]) -> Result<Value, VmError> {
            let left = arg(args, 0, stringify!($op))?;
            let right = arg(args, 1, stringify!($op))?;
            machine.ops().$op(left, right)
        }
    };
}

macro_rules! unary_native {
    ($fn_name:ident, $op:ident) => {
        fn $fn_name(machine: &mut ScriptMachine, args: &[Value]) -> Result<Value, VmError> {
            let value = arg(args, 0, stringify!($op))?;
            machine.ops().$op(value)
        }
    };
}

binary_native!(add, add);
binary_native!(subtract, subtract);
binary_native!(multiply, multiply);
binary_native!(divide, divide);
binary_native!(fdivide, fdivide);
binary_native!(remainder, remainder);
binary_native!(power, power);
unary_native!(negative, negative);
unary_native!(not, not);
unary_native!(absolute, absolute);
unary_native!(successor, successor);
unary_native!(predecessor, predecessor);

fn compare(machine: &mut ScriptMachine, args: &[Value]) -> Result<Value, VmError> {
    let ops = machine.ops();
    let r = ops.compare(arg(args, 0, "compare")?, arg(args, 1, "compare")?)?;
    Ok(ops.types().int_value(r))
}

fn append(machine: &mut ScriptMachine, args: &[Value]) -> Result<Value, VmError> {
    let array = arg(args, 0, "append")?.clone();
    machine.ops().append(array, arg(args, 1, "append")?)
}

fn concatenate(machine: &mut ScriptMachine, args: &[Value]) -> Result<Value, VmError> {
    let left = arg(args, 0, "concatenate")?.clone();
    machine.ops().concatenate(left, arg(args, 1, "concatenate")?)
}

fn index(machine: &mut ScriptMachine, args: &[Value]) -> Result<Value, VmError> {
    let array = arg(args, 0, "index")?;
    machine.ops().index(array, arg(args, 1, "index")?).cloned()
}

fn length(machine: &mut ScriptMachine, args: &[Value]) -> Result<Value, VmError> {
    Ok(machine.ops().length(arg(args, 0, "length")?))
}

fn to_int(machine: &mut ScriptMachine, args: &[Value]) -> Result<Value, VmError> {
    let types = machine.types();
    machine.ops().cast(arg(args, 0, "to_int")?, types.int_type())
}

fn to_float(machine: &mut ScriptMachine, args: &[Value]) -> Result<Value, VmError> {
    let types = machine.types();
    machine.ops().cast(arg(args, 0, "to_float")?, types.float_type())
}

fn to_char(machine: &mut ScriptMachine, args: &[Value]) -> Result<Value, VmError> {
    let types = machine.types();
    machine.ops().cast(arg(args, 0, "to_char")?, types.char_type())
}

fn to_boolean(machine: &mut ScriptMachine, args: &[Value]) -> Result<Value, VmError> {
    let types = machine.types();
    machine.ops().cast(arg(args, 0, "to_boolean")?, types.boolean_type())
}

fn to_string(machine: &mut ScriptMachine, args: &[Value]) -> Result<Value, VmError> {
    let text = arg(args, 0, "to_string")?.to_display_string();
    Ok(machine.types().string_value(&text))
}

/// Register the core natives
pub fn register_functions(registry: &mut BuiltinRegistry) {
    registry.register("add", add, 2);
    registry.register("subtract", subtract, 2);
    registry.register("multiply", multiply, 2);
    registry.register("divide", divide, 2);
    registry.register("fdivide", fdivide, 2);
    registry.register("remainder", remainder, 2);
    registry.register("power", power, 2);
    registry.register("negative", negative, 1);
    registry.register("not", not, 1);
    registry.register("absolute", absolute, 1);
    registry.register("compare", compare, 2);
    registry.register("successor", successor, 1);
    registry.register("predecessor", predecessor, 1);
    registry.register("append", append, 2);
    registry.register("concatenate", concatenate, 2);
    registry.register("index", index, 2);
    registry.register("length", length, 1);
    registry.register("to_int", to_int, 1);
    registry.register("to_float", to_float, 1);
    registry.register("to_char", to_char, 1);
    registry.register("to_boolean", to_boolean, 1);
    registry.register("to_string", to_string, 1);
}
