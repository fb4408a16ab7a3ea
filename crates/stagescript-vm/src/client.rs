//! Host-side script wrapper
//!
//! [`ScriptClient`] owns a machine, hands scripts their arguments and
//! collects a result value. Natives reach the client state through the
//! machine's host data, so any program run by a client can use
//! `GetScriptArgument`, `GetScriptArgumentCount` and `SetScriptResult`
//! once [`ScriptClient::register_natives`] has added them to the registry
//! used to load it.
//!
//! The first fault seen by a client sticks: later runs are refused and
//! return the same error.

use crate::builtins::BuiltinRegistry;
use crate::config::MachineConfig;
use crate::error::VmError;
use crate::machine::ScriptMachine;
use crate::program::Program;
use log::{debug, warn};
use stagescript_types::Value;
use std::rc::Rc;
use thiserror::Error;

/// Script fault as reported to the host
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (line {line})")]
pub struct ScriptError {
    pub line: u32,
    pub message: String,
}

/// State shared with the client natives
#[derive(Debug, Default)]
pub struct ClientState {
    pub arguments: Vec<Value>,
    pub result: Value,
}

pub struct ScriptClient {
    machine: ScriptMachine,
    error: Option<ScriptError>,
}

impl ScriptClient {
    /// Add the client natives to `registry`
    pub fn register_natives(registry: &mut BuiltinRegistry) {
        registry.register("GetScriptArgument", get_script_argument, 1);
        registry.register("GetScriptArgumentCount", get_script_argument_count, 0);
        registry.register("SetScriptResult", set_script_result, 1);
    }

    /// Wrap `program`; a program carrying a compile error is refused
    pub fn new(program: Rc<Program>) -> Result<Self, ScriptError> {
        Self::with_config(program, MachineConfig::default())
    }

    pub fn with_config(program: Rc<Program>, config: MachineConfig) -> Result<Self, ScriptError> {
        if let Some(fault) = program.compile_error() {
            return Err(ScriptError {
                line: fault.line,
                message: fault.message.clone(),
            });
        }

        let mut machine = ScriptMachine::with_config(program, config);
        machine.set_host_data(ClientState::default());
        Ok(Self {
            machine,
            error: None,
        })
    }

    pub fn machine(&self) -> &ScriptMachine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut ScriptMachine {
        &mut self.machine
    }

    pub fn error(&self) -> Option<&ScriptError> {
        self.error.as_ref()
    }

    /// Set script argument `index`, padding earlier slots with empty values
    pub fn set_argument(&mut self, index: usize, value: Value) {
        if let Some(state) = self.machine.host_data_mut::<ClientState>() {
            if state.arguments.len() <= index {
                state.arguments.resize(index + 1, Value::Empty);
            }
            state.arguments[index] = value;
        }
    }

    pub fn argument_count(&self) -> usize {
        self.state().map(|state| state.arguments.len()).unwrap_or(0)
    }

    /// Value stored by `SetScriptResult`, empty if none
    pub fn result(&self) -> Value {
        self.state()
            .map(|state| state.result.clone())
            .unwrap_or_default()
    }

    /// Drop all threads and the result; a recorded fault is kept
    pub fn reset(&mut self) {
        self.machine.reset();
        if let Some(state) = self.machine.host_data_mut::<ClientState>() {
            state.result = Value::Empty;
        }
    }

    /// Run the main block
    pub fn run(&mut self) -> Result<(), ScriptError> {
        self.check()?;
        self.machine.run();
        self.collect()
    }

    /// Run the named event, bootstrapping main first when needed
    pub fn run_event(&mut self, name: &str) -> Result<(), ScriptError> {
        self.check()?;
        if !self.machine.has_event(name) {
            return Err(self.fail(ScriptError {
                line: 0,
                message: VmError::UnknownEvent(name.to_string()).to_string(),
            }));
        }
        debug!("Client running event '{}'", name);
        self.machine.call(name);
        self.collect()
    }

    pub fn is_event_exists(&self, name: &str) -> bool {
        self.error.is_none() && self.machine.has_event(name)
    }

    pub fn thread_count(&self) -> usize {
        self.machine.thread_count()
    }

    fn state(&self) -> Option<&ClientState> {
        self.machine.host_data::<ClientState>()
    }

    fn check(&self) -> Result<(), ScriptError> {
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn collect(&mut self) -> Result<(), ScriptError> {
        match self.machine.fault() {
            Some(fault) => {
                let error = ScriptError {
                    line: fault.line,
                    message: fault.message.clone(),
                };
                Err(self.fail(error))
            }
            None => Ok(()),
        }
    }

    fn fail(&mut self, error: ScriptError) -> ScriptError {
        warn!("Script client stopped: {}", error);
        self.error = Some(error.clone());
        error
    }
}

fn client_state(machine: &mut ScriptMachine) -> Result<&mut ClientState, VmError> {
    machine
        .host_data_mut::<ClientState>()
        .ok_or_else(|| VmError::Runtime("Script client state is not attached.".to_string()))
}

fn get_script_argument(machine: &mut ScriptMachine, args: &[Value]) -> Result<Value, VmError> {
    let index = args.first().map(Value::as_int).unwrap_or(-1);
    let state = client_state(machine)?;
    usize::try_from(index)
        .ok()
        .and_then(|index| state.arguments.get(index))
        .cloned()
        .ok_or_else(|| VmError::Runtime("Invalid script argument index.".to_string()))
}

fn get_script_argument_count(machine: &mut ScriptMachine, _args: &[Value]) -> Result<Value, VmError> {
    let count = client_state(machine)?.arguments.len();
    Ok(machine.types().int_value(count as i64))
}

fn set_script_result(machine: &mut ScriptMachine, args: &[Value]) -> Result<Value, VmError> {
    let value = match args.first() {
        Some(Value::Alias(slot)) => machine.slot(slot)?.clone(),
        Some(value) => value.clone(),
        None => Value::Empty,
    };
    client_state(machine)?.result = value;
    Ok(Value::Empty)
}
