use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use stagescript_types::Value;
use stagescript_vm::{
    create_builtin_registry, disassemble_program, BuiltinRegistry, MachineConfig, Program,
    ScriptClient, ScriptMachine, VmError,
};
use std::fs;
use std::rc::Rc;

/// Stagescript - cooperative script machine host
#[derive(Parser)]
#[command(name = "stagescript")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Load and drive compiled Stagescript programs")]
struct Cli {
    /// Log scheduling activity (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the main block, then tick an event
    Run {
        /// Program assembly (JSON)
        file: String,
        /// Event called once per tick
        #[arg(long, default_value = "tick")]
        event: String,
        /// Number of ticks after main
        #[arg(long, default_value_t = 0)]
        ticks: u32,
        /// Script argument as a JSON scalar or string; repeat for more
        #[arg(long = "arg", value_name = "VALUE")]
        args: Vec<String>,
        /// Hard cap on live environments
        #[arg(long)]
        max_environments: Option<usize>,
    },
    /// Print a listing of every block
    Disasm {
        /// Program assembly (JSON)
        file: String,
    },
    /// Load a program and report assembly errors without running it
    Check {
        /// Program assembly (JSON)
        file: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let outcome = match cli.command {
        Commands::Run {
            file,
            event,
            ticks,
            args,
            max_environments,
        } => run_command(&file, &event, ticks, &args, max_environments),
        Commands::Disasm { file } => disasm_command(&file),
        Commands::Check { file } => check_command(&file),
    };

    if let Err(err) = outcome {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

/// Builtins, client natives and `Print`
fn registry() -> BuiltinRegistry {
    let mut registry = create_builtin_registry();
    ScriptClient::register_natives(&mut registry);
    registry.register("Print", print_native, 1);
    registry
}

fn print_native(machine: &mut ScriptMachine, args: &[Value]) -> Result<Value, VmError> {
    let text = match args.first() {
        Some(Value::Alias(slot)) => machine.slot(slot)?.to_display_string(),
        Some(value) => value.to_display_string(),
        None => String::new(),
    };
    println!("{}", text);
    Ok(Value::Empty)
}

fn load(filename: &str) -> Result<Program> {
    let text = fs::read_to_string(filename)
        .with_context(|| format!("reading '{}'", filename))?;
    Program::from_json(&text, &registry()).with_context(|| format!("loading '{}'", filename))
}

/// Script argument from its command-line spelling
fn parse_argument(machine: &ScriptMachine, text: &str) -> Result<Value> {
    let types = machine.types();
    let value = match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Bool(b)) => types.boolean_value(b),
        Ok(serde_json::Value::Number(n)) => match n.as_i64() {
            Some(i) => types.int_value(i),
            None => types.float_value(n.as_f64().unwrap_or_default()),
        },
        Ok(serde_json::Value::String(s)) => types.string_value(&s),
        Ok(other) => bail!("unsupported script argument: {}", other),
        Err(_) => types.string_value(text),
    };
    Ok(value)
}

fn run_command(
    filename: &str,
    event: &str,
    ticks: u32,
    args: &[String],
    max_environments: Option<usize>,
) -> Result<()> {
    let program = Rc::new(load(filename)?);

    let mut config = MachineConfig::default();
    if let Some(max) = max_environments {
        let initial = config.initial_environments.min(max);
        config = config
            .with_max_environments(max)
            .with_initial_environments(initial);
    }
    let mut client = ScriptClient::with_config(program, config)
        .map_err(|err| anyhow::anyhow!("compile error: {}", err))?;

    for (index, text) in args.iter().enumerate() {
        let value = parse_argument(client.machine(), text)?;
        client.set_argument(index, value);
    }

    info!("Running main of '{}'", filename);
    client.run().map_err(|err| anyhow::anyhow!("script error: {}", err))?;
    println!("main: {} threads", client.thread_count());

    if ticks > 0 && !client.is_event_exists(event) {
        bail!("event '{}' does not exist", event);
    }
    for tick in 1..=ticks {
        client
            .run_event(event)
            .map_err(|err| anyhow::anyhow!("script error on tick {}: {}", tick, err))?;
        println!("tick {}: {} threads", tick, client.thread_count());
        if client.machine().is_terminated() {
            break;
        }
    }

    if let Some(message) = client.machine().terminate_message() {
        println!("terminated: {}", message);
    }
    let result = client.result();
    if result.has_data() {
        println!("result: {}", result);
    }
    Ok(())
}

fn disasm_command(filename: &str) -> Result<()> {
    let program = load(filename)?;
    print!("{}", disassemble_program(&program));
    Ok(())
}

fn check_command(filename: &str) -> Result<()> {
    let program = load(filename)?;
    println!("✓ Assembly OK ({} blocks)", program.blocks().len());
    if let Some(fault) = program.compile_error() {
        bail!("compile error at line {}: {}", fault.line, fault.message);
    }
    Ok(())
}
