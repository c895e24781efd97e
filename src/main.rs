//! monkey CLI: Execute files or run the REPL.

use std::env;
use std::fs;
use std::path::Path;
use std::process;

use colored::Colorize;

use monkeylang::bytecode::print_disassembly;
use monkeylang::repl_simple::run_simple_repl;
use monkeylang::value::builtins::set_script_args;
use monkeylang::{MonkeyError, VmState};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable that turns on instruction tracing.
const TRACE_VAR: &str = "MONKEY_TRACE";

/// CLI command to execute.
enum Command {
    /// Run a script file
    Run { file: String, args: Vec<String> },
    /// Evaluate a string
    Eval { code: String },
    /// Start the REPL
    Repl,
}

/// CLI options parsed from arguments.
struct Options {
    command: Command,
    trace: bool,
    disassemble: bool,
}

fn print_usage() {
    eprintln!("monkey {} - bytecode interpreter", VERSION);
    eprintln!();
    eprintln!("Usage: monkey [options] [script.monkey [args...]]");
    eprintln!("       monkey [options] -e <code>");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -e <code>       Evaluate code and print the result");
    eprintln!("  --trace         Print every executed instruction to stderr");
    eprintln!("  --disassemble   Print the compiled bytecode before running");
    eprintln!("  --help, -h      Show this help message");
    eprintln!("  --version, -v   Show the version");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  MONKEYPATH      Colon-separated module search path (default: .)");
    eprintln!("  MONKEY_TRACE    Set to 1 to trace like --trace");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  monkey                        Start interactive REPL");
    eprintln!("  monkey script.monkey a b      Run a script; args() returns [\"a\", \"b\"]");
    eprintln!("  monkey -e 'print(1 + 1)'      Evaluate code directly");
}

fn parse_args() -> Options {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut options = Options {
        command: Command::Repl,
        trace: env::var(TRACE_VAR).map(|v| v == "1").unwrap_or(false),
        disassemble: false,
    };

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            "--version" | "-v" => {
                println!("monkey {}", VERSION);
                process::exit(0);
            }
            "--trace" => options.trace = true,
            "--disassemble" => options.disassemble = true,
            "-e" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("-e requires a code argument");
                    print_usage();
                    process::exit(64);
                }
                options.command = Command::Eval {
                    code: args[i].clone(),
                };
            }
            _ if arg.starts_with('-') => {
                eprintln!("Unknown option: {}", arg);
                print_usage();
                process::exit(64);
            }
            _ => {
                // Everything after the script belongs to the script.
                options.command = Command::Run {
                    file: arg.clone(),
                    args: args[i + 1..].to_vec(),
                };
                break;
            }
        }
        i += 1;
    }

    options
}

fn main() {
    let options = parse_args();

    let mut state = VmState::new();
    state.trace = options.trace;

    match &options.command {
        Command::Repl => run_simple_repl(state),
        Command::Run { file, args } => {
            set_script_args(args.clone());
            run_file(&mut state, file, &options)
        }
        Command::Eval { code } => run_eval(&mut state, code, &options),
    }
}

fn run_file(state: &mut VmState, path: &str, options: &Options) {
    let source = match fs::read_to_string(Path::new(path)) {
        Ok(source) => source,
        Err(e) => exit_with(MonkeyError::from(e)),
    };

    if let Err(e) = execute(state, &source, options) {
        exit_with(e);
    }
}

fn run_eval(state: &mut VmState, code: &str, options: &Options) {
    match execute(state, code, options) {
        Ok(monkeylang::Value::Null) => {}
        Ok(value) => println!("{}", value.inspect()),
        Err(e) => exit_with(e),
    }
}

fn execute(
    state: &mut VmState,
    source: &str,
    options: &Options,
) -> Result<monkeylang::Value, MonkeyError> {
    if !options.disassemble {
        return monkeylang::run(state, source);
    }

    let bytecode = monkeylang::compile(state, source)?;
    print_disassembly(&bytecode.instructions, &bytecode.constants);
    println!();

    let mut vm = monkeylang::Vm::new(state, bytecode);
    vm.run()?;
    Ok(vm.last_popped())
}

fn exit_with(error: MonkeyError) -> ! {
    eprintln!("{} {}", "Error:".red().bold(), error);
    process::exit(error.exit_code());
}
