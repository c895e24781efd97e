//! monkeylang: a small dynamically-typed scripting language compiled to
//! bytecode and run on a stack machine.
//!
//! This is the library root that exports all modules.
//!
//! # Pipeline
//!
//! Source text goes through [`lexer::Scanner`] and [`parser::Parser`] into an
//! AST, [`bytecode::Compiler`] lowers it to bytecode, and [`bytecode::Vm`]
//! executes it. Compiler and VM share a [`VmState`], so a session can compile
//! and run incrementally without losing earlier definitions.

// Allow some clippy lints that are stylistic and not critical
#![allow(clippy::module_inception)]
#![allow(clippy::result_large_err)]
#![allow(clippy::new_without_default)]
#![allow(clippy::collapsible_else_if)]

pub mod ast;
pub mod bytecode;
pub mod error;
pub mod lexer;
pub mod module;
pub mod parser;
pub mod repl_highlight;
pub mod repl_simple;
pub mod span;
pub mod value;

use std::fs;
use std::path::Path;

pub use bytecode::{Bytecode, Vm, VmState};
pub use error::MonkeyError;
pub use value::Value;

/// Lex and parse `source`.
pub fn parse(source: &str) -> Result<ast::Program, MonkeyError> {
    let tokens = lexer::Scanner::new(source).scan_tokens()?;
    let program = parser::Parser::new(tokens).parse()?;
    Ok(program)
}

/// Compile `source` against `state`. New globals and constants are recorded
/// in the state even if the bytecode is never run.
pub fn compile(state: &mut VmState, source: &str) -> Result<Bytecode, MonkeyError> {
    let program = parse(source)?;
    let bytecode = bytecode::Compiler::new(state).compile(&program)?;
    Ok(bytecode)
}

/// Compile and run `source` against `state`, returning the value of the last
/// expression statement.
pub fn run(state: &mut VmState, source: &str) -> Result<Value, MonkeyError> {
    let bytecode = compile(state, source)?;
    let mut vm = Vm::new(state, bytecode);
    vm.run()?;
    Ok(vm.last_popped())
}

/// Run `source` in a fresh state.
pub fn eval(source: &str) -> Result<Value, MonkeyError> {
    let mut state = VmState::new();
    run(&mut state, source)
}

/// Run the script at `path` against `state`.
pub fn run_file(state: &mut VmState, path: &Path) -> Result<Value, MonkeyError> {
    let source = fs::read_to_string(path)?;
    run(state, &source)
}

/// Compile `source` in a fresh state and render its bytecode.
pub fn disassemble(source: &str) -> Result<String, MonkeyError> {
    let mut state = VmState::new();
    let bytecode = compile(&mut state, source)?;
    Ok(bytecode::disassemble_with_constants(
        &bytecode.instructions,
        &bytecode.constants,
    ))
}
