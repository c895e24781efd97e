//! Loading modules named by `import(...)`.

use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use crate::bytecode::{Compiler, Vm, VmState};
use crate::error::RuntimeError;
use crate::lexer::Scanner;
use crate::parser::Parser;
use crate::value::{Module, Value};

/// Find, compile and run the module `name` against `state`.
///
/// The module shares the importer's globals and constants. The returned
/// module value exposes its uppercase globals.
pub fn load(state: &mut VmState, name: &str) -> Result<Value, RuntimeError> {
    if state.loading.iter().any(|loading| loading == name) {
        let mut cycle = state.loading.clone();
        cycle.push(name.to_string());
        return Err(RuntimeError::module(format!(
            "ImportError: circular import: {}",
            cycle.join(" -> ")
        )));
    }

    let path = state
        .search_path
        .find(name)
        .ok_or_else(|| RuntimeError::module(format!("ImportError: no module named '{}'", name)))?;

    let source = fs::read_to_string(&path).map_err(|e| {
        RuntimeError::module(format!("IOError: error reading module '{}': {}", name, e))
    })?;

    state.loading.push(name.to_string());
    let result = run_module(state, name, &source);
    state.loading.pop();
    result?;

    Ok(Value::Module(Rc::new(Module {
        name: name.to_string(),
        attrs: Rc::new(RefCell::new(state.exported())),
    })))
}

fn run_module(state: &mut VmState, name: &str, source: &str) -> Result<(), RuntimeError> {
    let tokens = Scanner::new(source)
        .scan_tokens()
        .map_err(|e| RuntimeError::module(format!("ParseError: {}", e)))?;
    let program = Parser::new(tokens)
        .parse()
        .map_err(|e| RuntimeError::module(format!("ParseError: {}", e)))?;

    let bytecode = Compiler::new(state)
        .compile(&program)
        .map_err(|e| RuntimeError::module(format!("CompileError: {}", e)))?;

    let mut vm = Vm::new(state, bytecode);
    vm.run().map_err(|e| {
        RuntimeError::module(format!(
            "RuntimeError: error loading module '{}': {}",
            name, e
        ))
    })
}
