//! Session state shared by the compiler and every VM run.

use crate::bytecode::symbol_table::{SymbolScope, SymbolTable};
use crate::module::SearchPath;
use crate::value::{HashKey, HashPair, HashTable, Value, BUILTINS};

/// Number of global slots.
pub const GLOBALS_SIZE: usize = 65536;

/// Everything that outlives a single compile-and-run cycle.
///
/// One state is created per session (a script run, a REPL session) and
/// passed by `&mut` to every compiler and VM in that session. Module imports
/// compile and run against the same state.
pub struct VmState {
    /// Append-only constant pool
    pub constants: Vec<Value>,
    /// Global slots, indexed by the global symbol's index
    pub globals: Vec<Value>,
    pub symbol_table: SymbolTable,
    pub search_path: SearchPath,
    /// Trace every executed instruction to stderr
    pub trace: bool,
    /// Modules currently being loaded, outermost first
    pub(crate) loading: Vec<String>,
}

impl VmState {
    /// A fresh state using the search path from `MONKEYPATH`.
    pub fn new() -> Self {
        Self::with_search_path(SearchPath::from_env())
    }

    pub fn with_search_path(search_path: SearchPath) -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name);
        }

        Self {
            constants: Vec::new(),
            globals: vec![Value::Null; GLOBALS_SIZE],
            symbol_table,
            search_path,
            trace: false,
            loading: Vec::new(),
        }
    }

    /// Current value of a global by name.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.symbol_table
            .get(name)
            .filter(|symbol| symbol.scope == SymbolScope::Global)
            .map(|symbol| self.globals[symbol.index].clone())
    }

    /// Every defined global in definition order.
    pub fn globals(&self) -> Vec<(String, Value)> {
        let mut symbols: Vec<_> = self
            .symbol_table
            .symbols()
            .filter(|symbol| symbol.scope == SymbolScope::Global)
            .collect();
        symbols.sort_by_key(|symbol| symbol.index);

        symbols
            .into_iter()
            .map(|symbol| (symbol.name.clone(), self.globals[symbol.index].clone()))
            .collect()
    }

    /// The globals visible to importers: names starting with an uppercase
    /// letter.
    pub fn exported(&self) -> HashTable {
        let mut table = HashTable::default();
        for (name, value) in self.globals() {
            if !name.starts_with(|c: char| c.is_ascii_uppercase()) {
                continue;
            }
            let key = Value::String(name);
            if let Some(hash_key) = HashKey::from_value(&key) {
                table.insert(hash_key, HashPair { key, value });
            }
        }
        table
    }
}

impl Default for VmState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compiler::Compiler;
    use crate::bytecode::vm::Vm;
    use crate::lexer::Scanner;
    use crate::parser::Parser;

    fn run(state: &mut VmState, source: &str) {
        let tokens = Scanner::new(source).scan_tokens().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let bytecode = Compiler::new(state).compile(&program).unwrap();
        Vm::new(state, bytecode).run().unwrap();
    }

    #[test]
    fn test_builtins_registered_by_name() {
        let mut state = VmState::new();
        let symbol = state.symbol_table.resolve("len").unwrap();
        assert_eq!(symbol.scope, SymbolScope::Builtin);
        assert_eq!(BUILTINS[symbol.index].name, "len");
    }

    #[test]
    fn test_globals_in_definition_order() {
        let mut state = VmState::new();
        run(&mut state, "b := 1; a := 2;");

        let names: Vec<_> = state.globals().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(state.global("a"), Some(Value::Integer(2)));
        assert_eq!(state.global("len"), None);
    }

    #[test]
    fn test_exported_only_uppercase() {
        let mut state = VmState::new();
        run(&mut state, "Public := 1; private := 2;");

        let exported = state.exported();
        assert_eq!(exported.len(), 1);
        let pair = exported.values().next().unwrap();
        assert_eq!(pair.key, Value::string("Public"));
        assert_eq!(pair.value, Value::Integer(1));
    }
}
