//! Name resolution across nested lexical scopes.
//!
//! There is one table per function literal plus the global table. A name that
//! resolves to a local of an enclosing function is captured: every table
//! between the use and the definition records it as a free variable.

use std::collections::HashMap;

/// Where a symbol's value lives at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolScope {
    Global,
    Local,
    Free,
    Builtin,
    /// The function's reference to itself. Only ever stored in a free list;
    /// the slot starts as null and is filled by `SetSelf`.
    Function,
}

impl SymbolScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolScope::Global => "global",
            SymbolScope::Local => "local",
            SymbolScope::Free => "free",
            SymbolScope::Builtin => "builtin",
            SymbolScope::Function => "function",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

impl Symbol {
    fn new(name: &str, scope: SymbolScope, index: usize) -> Self {
        Self {
            name: name.to_string(),
            scope,
            index,
        }
    }
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    store: HashMap<String, Symbol>,
    num_definitions: usize,
    free_symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table for a function body nested inside `outer`.
    pub fn new_enclosed(outer: SymbolTable) -> Self {
        Self {
            outer: Some(Box::new(outer)),
            ..Self::default()
        }
    }

    /// Give back the enclosing table, dropping this one.
    pub fn into_outer(self) -> Option<SymbolTable> {
        self.outer.map(|outer| *outer)
    }

    /// Walk out to the outermost table, dropping every enclosed one.
    pub fn into_global(self) -> SymbolTable {
        let mut table = self;
        while let Some(outer) = table.outer.take() {
            table = *outer;
        }
        table
    }

    pub fn is_global(&self) -> bool {
        self.outer.is_none()
    }

    /// Number of slots handed out by `define`.
    pub fn len(&self) -> usize {
        self.num_definitions
    }

    pub fn is_empty(&self) -> bool {
        self.num_definitions == 0
    }

    /// The originals captured by this scope, in slot order.
    pub fn free_symbols(&self) -> &[Symbol] {
        &self.free_symbols
    }

    /// Every name defined directly in this table.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.store.values()
    }

    /// Look up `name` in this table only.
    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.store.get(name)
    }

    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.outer.is_none() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };
        let symbol = Symbol::new(name, scope, self.num_definitions);
        self.store.insert(name.to_string(), symbol.clone());
        self.num_definitions += 1;
        symbol
    }

    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol::new(name, SymbolScope::Builtin, index);
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    pub fn define_free(&mut self, original: Symbol) -> Symbol {
        let symbol = Symbol::new(&original.name, SymbolScope::Free, self.free_symbols.len());
        self.free_symbols.push(original);
        self.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }

    /// Make `name` refer to the function being compiled in this scope.
    pub fn define_self(&mut self, name: &str) -> Symbol {
        self.define_free(Symbol::new(name, SymbolScope::Function, 0))
    }

    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }

        let outer = self.outer.as_mut()?;
        let symbol = outer.resolve(name)?;
        match symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin => Some(symbol),
            _ => Some(self.define_free(symbol)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sym(name: &str, scope: SymbolScope, index: usize) -> Symbol {
        Symbol::new(name, scope, index)
    }

    #[test]
    fn test_define() {
        let mut global = SymbolTable::new();
        assert_eq!(global.define("a"), sym("a", SymbolScope::Global, 0));
        assert_eq!(global.define("b"), sym("b", SymbolScope::Global, 1));

        let mut local = SymbolTable::new_enclosed(global);
        assert_eq!(local.define("c"), sym("c", SymbolScope::Local, 0));
        assert_eq!(local.define("d"), sym("d", SymbolScope::Local, 1));
    }

    #[test]
    fn test_resolve_global_from_nested() {
        let mut global = SymbolTable::new();
        global.define("a");
        let mut local = SymbolTable::new_enclosed(global);

        assert_eq!(local.resolve("a"), Some(sym("a", SymbolScope::Global, 0)));
        assert!(local.free_symbols().is_empty());
    }

    #[test]
    fn test_resolve_builtin_unchanged() {
        let mut global = SymbolTable::new();
        global.define_builtin(3, "len");
        let first = SymbolTable::new_enclosed(global);
        let mut second = SymbolTable::new_enclosed(first);

        assert_eq!(second.resolve("len"), Some(sym("len", SymbolScope::Builtin, 3)));
    }

    #[test]
    fn test_resolve_free_through_every_intermediate_scope() {
        let mut global = SymbolTable::new();
        global.define("g");

        let mut first = SymbolTable::new_enclosed(global);
        first.define("a");

        let second = SymbolTable::new_enclosed(first);
        let mut third = SymbolTable::new_enclosed(second);
        third.define("c");

        assert_eq!(third.resolve("a"), Some(sym("a", SymbolScope::Free, 0)));
        assert_eq!(third.resolve("c"), Some(sym("c", SymbolScope::Local, 0)));
        assert_eq!(third.free_symbols(), &[sym("a", SymbolScope::Free, 0)]);

        let second = third.into_outer().unwrap();
        assert_eq!(second.free_symbols(), &[sym("a", SymbolScope::Local, 0)]);
    }

    #[test]
    fn test_into_global_unwinds_nesting() {
        let mut global = SymbolTable::new();
        global.define("a");
        let nested = SymbolTable::new_enclosed(SymbolTable::new_enclosed(global));

        let global = nested.into_global();
        assert!(global.is_global());
        assert_eq!(global.get("a"), Some(&sym("a", SymbolScope::Global, 0)));
    }

    #[test]
    fn test_unresolvable() {
        let global = SymbolTable::new();
        let mut local = SymbolTable::new_enclosed(global);
        assert_eq!(local.resolve("missing"), None);
    }

    #[test]
    fn test_define_self_shadowed_by_parameter() {
        let global = SymbolTable::new();
        let mut local = SymbolTable::new_enclosed(global);

        assert_eq!(local.define_self("f"), sym("f", SymbolScope::Free, 0));
        assert_eq!(local.resolve("f"), Some(sym("f", SymbolScope::Free, 0)));
        local.define("f");
        assert_eq!(local.resolve("f"), Some(sym("f", SymbolScope::Local, 0)));
        assert_eq!(local.free_symbols()[0].scope, SymbolScope::Function);
    }
}
