//! Scoped symbol table for the checker

use crate::types::ValueType;
use rustc_hash::FxHashMap;

/// A stack of lexical scopes mapping variable names to their types.
#[derive(Debug, Default)]
pub struct SymbolTable {
    scopes: Vec<FxHashMap<String, ValueType>>,
}

impl SymbolTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new innermost scope.
    pub fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    /// Close the innermost scope.
    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Declare a name in the innermost scope, shadowing any outer binding.
    pub fn declare(&mut self, name: impl Into<String>, value_type: ValueType) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), value_type);
        }
    }

    /// Look a name up, innermost scope first.
    pub fn lookup(&self, name: &str) -> Option<&ValueType> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// True if the name is declared in the innermost scope.
    pub fn declared_in_current(&self, name: &str) -> bool {
        self.scopes
            .last()
            .map(|scope| scope.contains_key(name))
            .unwrap_or(false)
    }
}
