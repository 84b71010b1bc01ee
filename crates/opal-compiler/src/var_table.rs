//! Variable table: scoped name-to-slot mapping
//!
//! Slot indices are shared across the scope stack: a declaration takes the
//! next free slot, and popping a scope releases its slots for reuse by
//! later declarations at the same depth.

use rustc_hash::FxHashMap;

/// Stack of scopes mapping variable names to local slot indices.
#[derive(Debug, Default)]
pub struct VarTable {
    scopes: Vec<FxHashMap<String, usize>>,
    total: usize,
}

impl VarTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new innermost scope.
    pub fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    /// Close the innermost scope, releasing its slots.
    pub fn pop_scope(&mut self) {
        if let Some(scope) = self.scopes.pop() {
            self.total -= scope.len();
        }
    }

    /// Declare a name in the innermost scope, returning its slot.
    pub fn declare(&mut self, name: impl Into<String>) -> usize {
        let slot = self.total;
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), slot);
            self.total += 1;
        }
        slot
    }

    /// Look a name up, innermost scope first.
    pub fn get(&self, name: &str) -> Option<usize> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_slots() {
        let mut table = VarTable::new();
        table.push_scope();
        assert_eq!(table.declare("a"), 0);
        assert_eq!(table.declare("b"), 1);
        assert_eq!(table.get("a"), Some(0));
        assert_eq!(table.get("b"), Some(1));
    }

    #[test]
    fn test_slots_released_on_scope_pop() {
        let mut table = VarTable::new();
        table.push_scope();
        table.declare("a");
        table.push_scope();
        assert_eq!(table.declare("inner"), 1);
        table.pop_scope();
        assert_eq!(table.get("inner"), None);
        // The inner slot is reusable after its scope closes.
        assert_eq!(table.declare("b"), 1);
    }

    #[test]
    fn test_shadowing_resolves_innermost() {
        let mut table = VarTable::new();
        table.push_scope();
        table.declare("x");
        table.push_scope();
        let inner = table.declare("x");
        assert_eq!(table.get("x"), Some(inner));
        table.pop_scope();
        assert_eq!(table.get("x"), Some(0));
    }
}
