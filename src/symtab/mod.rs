//! Symbol table: a lexically-scoped stack of name -> entry maps, plus
//! the nestable read-only tracker used to protect FOR control
//! variables.

use std::collections::HashMap;

use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Global,
    Local,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub enum SymbolEntry {
    Var {
        ty: Type,
        level: Level,
        addr: i64,
    },
    Func {
        params: Vec<Param>,
        ret: Type,
        label: String,
    },
    Proc {
        params: Vec<Param>,
        label: String,
    },
    BuiltinFunc,
}

impl SymbolEntry {
    pub fn kind_name(&self) -> &'static str {
        match self {
            SymbolEntry::Var { .. } => "variable",
            SymbolEntry::Func { .. } => "function",
            SymbolEntry::Proc { .. } => "procedure",
            SymbolEntry::BuiltinFunc => "builtin function",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadonlyReason {
    ForControl,
    Other,
}

/// A declaration attempt that collided with an existing name.
pub struct RedeclarationError {
    pub name: String,
    pub shadows_builtin: bool,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    scopes: Vec<HashMap<String, SymbolEntry>>,
    readonly_counts: HashMap<String, (u32, ReadonlyReason)>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
            readonly_counts: HashMap::new(),
        }
    }

    pub fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    /// Declares `name` in the innermost scope. Fails if the name already
    /// exists there, or if it would shadow a global builtin (unless
    /// `declaring_builtin` is set, used only during builtin registration).
    pub fn declare(
        &mut self,
        name: &str,
        entry: SymbolEntry,
        declaring_builtin: bool,
    ) -> Result<(), RedeclarationError> {
        if !declaring_builtin {
            if let Some(SymbolEntry::BuiltinFunc) = self.scopes[0].get(name) {
                return Err(RedeclarationError {
                    name: name.to_string(),
                    shadows_builtin: true,
                });
            }
        }

        let top = self.scopes.last_mut().expect("global scope always present");
        if top.contains_key(name) {
            return Err(RedeclarationError {
                name: name.to_string(),
                shadows_builtin: false,
            });
        }
        top.insert(name.to_string(), entry);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&SymbolEntry> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn global_scope_lookup(&self, name: &str) -> Option<&SymbolEntry> {
        self.scopes[0].get(name)
    }

    pub fn readonly_enter(&mut self, name: &str, reason: ReadonlyReason) {
        let entry = self
            .readonly_counts
            .entry(name.to_string())
            .or_insert((0, reason));
        entry.0 += 1;
    }

    pub fn readonly_exit(&mut self, name: &str) {
        if let Some((count, reason)) = self.readonly_counts.get(name).copied() {
            if count <= 1 {
                self.readonly_counts.remove(name);
            } else {
                self.readonly_counts.insert(name.to_string(), (count - 1, reason));
            }
        }
    }

    /// Returns the reason a name is currently read-only, if any.
    pub fn readonly_reason(&self, name: &str) -> Option<ReadonlyReason> {
        self.readonly_counts
            .get(name)
            .filter(|(count, _)| *count > 0)
            .map(|(_, reason)| *reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(ty: Type, level: Level, addr: i64) -> SymbolEntry {
        SymbolEntry::Var { ty, level, addr }
    }

    #[test]
    fn new_starts_with_one_global_scope() {
        let st = SymbolTable::new();
        assert_eq!(st.depth(), 0);
    }

    #[test]
    fn declare_and_lookup() {
        let mut st = SymbolTable::new();
        st.declare("x", var(Type::Integer, Level::Global, 0), false)
            .unwrap();
        assert!(matches!(st.lookup("x"), Some(SymbolEntry::Var { .. })));
    }

    #[test]
    fn redeclaration_in_same_scope_fails() {
        let mut st = SymbolTable::new();
        st.declare("x", var(Type::Integer, Level::Global, 0), false)
            .unwrap();
        let err = st
            .declare("x", var(Type::Real, Level::Global, 1), false)
            .unwrap_err();
        assert_eq!(err.name, "x");
        assert!(!err.shadows_builtin);
    }

    #[test]
    fn push_pop_scopes_shadow_and_restore() {
        let mut st = SymbolTable::new();
        st.declare("x", var(Type::Integer, Level::Global, 0), false)
            .unwrap();
        st.push();
        st.declare("x", var(Type::Real, Level::Local, 1), false)
            .unwrap();
        assert!(matches!(
            st.lookup("x"),
            Some(SymbolEntry::Var { ty: Type::Real, .. })
        ));
        st.pop();
        assert!(matches!(
            st.lookup("x"),
            Some(SymbolEntry::Var { ty: Type::Integer, .. })
        ));
    }

    #[test]
    fn builtin_shadowing_is_rejected() {
        let mut st = SymbolTable::new();
        st.declare("length", SymbolEntry::BuiltinFunc, true).unwrap();
        let err = st
            .declare("length", var(Type::Integer, Level::Global, 0), false)
            .unwrap_err();
        assert!(err.shadows_builtin);
    }

    #[test]
    fn readonly_counter_is_nestable() {
        let mut st = SymbolTable::new();
        assert_eq!(st.readonly_reason("i"), None);
        st.readonly_enter("i", ReadonlyReason::ForControl);
        st.readonly_enter("i", ReadonlyReason::ForControl);
        assert_eq!(st.readonly_reason("i"), Some(ReadonlyReason::ForControl));
        st.readonly_exit("i");
        assert_eq!(st.readonly_reason("i"), Some(ReadonlyReason::ForControl));
        st.readonly_exit("i");
        assert_eq!(st.readonly_reason("i"), None);
    }
}
