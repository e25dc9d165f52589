//! Lexical scopes for the checker.

use crate::types::Type;

#[derive(Debug, Clone)]
pub(crate) struct Var {
    pub name: String,
    pub ty: Type,
    pub mutable: bool,
    /// Function nesting level the variable was declared at.
    pub level: usize,
}

/// Block scopes stacked inside function levels.
///
/// Lambdas open a new level; a variable declared at a lower level than
/// the current one is a capture and cannot be assigned.
#[derive(Debug, Default)]
pub(crate) struct Env {
    vars: Vec<Var>,
    /// Start index into `vars` of each open scope.
    scopes: Vec<usize>,
    level: usize,
    /// Number of scopes open at each enclosing function level.
    level_marks: Vec<usize>,
}

impl Env {
    pub fn new() -> Self {
        Self {
            scopes: vec![0],
            ..Self::default()
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(self.vars.len());
    }

    pub fn pop_scope(&mut self) {
        if let Some(start) = self.scopes.pop() {
            self.vars.truncate(start);
        }
    }

    /// Enter a lambda body: a new level with its own parameter scope.
    pub fn enter_function(&mut self) {
        self.level_marks.push(self.scopes.len());
        self.level += 1;
        self.push_scope();
    }

    pub fn exit_function(&mut self) {
        let mark = self.level_marks.pop().unwrap_or(1);
        while self.scopes.len() > mark {
            self.pop_scope();
        }
        self.level = self.level.saturating_sub(1);
    }

    /// Declare in the innermost scope. Fails with the existing variable
    /// when the name is already declared in that scope.
    pub fn declare(&mut self, name: &str, ty: Type, mutable: bool) -> Result<(), Var> {
        let start = self.scopes.last().copied().unwrap_or(0);
        if let Some(existing) = self.vars[start..].iter().find(|v| v.name == name) {
            return Err(existing.clone());
        }
        self.vars.push(Var {
            name: name.to_string(),
            ty,
            mutable,
            level: self.level,
        });
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&Var> {
        self.vars.iter().rev().find(|v| v.name == name)
    }
}
