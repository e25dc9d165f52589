//! Checked, runnable programs.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::{Block, Decl, FnDecl, FnKind};
use crate::bundle::SourceBundle;
use crate::diagnostic::Diagnostic;
use crate::interp::{Budget, Exhausted, Interpreter, RuntimeError};
use crate::span::UnitId;
use crate::typeck::check_bundle;
use crate::value::Value;

/// A declared function and the unit it lives in.
#[derive(Debug, Clone)]
pub(crate) struct Callable {
    pub decl: Arc<FnDecl>,
    pub unit: UnitId,
}

/// Why a bundle did not become a [`Program`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    /// Ordered by unit, then position. Never empty.
    #[error("compilation failed with {} diagnostic(s)", .0.len())]
    Diagnostics(Vec<Diagnostic>),

    #[error(transparent)]
    Cancelled(#[from] Exhausted),
}

/// A bundle that passed checking, ready to run its snippet.
#[derive(Debug)]
pub struct Program {
    functions: HashMap<String, Callable>,
    methods: HashMap<String, HashMap<String, Callable>>,
    statics: HashMap<String, HashMap<String, Callable>>,
    snippet: Arc<Block>,
    snippet_unit: UnitId,
    bindings: Vec<(Arc<str>, Value)>,
}

impl Program {
    /// Check `bundle` and build a program whose snippet returns a value of
    /// the type named `expected`.
    ///
    /// Syntax errors short-circuit: when any unit fails to parse, only
    /// syntax diagnostics are returned. Checking gives up with
    /// [`CompileError::Cancelled`] once `budget` runs out.
    pub fn compile(
        bundle: &SourceBundle,
        expected: &str,
        bindings: Vec<(String, Value)>,
        budget: &Budget,
    ) -> Result<Program, CompileError> {
        let mut syntax = bundle.syntax_diagnostics();
        if !syntax.is_empty() {
            syntax.sort_by_key(|d| (d.unit, d.span.start));
            return Err(CompileError::Diagnostics(syntax));
        }

        let diagnostics = check_bundle(bundle, expected, &bindings, budget)?;
        if !diagnostics.is_empty() {
            return Err(CompileError::Diagnostics(diagnostics));
        }

        let mut functions = HashMap::new();
        let mut methods: HashMap<String, HashMap<String, Callable>> = HashMap::new();
        let mut statics: HashMap<String, HashMap<String, Callable>> = HashMap::new();
        for (unit, parsed) in bundle.units() {
            for decl in &parsed.module.decls {
                let Decl::Fn(decl) = decl else { continue };
                let callable = Callable {
                    decl: decl.clone(),
                    unit,
                };
                let name = decl.name.name.clone();
                match &decl.kind {
                    FnKind::Free => {
                        functions.entry(name).or_insert(callable);
                    }
                    FnKind::Method { owner } => {
                        methods
                            .entry(owner.name.clone())
                            .or_default()
                            .entry(name)
                            .or_insert(callable);
                    }
                    FnKind::Static { owner } => {
                        statics
                            .entry(owner.name.clone())
                            .or_default()
                            .entry(name)
                            .or_insert(callable);
                    }
                }
            }
        }

        tracing::debug!(
            functions = functions.len(),
            methods = methods.values().map(HashMap::len).sum::<usize>(),
            statics = statics.values().map(HashMap::len).sum::<usize>(),
            "program compiled"
        );

        Ok(Program {
            functions,
            methods,
            statics,
            snippet: bundle.snippet().body.clone(),
            snippet_unit: bundle.snippet_unit(),
            bindings: bindings
                .into_iter()
                .map(|(name, value)| (Arc::from(name), value))
                .collect(),
        })
    }

    /// Run the snippet to completion or until `budget` runs out.
    pub fn run(&self, budget: &Budget) -> Result<Value, RuntimeError> {
        Interpreter::new(self, budget).run_snippet(&self.snippet, self.snippet_unit, &self.bindings)
    }

    pub(crate) fn function(&self, name: &str) -> Option<&Callable> {
        self.functions.get(name)
    }

    pub(crate) fn method(&self, owner: &str, name: &str) -> Option<&Callable> {
        self.methods.get(owner).and_then(|m| m.get(name))
    }

    pub(crate) fn static_fn(&self, owner: &str, name: &str) -> Option<&Callable> {
        self.statics.get(owner).and_then(|m| m.get(name))
    }
}
