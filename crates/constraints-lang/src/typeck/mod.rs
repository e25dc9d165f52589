//! Static checking of a whole source bundle.
//!
//! Checking runs in passes over every unit in bundle order:
//!
//! 1. collect type names
//! 2. resolve aliases and node field schemas
//! 3. collect function, method, and static signatures
//! 4. check declared function bodies
//! 5. check the snippet against the expected output type
//!
//! All units share one namespace, so a library may use types declared by a
//! later unit. Errors poison to [`Type::Error`] to avoid cascades.
//!
//! Every pass polls the compilation [`Budget`]. Alias expansion is capped
//! at [`MAX_NESTING`] levels and every type, declared or inferred, at
//! [`MAX_TYPE_NODES`] nodes.

mod env;
mod expr;
mod stmt;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::ast::{Decl, FnDecl, FnKind, Param, TypeBody, TypeDecl, TypeExpr, TypeExprKind};
use crate::bundle::SourceBundle;
use crate::diagnostic::{Category, Diagnostic};
use crate::interp::{Budget, Exhausted, Meter};
use crate::parser::MAX_NESTING;
use crate::span::{Span, UnitId};
use crate::types::{FnType, Type, MAX_TYPE_NODES};
use crate::value::Value;

use env::Env;

/// Signature of a declared function, method, or static.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FnSig {
    pub params: Vec<Type>,
    /// Element type of a trailing rest parameter.
    pub rest: Option<Type>,
    pub ret: Type,
}

impl FnSig {
    fn from_fn_type(func: &FnType) -> Self {
        Self {
            params: func.params.clone(),
            rest: None,
            ret: func.ret.clone(),
        }
    }

    /// Function type of this signature used as a value. A rest parameter
    /// becomes a trailing array parameter.
    pub fn as_type(&self) -> Type {
        let mut params = self.params.clone();
        if let Some(rest) = &self.rest {
            params.push(Type::array(rest.clone()));
        }
        Type::function(params, self.ret.clone())
    }
}

/// Bundle-wide declarations, fully resolved.
#[derive(Debug, Default)]
pub(crate) struct Globals {
    /// Node types and their field schema (`None` for opaque nodes).
    nodes: HashMap<String, Option<IndexMap<String, Type>>>,
    aliases: HashMap<String, Type>,
    functions: HashMap<String, FnSig>,
    methods: HashMap<String, HashMap<String, FnSig>>,
    statics: HashMap<String, HashMap<String, FnSig>>,
}

fn builtin(name: &str) -> Option<Type> {
    match name {
        "number" => Some(Type::Number),
        "string" => Some(Type::String),
        "boolean" => Some(Type::Boolean),
        _ => None,
    }
}

/// Name lookup and reporting while lowering type expressions.
trait Lowering {
    fn named(&mut self, name: &str, span: Span) -> Type;
    fn report(&mut self, category: Category, span: Span, message: String);
}

/// Lower a type expression. Composite results over [`MAX_TYPE_NODES`]
/// nodes are reported and poisoned.
fn lower(texpr: &TypeExpr, cx: &mut dyn Lowering) -> Type {
    let ty = match &texpr.kind {
        TypeExprKind::Named(name) => return cx.named(name, texpr.span),
        TypeExprKind::StringLiteral(value) => return Type::literal(value),
        TypeExprKind::Array(element) => Type::array(lower(element, cx)),
        TypeExprKind::Union(members) => {
            let lowered: Vec<Type> = members.iter().map(|m| lower(m, cx)).collect();
            Type::union(lowered)
        }
        TypeExprKind::Function { params, ret } => {
            let params = params.iter().map(|p| lower(p, cx)).collect();
            Type::function(params, lower(ret, cx))
        }
    };
    if ty.size_within(MAX_TYPE_NODES) {
        ty
    } else {
        cx.report(
            Category::CircularType,
            texpr.span,
            format!("type is too complex (limit {MAX_TYPE_NODES} parts)"),
        );
        Type::Error
    }
}

/// Lowering against finished [`Globals`], as inside function bodies.
struct Lookup<'a> {
    globals: &'a Globals,
    unit: UnitId,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl Lowering for Lookup<'_> {
    fn named(&mut self, name: &str, span: Span) -> Type {
        if let Some(ty) = self.globals.resolve_name(name) {
            return ty;
        }
        self.report(Category::UnknownType, span, format!("cannot find type '{name}'"));
        Type::Error
    }

    fn report(&mut self, category: Category, span: Span, message: String) {
        self.diagnostics
            .push(Diagnostic::new(category, span, message).in_unit(self.unit));
    }
}

impl Globals {
    pub fn is_type(&self, name: &str) -> bool {
        builtin(name).is_some() || self.nodes.contains_key(name) || self.aliases.contains_key(name)
    }

    /// Schema of node type `name`; `Some(None)` for an opaque node.
    pub fn node_schema(&self, name: &str) -> Option<Option<&IndexMap<String, Type>>> {
        self.nodes.get(name).map(Option::as_ref)
    }

    pub fn function(&self, name: &str) -> Option<&FnSig> {
        self.functions.get(name)
    }

    pub fn method(&self, owner: &str, name: &str) -> Option<&FnSig> {
        self.methods.get(owner).and_then(|m| m.get(name))
    }

    pub fn static_fn(&self, owner: &str, name: &str) -> Option<&FnSig> {
        self.statics.get(owner).and_then(|m| m.get(name))
    }

    pub fn has_statics(&self, owner: &str) -> bool {
        self.statics.contains_key(owner)
    }

    /// Resolve a type written inside a function body.
    pub fn resolve(&self, texpr: &TypeExpr, unit: UnitId, diagnostics: &mut Vec<Diagnostic>) -> Type {
        lower(
            texpr,
            &mut Lookup {
                globals: self,
                unit,
                diagnostics,
            },
        )
    }

    /// Resolve a type by name, as the expected output type is given.
    pub fn resolve_name(&self, name: &str) -> Option<Type> {
        builtin(name)
            .or_else(|| self.nodes.contains_key(name).then(|| Type::node(name)))
            .or_else(|| self.aliases.get(name).cloned())
    }
}

/// Builds [`Globals`] from the declaration units (passes 1 to 3).
struct Collector<'m> {
    globals: Globals,
    type_decls: IndexMap<String, (UnitId, Arc<TypeDecl>)>,
    /// Aliases being expanded, innermost last.
    resolving: Vec<String>,
    reported_cycles: HashSet<String>,
    diagnostics: Vec<Diagnostic>,
    meter: &'m Meter<'m>,
}

impl<'m> Collector<'m> {
    fn new(meter: &'m Meter<'m>) -> Self {
        Self {
            globals: Globals::default(),
            type_decls: IndexMap::new(),
            resolving: Vec::new(),
            reported_cycles: HashSet::new(),
            diagnostics: Vec::new(),
            meter,
        }
    }

    fn report(&mut self, category: Category, unit: UnitId, span: Span, message: String) {
        self.diagnostics
            .push(Diagnostic::new(category, span, message).in_unit(unit));
    }

    // === Pass 1 ===

    fn declare_type(&mut self, unit: UnitId, decl: &Arc<TypeDecl>) {
        let name = &decl.name.name;
        if builtin(name).is_some() {
            self.report(
                Category::DuplicateName,
                unit,
                decl.name.span,
                format!("'{name}' is a built-in type and cannot be redeclared"),
            );
        } else if self.type_decls.contains_key(name) {
            self.report(
                Category::DuplicateName,
                unit,
                decl.name.span,
                format!("duplicate type '{name}'"),
            );
        } else {
            self.type_decls.insert(name.clone(), (unit, decl.clone()));
        }
    }

    // === Pass 2 ===

    fn resolve_types(&mut self) {
        // Node names first, so field and alias types can refer to them.
        for (name, (_, decl)) in &self.type_decls {
            if !matches!(decl.body, TypeBody::Alias(_)) {
                self.globals.nodes.insert(name.clone(), None);
            }
        }

        let decls: Vec<(UnitId, Arc<TypeDecl>)> = self.type_decls.values().cloned().collect();
        for (unit, decl) in decls {
            if self.meter.is_exhausted() {
                return;
            }
            match &decl.body {
                TypeBody::Opaque => {}
                TypeBody::Alias(_) => {
                    self.resolve_alias(unit, &decl);
                }
                TypeBody::Fields(fields) => {
                    let mut schema = IndexMap::new();
                    for field in fields {
                        let ty = self.resolve(&field.ty, unit);
                        if schema.contains_key(&field.name.name) {
                            self.report(
                                Category::DuplicateName,
                                unit,
                                field.name.span,
                                format!("duplicate field '{}' in type '{}'", field.name.name, decl.name.name),
                            );
                        } else {
                            schema.insert(field.name.name.clone(), ty);
                        }
                    }
                    self.globals.nodes.insert(decl.name.name.clone(), Some(schema));
                }
            }
        }
    }

    fn resolve(&mut self, texpr: &TypeExpr, unit: UnitId) -> Type {
        lower(texpr, &mut Scoped { collector: self, unit })
    }

    fn resolve_named(&mut self, name: &str, span: Span, unit: UnitId) -> Type {
        if !self.meter.tick() {
            return Type::Error;
        }
        if let Some(ty) = builtin(name) {
            return ty;
        }
        match self.type_decls.get(name).cloned() {
            Some((decl_unit, decl)) => match decl.body {
                TypeBody::Alias(_) => self.resolve_alias(decl_unit, &decl),
                _ => Type::node(name),
            },
            None => {
                self.report(
                    Category::UnknownType,
                    unit,
                    span,
                    format!("cannot find type '{name}'"),
                );
                Type::Error
            }
        }
    }

    fn resolve_alias(&mut self, unit: UnitId, decl: &TypeDecl) -> Type {
        let name = &decl.name.name;
        if let Some(ty) = self.globals.aliases.get(name) {
            return ty.clone();
        }
        let TypeBody::Alias(target) = &decl.body else {
            return Type::node(name);
        };
        let message = if self.resolving.iter().any(|n| n == name) {
            Some(format!("type alias '{name}' circularly references itself"))
        } else if self.resolving.len() >= MAX_NESTING {
            Some(format!("type alias '{name}' is nested too deeply (limit {MAX_NESTING})"))
        } else {
            None
        };
        if let Some(message) = message {
            if self.reported_cycles.insert(name.clone()) {
                self.report(Category::CircularType, unit, decl.name.span, message);
            }
            return Type::Error;
        }
        self.resolving.push(name.clone());
        let ty = self.resolve(target, unit);
        self.resolving.pop();
        self.globals.aliases.insert(name.clone(), ty.clone());
        ty
    }

    // === Pass 3 ===

    fn signature(&mut self, unit: UnitId, decl: &FnDecl) -> FnSig {
        let mut params = Vec::with_capacity(decl.params.len());
        let mut rest = None;
        for param in &decl.params {
            let ty = match &param.ty {
                Some(texpr) => self.resolve(texpr, unit),
                None => Type::Error,
            };
            if param.rest {
                rest = Some(self.rest_element(unit, param, ty));
            } else {
                params.push(ty);
            }
        }
        let ret = self.resolve(&decl.ret, unit);
        FnSig { params, rest, ret }
    }

    fn rest_element(&mut self, unit: UnitId, param: &Param, ty: Type) -> Type {
        match ty {
            Type::Array(element) => Type::clone(&element),
            Type::Error => Type::Error,
            other => {
                self.report(
                    Category::TypeMismatch,
                    unit,
                    param.span,
                    format!("a rest parameter must be of an array type, found '{other}'"),
                );
                Type::Error
            }
        }
    }

    fn declare_fn(&mut self, unit: UnitId, decl: &FnDecl) {
        let sig = self.signature(unit, decl);
        let name = decl.name.name.clone();
        match &decl.kind {
            FnKind::Free => {
                if self.globals.functions.contains_key(&name) {
                    self.report(
                        Category::DuplicateName,
                        unit,
                        decl.name.span,
                        format!("duplicate function '{name}'"),
                    );
                } else {
                    self.globals.functions.insert(name, sig);
                }
            }
            FnKind::Method { owner } => {
                let schema = match self.globals.nodes.get(&owner.name) {
                    Some(schema) => schema,
                    None => {
                        let (category, message) = if self.globals.is_type(&owner.name) {
                            (
                                Category::TypeMismatch,
                                format!("methods can only be declared on node types; '{}' is not one", owner.name),
                            )
                        } else {
                            (Category::UnknownType, format!("cannot find type '{}'", owner.name))
                        };
                        self.report(category, unit, owner.span, message);
                        return;
                    }
                };
                let clashes_with_field = schema.as_ref().is_some_and(|s| s.contains_key(&name));
                let methods = self.globals.methods.entry(owner.name.clone()).or_default();
                if clashes_with_field || methods.contains_key(&name) {
                    self.report(
                        Category::DuplicateName,
                        unit,
                        decl.name.span,
                        format!("duplicate member '{name}' on type '{}'", owner.name),
                    );
                } else {
                    methods.insert(name, sig);
                }
            }
            FnKind::Static { owner } => {
                if !self.globals.is_type(&owner.name) {
                    self.report(
                        Category::UnknownType,
                        unit,
                        owner.span,
                        format!("cannot find type '{}'", owner.name),
                    );
                    return;
                }
                let statics = self.globals.statics.entry(owner.name.clone()).or_default();
                if statics.contains_key(&name) {
                    self.report(
                        Category::DuplicateName,
                        unit,
                        decl.name.span,
                        format!("duplicate static function '{}.{name}'", owner.name),
                    );
                } else {
                    statics.insert(name, sig);
                }
            }
        }
    }
}

/// Lowering during collection, for declarations in `unit`.
struct Scoped<'c, 'm> {
    collector: &'c mut Collector<'m>,
    unit: UnitId,
}

impl Lowering for Scoped<'_, '_> {
    fn named(&mut self, name: &str, span: Span) -> Type {
        self.collector.resolve_named(name, span, self.unit)
    }

    fn report(&mut self, category: Category, span: Span, message: String) {
        self.collector.report(category, self.unit, span, message);
    }
}

/// Check `bundle`; the snippet must return values assignable to the type
/// named `expected`. `bindings` are constants visible to the snippet.
///
/// Diagnostics are ordered by unit, then by position within the unit.
/// Fails with [`Exhausted`] once `budget` runs out, discarding whatever
/// was found so far.
pub fn check_bundle(
    bundle: &SourceBundle,
    expected: &str,
    bindings: &[(String, Value)],
    budget: &Budget,
) -> Result<Vec<Diagnostic>, Exhausted> {
    let meter = Meter::new(budget);
    let mut collector = Collector::new(&meter);

    for (unit, parsed) in bundle.units() {
        for decl in &parsed.module.decls {
            if let Decl::Type(decl) = decl {
                meter.tick();
                collector.declare_type(unit, decl);
            }
        }
        meter.check()?;
    }
    collector.resolve_types();
    meter.check()?;

    let mut bodies = Vec::new();
    for (unit, parsed) in bundle.units() {
        for decl in &parsed.module.decls {
            if let Decl::Fn(decl) = decl {
                collector.declare_fn(unit, decl);
                bodies.push((unit, decl.clone()));
            }
        }
        meter.check()?;
    }

    let Collector {
        globals,
        mut diagnostics,
        ..
    } = collector;

    for (unit, decl) in &bodies {
        stmt::check_fn_body(&globals, &meter, *unit, decl, &mut diagnostics);
        meter.check()?;
    }

    let snippet_unit = bundle.snippet_unit();
    let snippet = bundle.snippet();
    match globals.resolve_name(expected) {
        Some(expected_ty) => stmt::check_snippet(
            &globals,
            &meter,
            snippet_unit,
            &snippet.body,
            snippet.source.end_span(),
            &expected_ty,
            bindings,
            &mut diagnostics,
        ),
        None => diagnostics.push(
            Diagnostic::new(
                Category::UnknownType,
                Span::point(0),
                format!("cannot find expected output type '{expected}'"),
            )
            .in_unit(snippet_unit),
        ),
    }
    meter.check()?;

    diagnostics.sort_by_key(|d| (d.unit, d.span.start));
    Ok(diagnostics)
}

/// Shared state of one body check.
pub(crate) struct Checker<'g> {
    globals: &'g Globals,
    meter: &'g Meter<'g>,
    unit: UnitId,
    env: Env,
    diagnostics: &'g mut Vec<Diagnostic>,
    /// Return type context of the enclosing function and lambdas.
    fn_stack: Vec<FnCtx>,
    /// Type of `self` inside methods.
    receiver: Option<Type>,
}

#[derive(Debug)]
struct FnCtx {
    /// Declared or contextual return type.
    ret: Option<Type>,
    /// Types of `return` expressions, for inference.
    returns: Vec<Type>,
}

impl<'g> Checker<'g> {
    fn new(globals: &'g Globals, meter: &'g Meter<'g>, unit: UnitId, diagnostics: &'g mut Vec<Diagnostic>) -> Self {
        Self {
            globals,
            meter,
            unit,
            env: Env::new(),
            diagnostics,
            fn_stack: Vec::new(),
            receiver: None,
        }
    }

    fn report(&mut self, category: Category, span: Span, message: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::new(category, span, message).in_unit(self.unit));
    }

    /// Report a mismatch unless `actual` is assignable to `target`.
    fn expect_assignable(&mut self, actual: &Type, target: &Type, span: Span) -> bool {
        if actual.is_assignable_to(target) {
            return true;
        }
        self.report(
            Category::TypeMismatch,
            span,
            format!("type '{actual}' is not assignable to type '{target}'"),
        );
        false
    }

    fn resolve(&mut self, texpr: &TypeExpr) -> Type {
        self.globals.resolve(texpr, self.unit, self.diagnostics)
    }
}

#[cfg(test)]
mod tests;
