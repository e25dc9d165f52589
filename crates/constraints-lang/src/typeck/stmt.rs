//! Statement checking and function bodies.

use super::{Checker, FnCtx, Globals};
use crate::interp::Meter;
use crate::ast::{Block, ExprKind, FnDecl, FnKind, Stmt, StmtKind};
use crate::diagnostic::{Category, Diagnostic};
use crate::span::{Span, UnitId};
use crate::types::Type;
use crate::value::Value;

/// Whether every path through `block` ends in `return` or `throw`.
///
/// `while (true)` never completes normally, so it terminates too.
pub(super) fn terminates(block: &[Stmt]) -> bool {
    block.iter().any(|stmt| match &stmt.kind {
        StmtKind::Return(_) | StmtKind::Throw(_) => true,
        StmtKind::If {
            then_block,
            else_block: Some(else_block),
            ..
        } => terminates(then_block) && terminates(else_block),
        StmtKind::While { cond, .. } => matches!(cond.kind, ExprKind::Bool(true)),
        StmtKind::Block(inner) => terminates(inner),
        _ => false,
    })
}

pub(super) fn check_fn_body(
    globals: &Globals,
    meter: &Meter<'_>,
    unit: UnitId,
    decl: &FnDecl,
    diagnostics: &mut Vec<Diagnostic>,
) {
    // Annotations were resolved (and reported) when the signature was
    // collected; a rest parameter is bound with its array type.
    let mut scratch = Vec::new();
    let params: Vec<Type> = decl
        .params
        .iter()
        .map(|p| match &p.ty {
            Some(texpr) => globals.resolve(texpr, unit, &mut scratch),
            None => Type::Error,
        })
        .collect();
    let ret = globals.resolve(&decl.ret, unit, &mut scratch);

    let mut checker = Checker::new(globals, meter, unit, diagnostics);

    if let FnKind::Method { owner } = &decl.kind {
        if globals.node_schema(&owner.name).is_some() {
            checker.receiver = Some(Type::node(&owner.name));
        } else {
            checker.receiver = Some(Type::Error);
        }
    }

    for (param, ty) in decl.params.iter().zip(params) {
        if checker.env.declare(&param.name.name, ty, false).is_err() {
            checker.report(
                Category::DuplicateName,
                param.name.span,
                format!("duplicate parameter '{}'", param.name.name),
            );
        }
    }

    checker.fn_stack.push(FnCtx {
        ret: Some(ret.clone()),
        returns: Vec::new(),
    });
    checker.check_block(&decl.body);
    if !terminates(&decl.body) {
        checker.report(
            Category::MissingReturn,
            decl.name.span,
            format!(
                "function '{}' must return a value of type '{ret}' on every path",
                decl.qualified_name()
            ),
        );
    }
}

#[allow(clippy::too_many_arguments)]
pub(super) fn check_snippet(
    globals: &Globals,
    meter: &Meter<'_>,
    unit: UnitId,
    body: &Block,
    end: Span,
    expected: &Type,
    bindings: &[(String, Value)],
    diagnostics: &mut Vec<Diagnostic>,
) {
    let mut checker = Checker::new(globals, meter, unit, diagnostics);
    for (name, value) in bindings {
        // Host bindings may shadow one another; the last one wins.
        checker.env.push_scope();
        let _ = checker.env.declare(name, value.static_type(), false);
    }
    checker.env.push_scope();
    checker.fn_stack.push(FnCtx {
        ret: Some(expected.clone()),
        returns: Vec::new(),
    });
    checker.check_block_in_scope(body);
    if !terminates(body) {
        checker.report(
            Category::MissingReturn,
            end,
            format!("constraint must return a value of type '{expected}'"),
        );
    }
}

impl<'g> Checker<'g> {
    pub(super) fn check_block(&mut self, block: &[Stmt]) {
        self.env.push_scope();
        self.check_block_in_scope(block);
        self.env.pop_scope();
    }

    fn check_block_in_scope(&mut self, block: &[Stmt]) {
        for stmt in block {
            if !self.meter.tick() {
                return;
            }
            self.check_stmt(stmt);
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Let {
                mutable,
                name,
                ty,
                init,
            } => {
                let annotated = ty.as_ref().map(|texpr| self.resolve(texpr));
                let init_ty = self.check_expr(init, annotated.as_ref());
                let var_ty = match annotated {
                    Some(annotated) => {
                        self.expect_assignable(&init_ty, &annotated, init.span);
                        annotated
                    }
                    None if *mutable => init_ty.widen(),
                    None => init_ty,
                };
                if self.env.declare(&name.name, var_ty, *mutable).is_err() {
                    self.report(
                        Category::DuplicateName,
                        name.span,
                        format!("cannot redeclare block-scoped variable '{}'", name.name),
                    );
                }
            }
            StmtKind::Assign { target, value } => {
                let Some(var) = self.env.lookup(&target.name).cloned() else {
                    self.report(
                        Category::UndefinedName,
                        target.span,
                        format!("cannot find name '{}'", target.name),
                    );
                    self.check_expr(value, None);
                    return;
                };
                if !var.mutable {
                    self.report(
                        Category::InvalidAssignment,
                        target.span,
                        format!("cannot assign to '{}' because it is a constant", target.name),
                    );
                } else if var.level < self.env.level() {
                    self.report(
                        Category::InvalidAssignment,
                        target.span,
                        format!(
                            "cannot assign to '{}' captured from an enclosing function",
                            target.name
                        ),
                    );
                }
                let value_ty = self.check_expr(value, Some(&var.ty));
                self.expect_assignable(&value_ty, &var.ty, value.span);
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                self.check_condition(cond);
                self.check_block(then_block);
                if let Some(else_block) = else_block {
                    self.check_block(else_block);
                }
            }
            StmtKind::While { cond, body } => {
                self.check_condition(cond);
                self.check_block(body);
            }
            StmtKind::Return(value) => {
                let expected = self.fn_stack.last().and_then(|ctx| ctx.ret.clone());
                let ty = self.check_expr(value, expected.as_ref());
                if let Some(expected) = &expected {
                    self.expect_assignable(&ty, expected, value.span);
                }
                if let Some(ctx) = self.fn_stack.last_mut() {
                    ctx.returns.push(ty);
                }
            }
            StmtKind::Throw(value) => {
                let ty = self.check_expr(value, None);
                if !ty.is_assignable_to(&Type::String) {
                    self.report(
                        Category::TypeMismatch,
                        value.span,
                        format!("only strings can be thrown, found '{ty}'"),
                    );
                }
            }
            StmtKind::Expr(expr) => {
                self.check_expr(expr, None);
            }
            StmtKind::Block(block) => self.check_block(block),
        }
    }

    fn check_condition(&mut self, cond: &crate::ast::Expr) {
        let ty = self.check_expr(cond, None);
        self.expect_assignable(&ty, &Type::Boolean, cond.span);
    }
}
