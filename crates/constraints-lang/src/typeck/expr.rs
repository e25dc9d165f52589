//! Expression typing.

use std::collections::HashSet;

use super::{Checker, FnCtx, FnSig};
use crate::ast::{BinaryOp, Expr, ExprKind, Ident, Lambda, LambdaBody, UnaryOp};
use crate::diagnostic::Category;
use crate::span::Span;
use crate::types::{Type, MAX_TYPE_NODES};

/// What a call resolved to, per receiver member.
enum Target {
    Sig(FnSig),
    /// Receiver type is poisoned; arguments are still checked.
    Unknown,
}

impl<'g> Checker<'g> {
    /// Type of `expr`. `expected` guides lambdas, array literals, and
    /// conditionals but is not enforced here.
    ///
    /// Types over [`MAX_TYPE_NODES`] nodes are reported and poisoned.
    pub(super) fn check_expr(&mut self, expr: &Expr, expected: Option<&Type>) -> Type {
        if !self.meter.tick() {
            return Type::Error;
        }
        let ty = self.expr_type(expr, expected);
        if ty.size_within(MAX_TYPE_NODES) {
            return ty;
        }
        self.report(
            Category::TypeMismatch,
            expr.span,
            format!("type of this expression is too complex (limit {MAX_TYPE_NODES} parts)"),
        );
        Type::Error
    }

    fn expr_type(&mut self, expr: &Expr, expected: Option<&Type>) -> Type {
        match &expr.kind {
            ExprKind::Number(_) => Type::Number,
            ExprKind::Str(value) => Type::literal(value),
            ExprKind::Bool(_) => Type::Boolean,
            ExprKind::Ident(name) => self.check_ident(name, expr.span),
            ExprKind::SelfRef => match &self.receiver {
                Some(ty) => ty.clone(),
                None => {
                    self.report(
                        Category::UndefinedName,
                        expr.span,
                        "'self' can only be used inside methods",
                    );
                    Type::Error
                }
            },
            ExprKind::Array(items) => self.check_array(items, expected),
            ExprKind::Node { ty, fields } => self.check_node(ty, fields, expr.span),
            ExprKind::Call { callee, args } => self.check_call(callee, args, expr.span),
            ExprKind::Member { object, property } => {
                let object_ty = self.check_expr(object, None);
                self.check_member(&object_ty, property)
            }
            ExprKind::Index { object, index } => {
                let object_ty = self.check_expr(object, None);
                let index_ty = self.check_expr(index, None);
                self.expect_assignable(&index_ty, &Type::Number, index.span);
                match object_ty {
                    Type::Error => Type::Error,
                    Type::Array(element) => Type::clone(&element),
                    other => {
                        self.report(
                            Category::TypeMismatch,
                            object.span,
                            format!("type '{other}' cannot be indexed"),
                        );
                        Type::Error
                    }
                }
            }
            ExprKind::Unary { op, operand } => {
                let operand_ty = self.check_expr(operand, None);
                let (required, result) = match op {
                    UnaryOp::Neg => (Type::Number, Type::Number),
                    UnaryOp::Not => (Type::Boolean, Type::Boolean),
                };
                self.expect_assignable(&operand_ty, &required, operand.span);
                result
            }
            ExprKind::Binary { op, left, right } => self.check_binary(*op, left, right, expr.span),
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                let cond_ty = self.check_expr(cond, None);
                self.expect_assignable(&cond_ty, &Type::Boolean, cond.span);
                let then_ty = self.check_expr(then_expr, expected);
                let else_ty = self.check_expr(else_expr, expected);
                Type::union([then_ty, else_ty])
            }
            ExprKind::Lambda(lambda) => self.check_lambda(lambda, expected),
        }
    }

    fn check_ident(&mut self, name: &str, span: Span) -> Type {
        if let Some(var) = self.env.lookup(name) {
            return var.ty.clone();
        }
        if let Some(sig) = self.globals.function(name) {
            return sig.as_type();
        }
        self.report_undefined(name, span);
        Type::Error
    }

    fn report_undefined(&mut self, name: &str, span: Span) {
        let message = if self.globals.is_type(name) {
            format!("'{name}' only refers to a type, but is being used as a value here")
        } else {
            format!("cannot find name '{name}'")
        };
        self.report(Category::UndefinedName, span, message);
    }

    fn check_array(&mut self, items: &[Expr], expected: Option<&Type>) -> Type {
        let element = expected.and_then(Type::array_element).cloned();
        let item_types: Vec<Type> = items
            .iter()
            .map(|item| self.check_expr(item, element.as_ref()))
            .collect();
        match element {
            Some(element) if item_types.iter().all(|t| t.is_assignable_to(&element)) => {
                Type::array(element)
            }
            _ => Type::array(Type::union(item_types.iter().map(Type::widen))),
        }
    }

    fn check_node(&mut self, ty: &Ident, fields: &[(Ident, Expr)], span: Span) -> Type {
        let schema = match self.globals.node_schema(&ty.name) {
            Some(schema) => Some(schema.cloned()),
            None => {
                let (category, message) = if self.globals.is_type(&ty.name) {
                    (
                        Category::TypeMismatch,
                        format!("'{}' is not a node type", ty.name),
                    )
                } else {
                    (Category::UnknownType, format!("cannot find type '{}'", ty.name))
                };
                self.report(category, ty.span, message);
                None
            }
        };

        let mut seen = HashSet::new();
        for (name, value) in fields {
            if !seen.insert(name.name.as_str()) {
                self.report(
                    Category::DuplicateName,
                    name.span,
                    format!("duplicate field '{}'", name.name),
                );
            }
            let field_ty = schema
                .as_ref()
                .and_then(Option::as_ref)
                .map(|s| s.get(&name.name));
            match field_ty {
                Some(Some(field_ty)) => {
                    let value_ty = self.check_expr(value, Some(field_ty));
                    self.expect_assignable(&value_ty, field_ty, value.span);
                }
                Some(None) => {
                    self.report(
                        Category::UnknownProperty,
                        name.span,
                        format!("field '{}' does not exist in node type '{}'", name.name, ty.name),
                    );
                    self.check_expr(value, None);
                }
                None => {
                    self.check_expr(value, None);
                }
            }
        }

        match schema {
            Some(Some(schema)) => {
                for field in schema.keys() {
                    if !seen.contains(field.as_str()) {
                        self.report(
                            Category::TypeMismatch,
                            span,
                            format!("field '{field}' is missing in node '{}'", ty.name),
                        );
                    }
                }
                Type::node(&ty.name)
            }
            Some(None) => Type::node(&ty.name),
            None => Type::Error,
        }
    }

    fn check_member(&mut self, object_ty: &Type, property: &Ident) -> Type {
        let mut results = Vec::new();
        for member in object_ty.members() {
            let found = match member {
                Type::Error => Some(Type::Error),
                Type::Array(_) | Type::String if property.name == "length" => Some(Type::Number),
                Type::Node(name) => {
                    let field = self
                        .globals
                        .node_schema(name)
                        .flatten()
                        .and_then(|schema| schema.get(&property.name))
                        .cloned();
                    if field.is_none() && self.globals.method(name, &property.name).is_some() {
                        self.report(
                            Category::TypeMismatch,
                            property.span,
                            format!("method '{}' of '{name}' must be called", property.name),
                        );
                        return Type::Error;
                    }
                    field
                }
                _ => None,
            };
            match found {
                Some(ty) => results.push(ty),
                None => {
                    self.report(
                        Category::UnknownProperty,
                        property.span,
                        format!(
                            "property '{}' does not exist on type '{object_ty}'",
                            property.name
                        ),
                    );
                    return Type::Error;
                }
            }
        }
        Type::union(results)
    }

    fn check_call(&mut self, callee: &Expr, args: &[Expr], span: Span) -> Type {
        match &callee.kind {
            ExprKind::Ident(name) => {
                if let Some(var) = self.env.lookup(name) {
                    let ty = var.ty.clone();
                    return self.call_value(&ty, args, callee.span, span);
                }
                if let Some(sig) = self.globals.function(name).cloned() {
                    self.check_args(&sig, args, span);
                    return sig.ret;
                }
                self.report_undefined(name, callee.span);
                self.check_args_unguided(args);
                Type::Error
            }
            ExprKind::Member { object, property } => {
                if let ExprKind::Ident(owner) = &object.kind {
                    if self.env.lookup(owner).is_none() && self.globals.is_type(owner) {
                        return self.check_static_call(owner, property, args, span);
                    }
                }
                let receiver = self.check_expr(object, None);
                self.check_method_call(&receiver, property, args, span)
            }
            _ => {
                let ty = self.check_expr(callee, None);
                self.call_value(&ty, args, callee.span, span)
            }
        }
    }

    fn check_static_call(&mut self, owner: &str, property: &Ident, args: &[Expr], span: Span) -> Type {
        match self.globals.static_fn(owner, &property.name).cloned() {
            Some(sig) => {
                self.check_args(&sig, args, span);
                sig.ret
            }
            None => {
                let message = if self.globals.has_statics(owner) {
                    format!("'{}' is not a static function of '{owner}'", property.name)
                } else {
                    format!("type '{owner}' has no static functions")
                };
                self.report(Category::UnknownProperty, property.span, message);
                self.check_args_unguided(args);
                Type::Error
            }
        }
    }

    /// Call through a value of type `ty` (a variable or expression).
    fn call_value(&mut self, ty: &Type, args: &[Expr], callee_span: Span, span: Span) -> Type {
        match ty {
            Type::Error => {
                self.check_args_unguided(args);
                Type::Error
            }
            Type::Function(func) => {
                let sig = FnSig::from_fn_type(func);
                self.check_args(&sig, args, span);
                sig.ret
            }
            other => {
                self.report(
                    Category::TypeMismatch,
                    callee_span,
                    format!("type '{other}' is not callable"),
                );
                self.check_args_unguided(args);
                Type::Error
            }
        }
    }

    fn check_method_call(&mut self, receiver: &Type, property: &Ident, args: &[Expr], span: Span) -> Type {
        let mut targets = Vec::new();
        for member in receiver.members() {
            let target = match member {
                Type::Error => Some(Target::Unknown),
                Type::Node(name) => {
                    let field = self
                        .globals
                        .node_schema(name)
                        .flatten()
                        .and_then(|schema| schema.get(&property.name));
                    match field {
                        Some(Type::Function(func)) => Some(Target::Sig(FnSig::from_fn_type(func))),
                        Some(Type::Error) => Some(Target::Unknown),
                        Some(other) => {
                            self.report(
                                Category::TypeMismatch,
                                property.span,
                                format!("field '{}' of type '{other}' is not callable", property.name),
                            );
                            self.check_args_unguided(args);
                            return Type::Error;
                        }
                        None => self
                            .globals
                            .method(name, &property.name)
                            .cloned()
                            .map(Target::Sig),
                    }
                }
                _ => None,
            };
            match target {
                Some(target) => targets.push(target),
                None => {
                    self.report(
                        Category::UnknownProperty,
                        property.span,
                        format!("property '{}' does not exist on type '{receiver}'", property.name),
                    );
                    self.check_args_unguided(args);
                    return Type::Error;
                }
            }
        }

        let mut sigs = targets.into_iter().filter_map(|t| match t {
            Target::Sig(sig) => Some(sig),
            Target::Unknown => None,
        });
        let Some(first) = sigs.next() else {
            self.check_args_unguided(args);
            return Type::Error;
        };
        let arg_types = self.check_args(&first, args, span);
        let mut returns = vec![first.ret];
        for sig in sigs {
            // Other union members must accept the same arguments.
            if !args_fit(&sig, &arg_types) {
                self.report(
                    Category::TypeMismatch,
                    property.span,
                    format!(
                        "method '{}' has incompatible signatures across the members of '{receiver}'",
                        property.name
                    ),
                );
                return Type::Error;
            }
            returns.push(sig.ret);
        }
        Type::union(returns)
    }

    /// Check arguments against `sig`, reporting count and type mismatches.
    pub(super) fn check_args(&mut self, sig: &FnSig, args: &[Expr], span: Span) -> Vec<Type> {
        let fixed = sig.params.len();
        let count_ok = match sig.rest {
            Some(_) => args.len() >= fixed,
            None => args.len() == fixed,
        };
        if !count_ok {
            let at_least = if sig.rest.is_some() { "at least " } else { "" };
            self.report(
                Category::WrongArgCount,
                span,
                format!("expected {at_least}{fixed} arguments, but got {}", args.len()),
            );
        }

        args.iter()
            .enumerate()
            .map(|(i, arg)| {
                let param = sig.params.get(i).or(sig.rest.as_ref());
                let ty = self.check_expr(arg, param);
                if let Some(param) = param {
                    self.expect_assignable(&ty, param, arg.span);
                }
                ty
            })
            .collect()
    }

    fn check_args_unguided(&mut self, args: &[Expr]) {
        for arg in args {
            self.check_expr(arg, None);
        }
    }

    fn check_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, span: Span) -> Type {
        let lt = self.check_expr(left, None);
        let rt = self.check_expr(right, None);
        if lt.is_error() || rt.is_error() {
            return match op {
                BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                    Type::Boolean
                }
                BinaryOp::And | BinaryOp::Or => Type::Boolean,
                _ => Type::Error,
            };
        }
        let is_number = |t: &Type| t.is_assignable_to(&Type::Number);
        let is_string = |t: &Type| t.is_assignable_to(&Type::String);

        let result = match op {
            BinaryOp::Add => {
                if is_number(&lt) && is_number(&rt) {
                    Some(Type::Number)
                } else if (is_string(&lt) && (is_string(&rt) || is_number(&rt)))
                    || (is_number(&lt) && is_string(&rt))
                {
                    Some(Type::String)
                } else {
                    None
                }
            }
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod | BinaryOp::Pow => {
                (is_number(&lt) && is_number(&rt)).then_some(Type::Number)
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                ((is_number(&lt) && is_number(&rt)) || (is_string(&lt) && is_string(&rt)))
                    .then_some(Type::Boolean)
            }
            BinaryOp::And | BinaryOp::Or => {
                let boolean = |t: &Type| t.is_assignable_to(&Type::Boolean);
                (boolean(&lt) && boolean(&rt)).then_some(Type::Boolean)
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                if !lt.overlaps(&rt) {
                    self.report(
                        Category::TypeMismatch,
                        span,
                        format!("this comparison is always false: types '{lt}' and '{rt}' have no overlap"),
                    );
                }
                Some(Type::Boolean)
            }
        };

        result.unwrap_or_else(|| {
            self.report(
                Category::TypeMismatch,
                span,
                format!("operator '{}' cannot be applied to types '{lt}' and '{rt}'", op.symbol()),
            );
            Type::Error
        })
    }

    pub(super) fn check_lambda(&mut self, lambda: &Lambda, expected: Option<&Type>) -> Type {
        let context = expected.and_then(Type::as_function).cloned();

        self.env.enter_function();
        let mut params = Vec::with_capacity(lambda.params.len());
        for (i, param) in lambda.params.iter().enumerate() {
            let ty = match (&param.ty, context.as_ref().and_then(|c| c.params.get(i))) {
                (Some(texpr), _) => self.resolve(texpr),
                (None, Some(contextual)) => contextual.clone(),
                (None, None) => {
                    self.report(
                        Category::UnknownType,
                        param.span,
                        format!(
                            "parameter '{}' implicitly has an unknown type; add a type annotation",
                            param.name.name
                        ),
                    );
                    Type::Error
                }
            };
            if self.env.declare(&param.name.name, ty.clone(), false).is_err() {
                self.report(
                    Category::DuplicateName,
                    param.name.span,
                    format!("duplicate parameter '{}'", param.name.name),
                );
            }
            params.push(ty);
        }

        let contextual_ret = context.map(|c| c.ret);
        let ret = match &lambda.body {
            LambdaBody::Expr(body) => {
                let ty = self.check_expr(body, contextual_ret.as_ref());
                match contextual_ret {
                    Some(ret) => {
                        self.expect_assignable(&ty, &ret, body.span);
                        ret
                    }
                    None => ty,
                }
            }
            LambdaBody::Block(block) => {
                self.fn_stack.push(FnCtx {
                    ret: contextual_ret,
                    returns: Vec::new(),
                });
                self.check_block(block);
                let ctx = self.fn_stack.pop();
                if !super::stmt::terminates(block) {
                    self.report(
                        Category::MissingReturn,
                        lambda.span,
                        "lambda must return a value on every path",
                    );
                }
                match ctx {
                    Some(FnCtx { ret: Some(ret), .. }) => ret,
                    Some(FnCtx { returns, .. }) => Type::union(returns),
                    None => Type::Error,
                }
            }
        };
        self.env.exit_function();

        Type::function(params, ret)
    }
}

/// Whether argument types already checked against one signature also fit
/// `sig`.
fn args_fit(sig: &FnSig, arg_types: &[Type]) -> bool {
    let count_ok = match sig.rest {
        Some(_) => arg_types.len() >= sig.params.len(),
        None => arg_types.len() == sig.params.len(),
    };
    count_ok
        && arg_types.iter().enumerate().all(|(i, ty)| {
            match sig.params.get(i).or(sig.rest.as_ref()) {
                Some(param) => ty.is_assignable_to(param),
                None => false,
            }
        })
}
