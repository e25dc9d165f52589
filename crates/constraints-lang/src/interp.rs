//! Tree-walking interpreter over checked programs.
//!
//! Execution is bounded three ways:
//!
//! - a combined depth counter over expressions, statements, and calls
//!   ([`MAX_DEPTH`]) keeps native recursion finite
//! - a [`Budget`] (deadline plus cancel flag) is polled every
//!   [`CHECK_INTERVAL`] steps
//! - value height and string length caps bound memory per value

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;

use crate::ast::{BinaryOp, Block, Expr, ExprKind, FnDecl, Lambda, LambdaBody, Param, Stmt, StmtKind, UnaryOp};
use crate::bundle::SourceBundle;
use crate::program::{Callable, Program};
use crate::span::{Span, UnitId};
use crate::value::{format_number, FunctionValue, TooDeep, Value, MAX_STRING_BYTES};

/// Deepest combined nesting of evaluation and calls.
pub const MAX_DEPTH: usize = 10_000;

/// Steps between budget checks.
pub const CHECK_INTERVAL: u32 = 256;

/// Wall-clock deadline plus an external cancel flag.
#[derive(Debug, Clone)]
pub struct Budget {
    deadline: Option<Instant>,
    cancel: Arc<AtomicBool>,
}

impl Budget {
    pub fn new(deadline: Option<Instant>, cancel: Arc<AtomicBool>) -> Self {
        Self { deadline, cancel }
    }

    pub fn unlimited() -> Self {
        Self::new(None, Arc::new(AtomicBool::new(false)))
    }

    pub fn is_exhausted(&self) -> bool {
        self.cancel.load(Ordering::Relaxed) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Compilation gave up because its [`Budget`] ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("compilation cancelled: time budget exhausted")]
pub struct Exhausted;

/// Counts parser and checker work against a [`Budget`], polling it every
/// [`CHECK_INTERVAL`] ticks. Once exhausted it stays exhausted.
#[derive(Debug)]
pub(crate) struct Meter<'b> {
    budget: &'b Budget,
    steps: Cell<u32>,
    exhausted: Cell<bool>,
}

impl<'b> Meter<'b> {
    pub fn new(budget: &'b Budget) -> Self {
        Self {
            budget,
            steps: Cell::new(0),
            exhausted: Cell::new(budget.is_exhausted()),
        }
    }

    /// Count one unit of work. `false` once the budget has run out.
    pub fn tick(&self) -> bool {
        if self.exhausted.get() {
            return false;
        }
        let steps = self.steps.get().wrapping_add(1);
        self.steps.set(steps);
        if steps % CHECK_INTERVAL == 0 && self.budget.is_exhausted() {
            self.exhausted.set(true);
            return false;
        }
        true
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted.get()
    }

    pub fn check(&self) -> Result<(), Exhausted> {
        if self.exhausted.get() {
            Err(Exhausted)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeErrorKind {
    #[error("{0}")]
    Thrown(String),

    #[error("Maximum call stack size exceeded")]
    StackOverflow,

    #[error("{0}")]
    Limit(String),

    #[error("execution cancelled: time budget exhausted")]
    Cancelled,
}

/// One entry of a runtime stack trace.
#[derive(Debug, Clone, PartialEq)]
pub struct StackFrame {
    /// `Owner.method`, `name`, `<lambda>`, or `<anonymous>` for the snippet.
    pub function: String,
    pub unit: UnitId,
    /// Where execution was in this frame when the error was raised.
    pub span: Span,
}

/// An error raised while running a snippet, innermost frame first.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub frames: Vec<StackFrame>,
}

impl RuntimeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, RuntimeErrorKind::Cancelled)
    }

    /// Stack trace in the usual scripting format:
    ///
    /// ```text
    /// Error: message
    ///     at Windows.and (constraints-edsl-fluent-api.edsl:12:5)
    ///     at <anonymous> (constraint.edsl:1:8)
    /// ```
    pub fn render(&self, bundle: &SourceBundle) -> String {
        let mut out = format!("Error: {}", self.kind);
        for frame in &self.frames {
            let source = bundle.source(frame.unit);
            let loc = source.location(frame.span.start);
            out.push_str(&format!(
                "\n    at {} ({}:{}:{})",
                frame.function,
                source.name(),
                loc.line,
                loc.column
            ));
        }
        out
    }
}

type Eval<T> = Result<T, RuntimeError>;

/// Outcome of running statements.
enum Flow {
    Normal,
    Return(Value),
}

/// Bindings of one function activation.
struct Env {
    bindings: Vec<(Arc<str>, Value)>,
    receiver: Option<Value>,
}

impl Env {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.bindings
            .iter()
            .rev()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, v)| v)
    }

    fn bind(&mut self, name: &str, value: Value) {
        self.bindings.push((Arc::from(name), value));
    }

    fn assign(&mut self, name: &str, value: Value) -> bool {
        match self.bindings.iter_mut().rev().find(|(n, _)| n.as_ref() == name) {
            Some(slot) => {
                slot.1 = value;
                true
            }
            None => false,
        }
    }
}

pub(crate) struct Interpreter<'p> {
    program: &'p Program,
    budget: &'p Budget,
    depth: usize,
    steps: u32,
    frames: Vec<StackFrame>,
}

impl<'p> Interpreter<'p> {
    pub fn new(program: &'p Program, budget: &'p Budget) -> Self {
        Self {
            program,
            budget,
            depth: 0,
            steps: 0,
            frames: Vec::new(),
        }
    }

    pub fn run_snippet(&mut self, body: &Block, unit: UnitId, bindings: &[(Arc<str>, Value)]) -> Eval<Value> {
        self.frames.push(StackFrame {
            function: "<anonymous>".to_string(),
            unit,
            span: Span::default(),
        });
        let mut env = Env {
            bindings: bindings.to_vec(),
            receiver: None,
        };
        let flow = self.exec_block(body, &mut env);
        self.frames.pop();
        match flow? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Err(self.error_without_frames("constraint did not return a value")),
        }
    }

    // === Errors ===

    fn error(&self, span: Span, kind: RuntimeErrorKind) -> RuntimeError {
        let mut frames = self.frames.clone();
        if let Some(top) = frames.last_mut() {
            top.span = span;
        }
        frames.reverse();
        RuntimeError { kind, frames }
    }

    fn limit(&self, span: Span, message: impl Into<String>) -> RuntimeError {
        self.error(span, RuntimeErrorKind::Limit(message.into()))
    }

    fn error_without_frames(&self, message: &str) -> RuntimeError {
        RuntimeError {
            kind: RuntimeErrorKind::Limit(message.to_string()),
            frames: Vec::new(),
        }
    }

    fn too_deep(&self, span: Span, err: TooDeep) -> RuntimeError {
        self.limit(span, err.to_string())
    }

    fn unit(&self) -> UnitId {
        self.frames.last().map(|f| f.unit).unwrap_or_default()
    }

    // === Budget ===

    fn enter(&mut self, span: Span) -> Eval<()> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(span, RuntimeErrorKind::StackOverflow));
        }
        self.steps = self.steps.wrapping_add(1);
        if self.steps % CHECK_INTERVAL == 0 && self.budget.is_exhausted() {
            return Err(self.error(span, RuntimeErrorKind::Cancelled));
        }
        self.depth += 1;
        Ok(())
    }

    // === Statements ===

    fn exec_block(&mut self, block: &[Stmt], env: &mut Env) -> Eval<Flow> {
        let mark = env.bindings.len();
        let result = self.exec_stmts(block, env);
        env.bindings.truncate(mark);
        result
    }

    fn exec_stmts(&mut self, block: &[Stmt], env: &mut Env) -> Eval<Flow> {
        for stmt in block {
            if let Flow::Return(value) = self.exec_stmt(stmt, env)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &mut Env) -> Eval<Flow> {
        self.enter(stmt.span)?;
        let result = self.exec_stmt_inner(stmt, env);
        self.depth -= 1;
        result
    }

    fn exec_stmt_inner(&mut self, stmt: &Stmt, env: &mut Env) -> Eval<Flow> {
        match &stmt.kind {
            StmtKind::Let { name, init, .. } => {
                let value = self.eval(init, env)?;
                env.bind(&name.name, value);
            }
            StmtKind::Assign { target, value } => {
                let value = self.eval(value, env)?;
                if !env.assign(&target.name, value) {
                    return Err(self.limit(target.span, format!("{} is not defined", target.name)));
                }
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                if self.eval_condition(cond, env)? {
                    return self.exec_block(then_block, env);
                } else if let Some(else_block) = else_block {
                    return self.exec_block(else_block, env);
                }
            }
            StmtKind::While { cond, body } => {
                while self.eval_condition(cond, env)? {
                    if let Flow::Return(value) = self.exec_block(body, env)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }
            StmtKind::Return(value) => return Ok(Flow::Return(self.eval(value, env)?)),
            StmtKind::Throw(value) => {
                let message = self.eval(value, env)?.to_string();
                return Err(self.error(stmt.span, RuntimeErrorKind::Thrown(message)));
            }
            StmtKind::Expr(expr) => {
                self.eval(expr, env)?;
            }
            StmtKind::Block(block) => return self.exec_block(block, env),
        }
        Ok(Flow::Normal)
    }

    fn eval_condition(&mut self, cond: &Expr, env: &mut Env) -> Eval<bool> {
        match self.eval(cond, env)? {
            Value::Boolean(b) => Ok(b),
            other => Err(self.limit(cond.span, format!("expected a boolean, found {}", other.kind_name()))),
        }
    }

    // === Expressions ===

    fn eval(&mut self, expr: &Expr, env: &mut Env) -> Eval<Value> {
        self.enter(expr.span)?;
        let result = self.eval_inner(expr, env);
        self.depth -= 1;
        result
    }

    fn eval_inner(&mut self, expr: &Expr, env: &mut Env) -> Eval<Value> {
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::Str(s) => Ok(Value::string(s.as_str())),
            ExprKind::Bool(b) => Ok(Value::Boolean(*b)),
            ExprKind::Ident(name) => {
                if let Some(value) = env.lookup(name) {
                    return Ok(value.clone());
                }
                match self.program.function(name) {
                    Some(callable) => Ok(Value::declared(callable.decl.clone(), callable.unit)),
                    None => Err(self.limit(expr.span, format!("{name} is not defined"))),
                }
            }
            ExprKind::SelfRef => env
                .receiver
                .clone()
                .ok_or_else(|| self.limit(expr.span, "'self' is not bound")),
            ExprKind::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item, env))
                    .collect::<Eval<Vec<_>>>()?;
                Value::array(values).map_err(|e| self.too_deep(expr.span, e))
            }
            ExprKind::Node { ty, fields } => {
                let mut map = IndexMap::with_capacity(fields.len());
                for (name, value) in fields {
                    let value = self.eval(value, env)?;
                    map.insert(name.name.clone(), value);
                }
                Value::node(ty.name.as_str(), map).map_err(|e| self.too_deep(expr.span, e))
            }
            ExprKind::Call { callee, args } => self.eval_call(callee, args, expr.span, env),
            ExprKind::Member { object, property } => {
                let object = self.eval(object, env)?;
                self.member(&object, &property.name, property.span)
            }
            ExprKind::Index { object, index } => {
                let object = self.eval(object, env)?;
                let index_value = self.eval(index, env)?;
                match (&object, &index_value) {
                    (Value::Array(array), Value::Number(i)) => {
                        let item = (i.fract() == 0.0 && *i >= 0.0)
                            .then(|| array.items.get(*i as usize))
                            .flatten();
                        item.cloned().ok_or_else(|| {
                            self.limit(
                                index.span,
                                format!(
                                    "index {} out of bounds for array of length {}",
                                    format_number(*i),
                                    array.items.len()
                                ),
                            )
                        })
                    }
                    _ => Err(self.limit(
                        expr.span,
                        format!("cannot index {} with {}", object.kind_name(), index_value.kind_name()),
                    )),
                }
            }
            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand, env)?;
                match (op, value) {
                    (UnaryOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
                    (UnaryOp::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
                    (_, other) => Err(self.limit(
                        expr.span,
                        format!("invalid operand {} for unary operator", other.kind_name()),
                    )),
                }
            }
            ExprKind::Binary { op, left, right } => self.eval_binary(*op, left, right, expr.span, env),
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                if self.eval_condition(cond, env)? {
                    self.eval(then_expr, env)
                } else {
                    self.eval(else_expr, env)
                }
            }
            ExprKind::Lambda(lambda) => Value::closure(
                lambda.clone(),
                self.unit(),
                env.bindings.clone(),
                env.receiver.clone(),
            )
            .map_err(|e| self.too_deep(expr.span, e)),
        }
    }

    fn member(&self, object: &Value, property: &str, span: Span) -> Eval<Value> {
        match object {
            Value::Node(node) => node.field(property).cloned().ok_or_else(|| {
                self.limit(
                    span,
                    format!("property '{property}' does not exist on {}", node.type_name),
                )
            }),
            Value::Array(array) if property == "length" => Ok(Value::Number(array.items.len() as f64)),
            Value::String(s) if property == "length" => Ok(Value::Number(s.encode_utf16().count() as f64)),
            other => Err(self.limit(
                span,
                format!("property '{property}' does not exist on {}", other.kind_name()),
            )),
        }
    }

    fn eval_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, span: Span, env: &mut Env) -> Eval<Value> {
        match op {
            BinaryOp::And | BinaryOp::Or => {
                let lhs = self.eval_condition(left, env)?;
                if lhs == (op == BinaryOp::Or) {
                    return Ok(Value::Boolean(lhs));
                }
                return self.eval_condition(right, env).map(Value::Boolean);
            }
            _ => {}
        }

        let lhs = self.eval(left, env)?;
        let rhs = self.eval(right, env)?;
        let value = match (op, &lhs, &rhs) {
            (BinaryOp::Eq, _, _) => Value::Boolean(lhs.strict_equals(&rhs)),
            (BinaryOp::Ne, _, _) => Value::Boolean(!lhs.strict_equals(&rhs)),
            (BinaryOp::Add, Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            (BinaryOp::Add, Value::String(_), _) | (BinaryOp::Add, _, Value::String(_)) => {
                let joined = format!("{lhs}{rhs}");
                if joined.len() > MAX_STRING_BYTES {
                    return Err(self.limit(span, "Invalid string length"));
                }
                Value::string(joined)
            }
            (BinaryOp::Sub, Value::Number(a), Value::Number(b)) => Value::Number(a - b),
            (BinaryOp::Mul, Value::Number(a), Value::Number(b)) => Value::Number(a * b),
            (BinaryOp::Div, Value::Number(a), Value::Number(b)) => Value::Number(a / b),
            (BinaryOp::Mod, Value::Number(a), Value::Number(b)) => Value::Number(a % b),
            (BinaryOp::Pow, Value::Number(a), Value::Number(b)) => Value::Number(a.powf(*b)),
            (BinaryOp::Lt, Value::Number(a), Value::Number(b)) => Value::Boolean(a < b),
            (BinaryOp::Le, Value::Number(a), Value::Number(b)) => Value::Boolean(a <= b),
            (BinaryOp::Gt, Value::Number(a), Value::Number(b)) => Value::Boolean(a > b),
            (BinaryOp::Ge, Value::Number(a), Value::Number(b)) => Value::Boolean(a >= b),
            (BinaryOp::Lt, Value::String(a), Value::String(b)) => Value::Boolean(a < b),
            (BinaryOp::Le, Value::String(a), Value::String(b)) => Value::Boolean(a <= b),
            (BinaryOp::Gt, Value::String(a), Value::String(b)) => Value::Boolean(a > b),
            (BinaryOp::Ge, Value::String(a), Value::String(b)) => Value::Boolean(a >= b),
            _ => {
                return Err(self.limit(
                    span,
                    format!(
                        "operator '{}' cannot be applied to {} and {}",
                        op.symbol(),
                        lhs.kind_name(),
                        rhs.kind_name()
                    ),
                ))
            }
        };
        Ok(value)
    }

    // === Calls ===

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], span: Span, env: &mut Env) -> Eval<Value> {
        match &callee.kind {
            ExprKind::Ident(name) => {
                if let Some(value) = env.lookup(name).cloned() {
                    let args = self.eval_args(args, env)?;
                    return self.call_value(&value, args, span);
                }
                let callable = self
                    .program
                    .function(name)
                    .cloned()
                    .ok_or_else(|| self.limit(callee.span, format!("{name} is not defined")))?;
                let args = self.eval_args(args, env)?;
                self.call_declared(&callable.decl, callable.unit, None, args, span)
            }
            ExprKind::Member { object, property } => {
                if let ExprKind::Ident(owner) = &object.kind {
                    if env.lookup(owner).is_none() {
                        let callable = self
                            .program
                            .static_fn(owner, &property.name)
                            .cloned()
                            .ok_or_else(|| {
                                self.limit(
                                    property.span,
                                    format!("{owner}.{} is not a function", property.name),
                                )
                            })?;
                        let args = self.eval_args(args, env)?;
                        return self.call_declared(&callable.decl, callable.unit, None, args, span);
                    }
                }
                let receiver = self.eval(object, env)?;
                let args = self.eval_args(args, env)?;
                self.call_method(receiver, &property.name, property.span, args, span)
            }
            _ => {
                let value = self.eval(callee, env)?;
                let args = self.eval_args(args, env)?;
                self.call_value(&value, args, span)
            }
        }
    }

    fn eval_args(&mut self, args: &[Expr], env: &mut Env) -> Eval<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg, env)).collect()
    }

    fn call_method(
        &mut self,
        receiver: Value,
        name: &str,
        name_span: Span,
        args: Vec<Value>,
        span: Span,
    ) -> Eval<Value> {
        let Value::Node(node) = &receiver else {
            return Err(self.limit(
                name_span,
                format!("{}.{name} is not a function", receiver.kind_name()),
            ));
        };
        if let Some(field) = node.field(name) {
            let field = field.clone();
            return self.call_value(&field, args, span);
        }
        let Some(Callable { decl, unit }) = self.program.method(&node.type_name, name).cloned() else {
            return Err(self.limit(
                name_span,
                format!("{}.{name} is not a function", node.type_name),
            ));
        };
        self.call_declared(&decl, unit, Some(receiver), args, span)
    }

    fn call_value(&mut self, callee: &Value, args: Vec<Value>, span: Span) -> Eval<Value> {
        let Value::Function(func) = callee else {
            return Err(self.limit(span, format!("{} is not a function", callee.kind_name())));
        };
        match func.as_ref() {
            FunctionValue::Declared { decl, unit } => self.call_declared(decl, *unit, None, args, span),
            FunctionValue::Closure {
                lambda,
                unit,
                captured,
                receiver,
                ..
            } => self.call_closure(lambda, *unit, captured, receiver.clone(), args, span),
        }
    }

    fn push_frame(&mut self, function: String, unit: UnitId, at: Span, call_site: Span) -> Eval<()> {
        if let Some(caller) = self.frames.last_mut() {
            caller.span = call_site;
        }
        self.enter(call_site)?;
        self.frames.push(StackFrame {
            function,
            unit,
            span: at,
        });
        Ok(())
    }

    fn pop_frame(&mut self) {
        self.frames.pop();
        self.depth -= 1;
    }

    fn call_declared(
        &mut self,
        decl: &Arc<FnDecl>,
        unit: UnitId,
        receiver: Option<Value>,
        args: Vec<Value>,
        call_site: Span,
    ) -> Eval<Value> {
        let mut env = Env {
            bindings: Vec::with_capacity(decl.params.len()),
            receiver,
        };
        self.bind_params(&decl.params, args, &mut env, call_site)?;

        self.push_frame(decl.qualified_name(), unit, decl.name.span, call_site)?;
        let flow = self.exec_block(&decl.body, &mut env);
        self.pop_frame();

        match flow? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Err(self.limit(
                call_site,
                format!("{} did not return a value", decl.qualified_name()),
            )),
        }
    }

    fn call_closure(
        &mut self,
        lambda: &Lambda,
        unit: UnitId,
        captured: &[(Arc<str>, Value)],
        receiver: Option<Value>,
        args: Vec<Value>,
        call_site: Span,
    ) -> Eval<Value> {
        let mut env = Env {
            bindings: captured.to_vec(),
            receiver,
        };
        self.bind_params(&lambda.params, args, &mut env, call_site)?;

        self.push_frame("<lambda>".to_string(), unit, lambda.span, call_site)?;
        let result = match &lambda.body {
            LambdaBody::Expr(body) => self.eval(body, &mut env),
            LambdaBody::Block(block) => match self.exec_block(block, &mut env) {
                Ok(Flow::Return(value)) => Ok(value),
                Ok(Flow::Normal) => Err(self.limit(lambda.span, "lambda did not return a value")),
                Err(err) => Err(err),
            },
        };
        self.pop_frame();
        result
    }

    /// Bind arguments to parameters; a trailing rest parameter collects
    /// the remaining arguments into an array.
    fn bind_params(&self, params: &[Param], args: Vec<Value>, env: &mut Env, call_site: Span) -> Eval<()> {
        let mut args = args.into_iter();
        for param in params {
            if param.rest {
                let rest = Value::array(args.by_ref().collect()).map_err(|e| self.too_deep(call_site, e))?;
                env.bind(&param.name.name, rest);
                break;
            }
            match args.next() {
                Some(value) => env.bind(&param.name.name, value),
                None => {
                    return Err(self.limit(
                        call_site,
                        format!("missing argument for parameter '{}'", param.name.name),
                    ))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meter_sees_cancellation_at_interval() {
        let cancel = Arc::new(AtomicBool::new(false));
        let budget = Budget::new(None, cancel.clone());
        let meter = Meter::new(&budget);
        assert!(meter.tick());

        cancel.store(true, Ordering::Relaxed);
        let ticks = (0..CHECK_INTERVAL).take_while(|_| meter.tick()).count();
        assert!(ticks < CHECK_INTERVAL as usize);
        assert!(meter.is_exhausted());
        assert!(!meter.tick());
        assert_eq!(meter.check(), Err(Exhausted));
    }

    #[test]
    fn meter_over_spent_budget_starts_exhausted() {
        let budget = Budget::new(Some(Instant::now()), Arc::new(AtomicBool::new(false)));
        let meter = Meter::new(&budget);
        assert!(!meter.tick());
    }
}
