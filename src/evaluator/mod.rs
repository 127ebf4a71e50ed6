//! The tree-walking evaluator (component E): statement/expression dispatch,
//! scope and hoisting, function/class calling, and the `Flow` control-flow
//! channel that carries `return`/`break`/`continue`/`throw` out through
//! ordinary `?` propagation instead of a side return-value.
//!
//! `Return`/`Break`/`Continue`/`Throw` are not actually *errors* — they are
//! non-local control transfers that happen to be most naturally expressed
//! with Rust's `?` operator, the same way the teacher's VM uses early
//! returns for its own dispatch loop. `Flow::Error` is the only variant that
//! represents an actual failure; the rest are completions in disguise.

use std::cell::Cell;
use std::rc::Rc;

use crate::ast::*;
use crate::callable::{Params, SandboxFunction};
use crate::class::{Member, SandboxClass};
use crate::environment::{BindingKind, Scope};
use crate::error::{CodeLoc, InterpreterError};
use crate::resource::ResourceTracker;
use crate::security::{self, HostCallCtx, HostValue, PropertyTarget, SecurityOptions};
use crate::tracer::EvalTracer;
use crate::value::{JsObject, PropertyDescriptor, Value};

pub(crate) mod classes;
pub(crate) mod control_flow;
pub(crate) mod destructure;
pub(crate) mod native_methods;
pub(crate) mod operators;

/// Everything that can leave an `eval_statement`/`eval_expression` call
/// other than a plain value. `Error` is a genuine failure; the other four
/// are completions a `try`/`catch`, loop, `switch`, or function call catches
/// on the way back up.
#[derive(Debug, Clone)]
pub enum Flow {
    Error(InterpreterError),
    Throw(Value),
    Return(Value),
    Break(Option<String>),
    Continue(Option<String>),
}

impl From<InterpreterError> for Flow {
    fn from(e: InterpreterError) -> Self {
        Self::Error(e)
    }
}

pub type EvalResult<T> = Result<T, Flow>;

/// Everything threaded through a single `evaluate` call: the security gate,
/// the resource tracker, the tracer, and the current call depth (for the
/// tracer's indentation and for nothing else — recursion depth itself is
/// bounded by `resource`, not by this counter).
pub struct EvalContext<'a> {
    security: &'a SecurityOptions,
    resource: &'a dyn ResourceTracker,
    tracer: &'a dyn EvalTracer,
    depth: Cell<usize>,
    /// One frame per generator call currently on the Rust call stack, each
    /// collecting the values its body `yield`s. There is no real suspension
    /// here (see `call_function`'s doc comment on generator calls) so a
    /// frame's whole lifetime is the single eager run of its body.
    generator_frames: std::cell::RefCell<Vec<Vec<Value>>>,
}

impl<'a> EvalContext<'a> {
    #[must_use]
    pub fn new(security: &'a SecurityOptions, resource: &'a dyn ResourceTracker, tracer: &'a dyn EvalTracer) -> Self {
        Self { security, resource, tracer, depth: Cell::new(0), generator_frames: std::cell::RefCell::new(Vec::new()) }
    }

    pub(crate) fn push_generator_frame(&self) {
        self.generator_frames.borrow_mut().push(Vec::new());
    }

    pub(crate) fn pop_generator_frame(&self) -> Vec<Value> {
        self.generator_frames.borrow_mut().pop().unwrap_or_default()
    }

    /// Records a plain `yield value`; `false` means this `Expression::Yield`
    /// was reached outside any generator body (the parser should already
    /// have rejected that, but the evaluator re-checks defensively).
    pub(crate) fn push_yield(&self, value: Value) -> bool {
        match self.generator_frames.borrow_mut().last_mut() {
            Some(frame) => {
                frame.push(value);
                true
            }
            None => false,
        }
    }

    /// Records a `yield* iterable`, flattening its items into the enclosing
    /// generator's collected sequence.
    pub(crate) fn extend_yield(&self, values: Vec<Value>) -> bool {
        match self.generator_frames.borrow_mut().last_mut() {
            Some(frame) => {
                frame.extend(values);
                true
            }
            None => false,
        }
    }

    /// Called at the top of every statement/expression: bumps the node
    /// counter and bails as soon as any cumulative limit trips, so a
    /// runaway loop or a deeply recursive program is caught mid-evaluation
    /// rather than only at the next top-level call (invariant I9).
    pub(crate) fn check_node(&self) -> EvalResult<()> {
        self.resource.on_node_evaluated();
        if let Some(err) = self.resource.is_exhausted() {
            return Err(Flow::Error(InterpreterError::ResourceExhausted(crate::error::ResourceExhaustedError { message: err.message })));
        }
        self.resource
            .check_time()
            .map_err(|e| Flow::Error(InterpreterError::ResourceExhausted(crate::error::ResourceExhaustedError { message: e.message })))
    }

    /// Accounts `bytes` (an approximate size, not an exact allocator byte
    /// count) toward `max_total_memory` at the evaluator's main allocation
    /// sites — object/array literals and string concatenation. Bails with
    /// `ResourceExhaustedError` the same way `check_node` does for the
    /// other cumulative limits.
    pub(crate) fn track_allocation(&self, bytes: u64) -> EvalResult<()> {
        self.resource
            .on_allocate(bytes)
            .map_err(|e| Flow::Error(InterpreterError::ResourceExhausted(crate::error::ResourceExhaustedError { message: e.message })))
    }

    /// The configured security options, for callers outside this module that
    /// need to pass them on (the async driver's own `HostCallCtx`-adjacent
    /// call sites).
    pub(crate) fn security(&self) -> &SecurityOptions {
        self.security
    }

    pub(crate) fn resource(&self) -> &dyn ResourceTracker {
        self.resource
    }

    pub(crate) fn tracer(&self) -> &dyn EvalTracer {
        self.tracer
    }
}

impl HostCallCtx for EvalContext<'_> {
    fn call_sandbox_function(&self, f: &SandboxFunction, args: Vec<Value>) -> Result<Value, InterpreterError> {
        call_function(f, Value::Undefined, args, self).map_err(|flow| flow_to_interpreter_error(flow, f.loc))
    }
}

/// Builds the `{name, message}` object a `catch` clause sees for an internal
/// (non-`throw`) catchable error — there is no `Error` prototype chain in
/// this value model, just a plain object shaped like one.
pub(crate) fn error_to_value(err: &InterpreterError) -> Value {
    let mut obj = JsObject::new();
    obj.set_data("name", Value::string(err.kind_name()));
    obj.set_data("message", Value::string(err.message()));
    Value::object(obj)
}

/// What a `try` boundary hands its `catch` clause, or `Err` if `flow` must
/// keep propagating past this `try` untouched (invariant: non-catchable
/// errors and `return`/`break`/`continue` are never visible to `catch`).
pub(crate) fn into_catch_value(flow: Flow) -> Result<Value, Flow> {
    match flow {
        Flow::Throw(v) => Ok(v),
        Flow::Error(e) if e.is_catchable() => Ok(error_to_value(&e)),
        other => Err(other),
    }
}

/// Converts whatever escaped the program's top-level statement into the
/// public `Result<Value, InterpreterError>` surface. A stray `Return`/
/// `Break`/`Continue` can only happen for a malformed program the parser
/// accepted but that has no enclosing function/loop — defensive, not
/// reachable from well-formed input.
pub fn flow_to_interpreter_error(flow: Flow, loc: CodeLoc) -> InterpreterError {
    match flow {
        Flow::Error(e) => e,
        Flow::Throw(v) => InterpreterError::Thrown(crate::error::UncaughtThrow { display: v.to_js_string().to_string(), loc }),
        Flow::Return(_) => InterpreterError::syntax("'return' outside of a function", loc),
        Flow::Break(_) => InterpreterError::syntax("'break' outside of a loop or switch", loc),
        Flow::Continue(_) => InterpreterError::syntax("'continue' outside of a loop", loc),
    }
}

pub(crate) fn to_binding_kind(kind: DeclKind) -> BindingKind {
    match kind {
        DeclKind::Var => BindingKind::Var,
        DeclKind::Let => BindingKind::Let,
        DeclKind::Const => BindingKind::Const,
    }
}

pub(crate) fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Undefined => Value::Undefined,
        Literal::Bool(b) => Value::Boolean(*b),
        Literal::Number(n) => Value::Number(*n),
        Literal::String(s) => Value::string(s.clone()),
    }
}

// --- Program / block entry points ------------------------------------------

pub fn eval_program(program: &Program, scope: &Scope, ctx: &EvalContext) -> Result<Value, InterpreterError> {
    let this = Value::Undefined;
    eval_block(&program.body, scope, scope, &this, ctx).map_err(|flow| flow_to_interpreter_error(flow, CodeLoc::UNKNOWN))
}

fn eval_block(stmts: &[Statement], scope: &Scope, func_scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<Value> {
    hoist_block(stmts, scope, func_scope)?;
    let mut last = Value::Undefined;
    for stmt in stmts {
        last = eval_statement(stmt, scope, func_scope, this, ctx)?;
    }
    Ok(last)
}

/// `var`/function/`let`/`const`/class hoisting for one block: `let`/`const`/
/// class names become TDZ placeholders in `scope`; `var` names (collected
/// recursively, not descending into nested function/arrow/class bodies) are
/// declared in `func_scope`; function declarations are bound immediately in
/// `scope` so forward calls within the same block work.
pub(crate) fn hoist_block(stmts: &[Statement], scope: &Scope, func_scope: &Scope) -> EvalResult<()> {
    for stmt in stmts {
        match stmt {
            Statement::VariableDeclaration(d) if d.kind != DeclKind::Var => {
                for decl in &d.declarations {
                    let mut names = Vec::new();
                    destructure::collect_pattern_names(&decl.id, &mut names);
                    for name in names {
                        scope.reserve(name, to_binding_kind(d.kind));
                    }
                }
            }
            Statement::ClassDeclaration(c) => {
                if let Some(name) = &c.name {
                    scope.reserve(name.clone(), BindingKind::Let);
                }
            }
            _ => {}
        }
    }

    let mut var_names = Vec::new();
    collect_var_names(stmts, &mut var_names);
    for name in var_names {
        func_scope.hoist_var(name, CodeLoc::UNKNOWN).map_err(Flow::Error)?;
    }

    for stmt in stmts {
        if let Statement::FunctionDeclaration(decl) = stmt {
            let f = make_function_from_decl(decl, scope);
            scope.declare(decl.name.clone(), Value::Function(Rc::new(f)), BindingKind::Var);
        }
    }
    Ok(())
}

pub(crate) fn collect_var_names(stmts: &[Statement], out: &mut Vec<String>) {
    for stmt in stmts {
        collect_var_names_stmt(stmt, out);
    }
}

fn collect_var_names_stmt(stmt: &Statement, out: &mut Vec<String>) {
    match stmt {
        Statement::VariableDeclaration(d) if d.kind == DeclKind::Var => {
            for decl in &d.declarations {
                destructure::collect_pattern_names(&decl.id, out);
            }
        }
        Statement::Block(b) => collect_var_names(&b.body, out),
        Statement::If(s) => {
            collect_var_names_stmt(&s.consequent, out);
            if let Some(alt) = &s.alternate {
                collect_var_names_stmt(alt, out);
            }
        }
        Statement::For(s) => {
            if let Some(ForInit::VarDecl(d)) = &s.init {
                if d.kind == DeclKind::Var {
                    for decl in &d.declarations {
                        destructure::collect_pattern_names(&decl.id, out);
                    }
                }
            }
            collect_var_names_stmt(&s.body, out);
        }
        Statement::ForOf(s) => {
            if let ForTarget::Decl { kind: DeclKind::Var, pattern } = &s.left {
                destructure::collect_pattern_names(pattern, out);
            }
            collect_var_names_stmt(&s.body, out);
        }
        Statement::ForIn(s) => {
            if let ForTarget::Decl { kind: DeclKind::Var, pattern } = &s.left {
                destructure::collect_pattern_names(pattern, out);
            }
            collect_var_names_stmt(&s.body, out);
        }
        Statement::While(s) => collect_var_names_stmt(&s.body, out),
        Statement::DoWhile(s) => collect_var_names_stmt(&s.body, out),
        Statement::Try(s) => {
            collect_var_names(&s.block, out);
            if let Some(h) = &s.handler {
                collect_var_names(&h.body, out);
            }
            if let Some(f) = &s.finalizer {
                collect_var_names(f, out);
            }
        }
        Statement::Switch(s) => {
            for case in &s.cases {
                collect_var_names(&case.consequent, out);
            }
        }
        Statement::Labeled(s) => collect_var_names_stmt(&s.body, out),
        _ => {}
    }
}

// --- Statements --------------------------------------------------------------

/// Evaluates one already-hoisted top-level statement — exposed at
/// `pub(crate)` visibility so the interpreter façade's step-by-step
/// evaluator (`evaluate_steps`) can drive statements one at a time after
/// calling `hoist_block` itself once, up front.
pub(crate) fn eval_statement(stmt: &Statement, scope: &Scope, func_scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<Value> {
    ctx.check_node()?;
    ctx.tracer.on_statement(stmt.kind_name(), ctx.depth.get());
    match stmt {
        Statement::Empty => Ok(Value::Undefined),
        Statement::Expression(e) => eval_expression(&e.expr, scope, this, ctx),
        Statement::VariableDeclaration(d) => {
            for decl in &d.declarations {
                let value = match &decl.init {
                    Some(expr) => eval_expression(expr, scope, this, ctx)?,
                    None => Value::Undefined,
                };
                let mode = if d.kind == DeclKind::Var {
                    destructure::BindMode::Assign(func_scope)
                } else {
                    destructure::BindMode::Declare(scope, to_binding_kind(d.kind))
                };
                destructure::bind_pattern(&decl.id, value, &mode, this, d.loc, ctx)?;
            }
            Ok(Value::Undefined)
        }
        Statement::FunctionDeclaration(_) => Ok(Value::Undefined),
        Statement::ClassDeclaration(c) => {
            let class = classes::build_class(c, scope, this, ctx)?;
            if let Some(name) = &c.name {
                scope.assign(name, Value::Class(class), c.loc).map_err(Flow::Error)?;
            }
            Ok(Value::Undefined)
        }
        Statement::Block(b) => {
            let block_scope = scope.child();
            eval_block(&b.body, &block_scope, func_scope, this, ctx)
        }
        Statement::If(s) => {
            if eval_expression(&s.test, scope, this, ctx)?.is_truthy() {
                eval_statement(&s.consequent, scope, func_scope, this, ctx)
            } else if let Some(alt) = &s.alternate {
                eval_statement(alt, scope, func_scope, this, ctx)
            } else {
                Ok(Value::Undefined)
            }
        }
        Statement::While(s) => eval_while(s, scope, func_scope, this, ctx, &None),
        Statement::DoWhile(s) => eval_do_while(s, scope, func_scope, this, ctx, &None),
        Statement::For(s) => eval_for(s, scope, func_scope, this, ctx, &None),
        Statement::ForOf(s) => eval_for_of(s, scope, func_scope, this, ctx, &None),
        Statement::ForIn(s) => eval_for_in(s, scope, func_scope, this, ctx, &None),
        Statement::Try(s) => eval_try(s, scope, func_scope, this, ctx),
        Statement::Throw(s) => Err(Flow::Throw(eval_expression(&s.argument, scope, this, ctx)?)),
        Statement::Return(s) => {
            let v = match &s.argument {
                Some(e) => eval_expression(e, scope, this, ctx)?,
                None => Value::Undefined,
            };
            Err(Flow::Return(v))
        }
        Statement::Break(s) => Err(Flow::Break(s.label.clone())),
        Statement::Continue(s) => Err(Flow::Continue(s.label.clone())),
        Statement::Switch(s) => eval_switch(s, scope, func_scope, this, ctx),
        Statement::Labeled(s) => eval_labeled(s, scope, func_scope, this, ctx),
    }
}

fn eval_labeled(s: &LabeledStatement, scope: &Scope, func_scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<Value> {
    let label = Some(s.label.clone());
    let result = match s.body.as_ref() {
        Statement::While(w) => eval_while(w, scope, func_scope, this, ctx, &label),
        Statement::DoWhile(w) => eval_do_while(w, scope, func_scope, this, ctx, &label),
        Statement::For(w) => eval_for(w, scope, func_scope, this, ctx, &label),
        Statement::ForOf(w) => eval_for_of(w, scope, func_scope, this, ctx, &label),
        Statement::ForIn(w) => eval_for_in(w, scope, func_scope, this, ctx, &label),
        other => eval_statement(other, scope, func_scope, this, ctx),
    };
    match result {
        Err(Flow::Break(ref l)) if control_flow::label_matches(l, &label) => Ok(Value::Undefined),
        other => other,
    }
}

/// Runs one loop-body iteration, mapping `break`/`continue` against `label`.
/// Returns `Some(value)` to short-circuit the whole loop (a matching
/// `break`), `None` to keep iterating (normal completion or a matching
/// `continue`), or propagates any other `Flow`.
fn run_loop_body(body: &Statement, scope: &Scope, func_scope: &Scope, this: &Value, ctx: &EvalContext, label: &Option<String>) -> EvalResult<Option<Value>> {
    match eval_statement(body, scope, func_scope, this, ctx) {
        Ok(_) => Ok(None),
        Err(Flow::Continue(ref l)) if control_flow::label_matches(l, label) => Ok(None),
        Err(Flow::Break(ref l)) if control_flow::label_matches(l, label) => Ok(Some(Value::Undefined)),
        Err(other) => Err(other),
    }
}

fn check_loop_iteration(ctx: &EvalContext) -> EvalResult<()> {
    ctx.resource.on_loop_iteration();
    if let Some(err) = ctx.resource.is_exhausted() {
        return Err(Flow::Error(InterpreterError::ResourceExhausted(crate::error::ResourceExhaustedError { message: err.message })));
    }
    Ok(())
}

fn eval_while(s: &WhileStatement, scope: &Scope, func_scope: &Scope, this: &Value, ctx: &EvalContext, label: &Option<String>) -> EvalResult<Value> {
    while eval_expression(&s.test, scope, this, ctx)?.is_truthy() {
        check_loop_iteration(ctx)?;
        let body_scope = scope.child();
        if let Some(v) = run_loop_body(&s.body, &body_scope, func_scope, this, ctx, label)? {
            return Ok(v);
        }
    }
    Ok(Value::Undefined)
}

fn eval_do_while(s: &DoWhileStatement, scope: &Scope, func_scope: &Scope, this: &Value, ctx: &EvalContext, label: &Option<String>) -> EvalResult<Value> {
    loop {
        check_loop_iteration(ctx)?;
        let body_scope = scope.child();
        if let Some(v) = run_loop_body(&s.body, &body_scope, func_scope, this, ctx, label)? {
            return Ok(v);
        }
        if !eval_expression(&s.test, scope, this, ctx)?.is_truthy() {
            break;
        }
    }
    Ok(Value::Undefined)
}

fn eval_for(s: &ForStatement, scope: &Scope, func_scope: &Scope, this: &Value, ctx: &EvalContext, label: &Option<String>) -> EvalResult<Value> {
    let loop_scope = scope.child();
    if let Some(init) = &s.init {
        match init {
            ForInit::VarDecl(d) => {
                for decl in &d.declarations {
                    let value = match &decl.init {
                        Some(e) => eval_expression(e, &loop_scope, this, ctx)?,
                        None => Value::Undefined,
                    };
                    let mode = if d.kind == DeclKind::Var {
                        destructure::BindMode::Assign(func_scope)
                    } else {
                        destructure::BindMode::Declare(&loop_scope, to_binding_kind(d.kind))
                    };
                    destructure::bind_pattern(&decl.id, value, &mode, this, d.loc, ctx)?;
                }
            }
            ForInit::Expr(e) => {
                eval_expression(e, &loop_scope, this, ctx)?;
            }
        }
    }
    loop {
        if let Some(test) = &s.test {
            if !eval_expression(test, &loop_scope, this, ctx)?.is_truthy() {
                break;
            }
        }
        check_loop_iteration(ctx)?;
        let body_scope = loop_scope.child();
        if let Some(v) = run_loop_body(&s.body, &body_scope, func_scope, this, ctx, label)? {
            return Ok(v);
        }
        if let Some(update) = &s.update {
            eval_expression(update, &loop_scope, this, ctx)?;
        }
    }
    Ok(Value::Undefined)
}

fn bind_for_target(target: &ForTarget, value: Value, iter_scope: &Scope, this: &Value, loc: CodeLoc, ctx: &EvalContext) -> EvalResult<()> {
    match target {
        ForTarget::Decl { kind, pattern } => destructure::bind_pattern(pattern, value, &destructure::BindMode::Declare(iter_scope, to_binding_kind(*kind)), this, loc, ctx),
        ForTarget::Pattern(pattern) => destructure::bind_pattern(pattern, value, &destructure::BindMode::Assign(iter_scope), this, loc, ctx),
    }
}

fn eval_for_of(s: &ForOfStatement, scope: &Scope, func_scope: &Scope, this: &Value, ctx: &EvalContext, label: &Option<String>) -> EvalResult<Value> {
    if s.is_await {
        return Err(Flow::Error(InterpreterError::AsyncInSync(crate::error::AsyncInSyncError {
            message: "'for await' used in synchronous evaluation".to_string(),
            loc: s.loc,
        })));
    }
    let iterable = eval_expression(&s.right, scope, this, ctx)?;
    let items = destructure::iterate_for_destructure(&iterable, s.loc)?;
    for item in items {
        check_loop_iteration(ctx)?;
        let iter_scope = scope.child();
        bind_for_target(&s.left, item, &iter_scope, this, s.loc, ctx)?;
        let body_scope = iter_scope.child();
        if let Some(v) = run_loop_body(&s.body, &body_scope, func_scope, this, ctx, label)? {
            return Ok(v);
        }
    }
    Ok(Value::Undefined)
}

fn eval_for_in(s: &ForInStatement, scope: &Scope, func_scope: &Scope, this: &Value, ctx: &EvalContext, label: &Option<String>) -> EvalResult<Value> {
    let obj = eval_expression(&s.right, scope, this, ctx)?;
    let keys: Vec<String> = match &obj {
        Value::Object(o) => o.borrow().properties.keys().map(ToString::to_string).collect(),
        Value::Array(items) => (0..items.borrow().len()).map(|i| i.to_string()).collect(),
        Value::Instance(inst) => inst.borrow().fields.keys().map(ToString::to_string).collect(),
        _ => Vec::new(),
    };
    for key in keys {
        check_loop_iteration(ctx)?;
        let iter_scope = scope.child();
        bind_for_target(&s.left, Value::string(key), &iter_scope, this, s.loc, ctx)?;
        let body_scope = iter_scope.child();
        if let Some(v) = run_loop_body(&s.body, &body_scope, func_scope, this, ctx, label)? {
            return Ok(v);
        }
    }
    Ok(Value::Undefined)
}

fn eval_switch(s: &SwitchStatement, scope: &Scope, func_scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<Value> {
    let discriminant = eval_expression(&s.discriminant, scope, this, ctx)?;
    let switch_scope = scope.child();
    let mut tests = Vec::with_capacity(s.cases.len());
    for case in &s.cases {
        let t = match &case.test {
            Some(e) => Some(eval_expression(e, &switch_scope, this, ctx)?),
            None => None,
        };
        tests.push(t);
    }
    let Some(start) = control_flow::select_case(&discriminant, &tests) else {
        return Ok(Value::Undefined);
    };
    for case in &s.cases[start..] {
        for stmt in &case.consequent {
            match eval_statement(stmt, &switch_scope, func_scope, this, ctx) {
                Ok(_) => {}
                Err(Flow::Break(None)) => return Ok(Value::Undefined),
                Err(other) => return Err(other),
            }
        }
    }
    Ok(Value::Undefined)
}

fn eval_try(s: &TryStatement, scope: &Scope, func_scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<Value> {
    let block_scope = scope.child();
    let result = eval_block(&s.block, &block_scope, func_scope, this, ctx);
    let result = match result {
        Err(flow) if s.handler.is_some() => match into_catch_value(flow) {
            Ok(thrown) => {
                let handler = s.handler.as_ref().unwrap();
                let catch_scope = scope.child();
                let bound = match &handler.param {
                    Some(param) => destructure::bind_pattern(param, thrown, &destructure::BindMode::Declare(&catch_scope, BindingKind::Let), this, s.loc, ctx),
                    None => Ok(()),
                };
                match bound {
                    Ok(()) => eval_block(&handler.body, &catch_scope, func_scope, this, ctx),
                    Err(e) => Err(e),
                }
            }
            Err(flow) => Err(flow),
        },
        other => other,
    };
    if let Some(finalizer) = &s.finalizer {
        let finally_scope = scope.child();
        return match eval_block(finalizer, &finally_scope, func_scope, this, ctx) {
            Ok(_) => result,
            Err(flow) => Err(flow),
        };
    }
    result
}

// --- Expressions -------------------------------------------------------------

fn expr_kind_name(expr: &Expression) -> &'static str {
    match expr {
        Expression::Literal(..) => "Literal",
        Expression::TemplateLiteral(_) => "TemplateLiteral",
        Expression::Identifier(..) => "Identifier",
        Expression::This(_) => "ThisExpression",
        Expression::Super(_) => "Super",
        Expression::PrivateName(..) => "PrivateName",
        Expression::Unary(_) => "UnaryExpression",
        Expression::Binary(_) => "BinaryExpression",
        Expression::Logical(_) => "LogicalExpression",
        Expression::Update(_) => "UpdateExpression",
        Expression::Assignment(_) => "AssignmentExpression",
        Expression::Conditional(_) => "ConditionalExpression",
        Expression::Sequence(..) => "SequenceExpression",
        Expression::Call(_) => "CallExpression",
        Expression::New(_) => "NewExpression",
        Expression::Member(_) => "MemberExpression",
        Expression::Object(_) => "ObjectExpression",
        Expression::Array(_) => "ArrayExpression",
        Expression::Function(_) => "FunctionExpression",
        Expression::Arrow(_) => "ArrowFunctionExpression",
        Expression::Class(_) => "ClassExpression",
        Expression::Spread(..) => "SpreadElement",
        Expression::Await(..) => "AwaitExpression",
        Expression::Yield(_) => "YieldExpression",
    }
}

pub fn eval_expression(expr: &Expression, scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<Value> {
    ctx.check_node()?;
    ctx.tracer.on_expression(expr_kind_name(expr), ctx.depth.get());
    match expr {
        Expression::Literal(lit, _) => Ok(literal_value(lit)),
        Expression::TemplateLiteral(t) => eval_template_literal(t, scope, this, ctx),
        Expression::Identifier(name, loc) => scope.lookup(name, *loc).map_err(Flow::Error),
        Expression::This(_) => Ok(this.clone()),
        Expression::Super(loc) => Err(Flow::Error(InterpreterError::syntax("'super' keyword is unexpected here", *loc))),
        Expression::PrivateName(name, loc) => Err(Flow::Error(InterpreterError::syntax(
            format!("private name '#{name}' is only valid in a member or 'in' expression"),
            *loc,
        ))),
        Expression::Unary(u) => eval_unary(u, scope, this, ctx),
        Expression::Binary(b) => eval_binary(b, scope, this, ctx),
        Expression::Logical(l) => eval_logical(l, scope, this, ctx),
        Expression::Update(u) => eval_update(u, scope, this, ctx),
        Expression::Assignment(a) => eval_assignment(a, scope, this, ctx),
        Expression::Conditional(c) => {
            if eval_expression(&c.test, scope, this, ctx)?.is_truthy() {
                eval_expression(&c.consequent, scope, this, ctx)
            } else {
                eval_expression(&c.alternate, scope, this, ctx)
            }
        }
        Expression::Sequence(exprs, _) => {
            let mut last = Value::Undefined;
            for e in exprs {
                last = eval_expression(e, scope, this, ctx)?;
            }
            Ok(last)
        }
        Expression::Call(call) => eval_call(call, scope, this, ctx),
        Expression::New(n) => {
            let callee = eval_expression(&n.callee, scope, this, ctx)?;
            let args = eval_arguments(&n.arguments, scope, this, ctx)?;
            construct_value(callee, args, ctx, n.loc)
        }
        Expression::Member(member) => eval_member_read(member, scope, this, ctx),
        Expression::Object(o) => eval_object(o, scope, this, ctx),
        Expression::Array(a) => eval_array(a, scope, this, ctx),
        Expression::Function(f) => {
            let name: Rc<str> = Rc::from(f.name.clone().unwrap_or_default());
            Ok(Value::Function(Rc::new(make_function_from_expr(f, scope, name))))
        }
        Expression::Arrow(a) => Ok(Value::Function(Rc::new(make_arrow(a, scope, this)))),
        Expression::Class(c) => Ok(Value::Class(classes::build_class(c, scope, this, ctx)?)),
        Expression::Spread(_, loc) => Err(Flow::Error(InterpreterError::syntax("unexpected spread element", *loc))),
        Expression::Await(_, loc) => Err(Flow::Error(InterpreterError::AsyncInSync(crate::error::AsyncInSyncError {
            message: "'await' used in synchronous evaluation".to_string(),
            loc: *loc,
        }))),
        Expression::Yield(y) => eval_yield(y, scope, this, ctx),
    }
}

/// Generators here are eager, not coroutines: a call to a `function*` runs
/// its whole body immediately (see `call_function`), and `yield` just
/// appends to the frame `call_function` pushed for it rather than suspending
/// anything. A two-way generator protocol (`.next(v)`, `.throw()`,
/// `.return()`, laziness, infinite sequences) is out of reach this way; see
/// `DESIGN.md` for why.
fn eval_yield(y: &YieldExpr, scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<Value> {
    let value = match &y.argument {
        Some(expr) => eval_expression(expr, scope, this, ctx)?,
        None => Value::Undefined,
    };
    let recorded = if y.delegate {
        let items = destructure::iterate_for_destructure(&value, y.loc)?;
        ctx.extend_yield(items)
    } else {
        ctx.push_yield(value)
    };
    if recorded {
        Ok(Value::Undefined)
    } else {
        Err(Flow::Error(InterpreterError::syntax("'yield' is only valid inside a generator function", y.loc)))
    }
}

fn eval_template_literal(t: &TemplateLiteral, scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<Value> {
    let mut s = String::new();
    for (i, quasi) in t.quasis.iter().enumerate() {
        s.push_str(quasi);
        if let Some(expr) = t.expressions.get(i) {
            s.push_str(&eval_expression(expr, scope, this, ctx)?.to_js_string());
        }
    }
    ctx.track_allocation(s.len() as u64)?;
    Ok(Value::string(s))
}

fn eval_unary(u: &UnaryExpr, scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<Value> {
    if u.op == UnaryOp::Delete {
        return eval_delete(&u.argument, scope, this, ctx, u.loc);
    }
    let v = eval_expression(&u.argument, scope, this, ctx)?;
    operators::apply_unary(u.op, &v, u.loc).map_err(Into::into)
}

fn eval_delete(target: &Expression, scope: &Scope, this: &Value, ctx: &EvalContext, loc: CodeLoc) -> EvalResult<Value> {
    let Expression::Member(member) = target else {
        return Ok(Value::Boolean(true));
    };
    let obj = eval_expression(&member.object, scope, this, ctx)?;
    let key = member_key_name(member, scope, this, ctx)?;
    match &obj {
        Value::Object(o) => {
            security::check_property_name(&key, PropertyTarget::SandboxObject, loc).map_err(Flow::Error)?;
            o.borrow_mut().properties.shift_remove(key.as_str());
            Ok(Value::Boolean(true))
        }
        Value::Array(a) => {
            if let Ok(idx) = key.parse::<usize>() {
                let mut a = a.borrow_mut();
                if idx < a.len() {
                    a[idx] = Value::Undefined;
                }
            }
            Ok(Value::Boolean(true))
        }
        Value::Instance(inst) => {
            security::check_property_name(&key, PropertyTarget::SandboxInstance, loc).map_err(Flow::Error)?;
            inst.borrow_mut().fields.shift_remove(key.as_str());
            Ok(Value::Boolean(true))
        }
        Value::Host(host) => Err(Flow::Error(security::host_mutation_denied(&host.display_path, &key, loc))),
        _ => Ok(Value::Boolean(true)),
    }
}

fn eval_binary(b: &BinaryExpr, scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<Value> {
    if b.op == BinaryOp::In {
        return eval_in(b, scope, this, ctx);
    }
    if b.op == BinaryOp::Instanceof {
        let left = eval_expression(&b.left, scope, this, ctx)?;
        let right = eval_expression(&b.right, scope, this, ctx)?;
        return match (&left, &right) {
            (Value::Instance(inst), Value::Class(class)) => Ok(Value::Boolean(inst.borrow().class_ref.is_or_extends(class))),
            (_, Value::Class(_)) => Ok(Value::Boolean(false)),
            _ => Err(Flow::Error(InterpreterError::type_error("Right-hand side of 'instanceof' is not callable", b.loc))),
        };
    }
    let left = eval_expression(&b.left, scope, this, ctx)?;
    let right = eval_expression(&b.right, scope, this, ctx)?;
    let result = operators::apply_binary(b.op, &left, &right, b.loc)?;
    if let Value::String(s) = &result {
        ctx.track_allocation(s.len() as u64)?;
    }
    Ok(result)
}

fn eval_in(b: &BinaryExpr, scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<Value> {
    if let Expression::PrivateName(name, _) = b.left.as_ref() {
        let right = eval_expression(&b.right, scope, this, ctx)?;
        let full = format!("#{name}");
        let present = match &right {
            Value::Instance(inst) => {
                let inst = inst.borrow();
                inst.private_fields.contains_key(full.as_str()) || inst.class_ref.is_known_private_name(&full)
            }
            _ => false,
        };
        return Ok(Value::Boolean(present));
    }
    let left = eval_expression(&b.left, scope, this, ctx)?;
    let right = eval_expression(&b.right, scope, this, ctx)?;
    let name = left.to_js_string().to_string();
    let present = match &right {
        Value::Object(obj) => obj.borrow().get(&name).is_some(),
        Value::Array(items) => name == "length" || name.parse::<usize>().is_ok_and(|i| i < items.borrow().len()),
        Value::Instance(inst) => {
            let inst = inst.borrow();
            inst.fields.contains_key(name.as_str()) || inst.class_ref.resolve_instance_method(&name).is_some()
        }
        _ => return Err(Flow::Error(InterpreterError::type_error("Cannot use 'in' operator to search in this value", b.loc))),
    };
    Ok(Value::Boolean(present))
}

fn eval_logical(l: &LogicalExpr, scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<Value> {
    let left = eval_expression(&l.left, scope, this, ctx)?;
    match l.op {
        LogicalOp::And => {
            if left.is_truthy() {
                eval_expression(&l.right, scope, this, ctx)
            } else {
                Ok(left)
            }
        }
        LogicalOp::Or => {
            if left.is_truthy() {
                Ok(left)
            } else {
                eval_expression(&l.right, scope, this, ctx)
            }
        }
        LogicalOp::Nullish => {
            if matches!(left, Value::Undefined | Value::Null) {
                eval_expression(&l.right, scope, this, ctx)
            } else {
                Ok(left)
            }
        }
    }
}

fn read_simple_target(expr: &Expression, scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<Value> {
    match expr {
        Expression::Identifier(name, loc) => scope.lookup(name, *loc).map_err(Flow::Error),
        Expression::Member(member) => eval_member_read(member, scope, this, ctx),
        _ => Err(Flow::Error(InterpreterError::syntax("invalid assignment target", expr.loc()))),
    }
}

fn assign_simple_target(expr: &Expression, value: Value, scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<()> {
    match expr {
        Expression::Identifier(name, loc) => scope.assign(name, value, *loc).map_err(Flow::Error),
        Expression::Member(member) => {
            let obj = eval_expression(&member.object, scope, this, ctx)?;
            let key = member_key_name(member, scope, this, ctx)?;
            set_member(&obj, &key, value, member.loc, ctx)
        }
        _ => Err(Flow::Error(InterpreterError::syntax("invalid assignment target", expr.loc()))),
    }
}

fn eval_update(u: &UpdateExpr, scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<Value> {
    let old = read_simple_target(&u.argument, scope, this, ctx)?;
    let new_value = operators::apply_update(u.op, &old);
    assign_simple_target(&u.argument, new_value.clone(), scope, this, ctx)?;
    Ok(if u.prefix { new_value } else { old })
}

fn read_pattern_target(pattern: &Pattern, scope: &Scope, this: &Value, ctx: &EvalContext, loc: CodeLoc) -> EvalResult<Value> {
    match pattern {
        Pattern::Identifier(name) => scope.lookup(name, loc).map_err(Flow::Error),
        Pattern::Member(member) => eval_member_read(member, scope, this, ctx),
        _ => Err(Flow::Error(InterpreterError::syntax("invalid assignment target", loc))),
    }
}

fn eval_assignment(a: &AssignmentExpr, scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<Value> {
    match a.op {
        AssignOp::Assign => {
            let value = eval_expression(&a.value, scope, this, ctx)?;
            destructure::bind_pattern(&a.target, value.clone(), &destructure::BindMode::Assign(scope), this, a.loc, ctx)?;
            Ok(value)
        }
        AssignOp::And | AssignOp::Or | AssignOp::Nullish => {
            let current = read_pattern_target(&a.target, scope, this, ctx, a.loc)?;
            let should_assign = match a.op {
                AssignOp::And => current.is_truthy(),
                AssignOp::Or => !current.is_truthy(),
                AssignOp::Nullish => matches!(current, Value::Undefined | Value::Null),
                _ => unreachable!(),
            };
            if should_assign {
                let value = eval_expression(&a.value, scope, this, ctx)?;
                destructure::bind_pattern(&a.target, value.clone(), &destructure::BindMode::Assign(scope), this, a.loc, ctx)?;
                Ok(value)
            } else {
                Ok(current)
            }
        }
        other_op => {
            let current = read_pattern_target(&a.target, scope, this, ctx, a.loc)?;
            let rhs = eval_expression(&a.value, scope, this, ctx)?;
            let binop = operators::as_binary_op(other_op).expect("compound-assignment operator always maps to a binary op here");
            let result = operators::apply_binary(binop, &current, &rhs, a.loc)?;
            if let Value::String(s) = &result {
                ctx.track_allocation(s.len() as u64)?;
            }
            destructure::bind_pattern(&a.target, result.clone(), &destructure::BindMode::Assign(scope), this, a.loc, ctx)?;
            Ok(result)
        }
    }
}

fn eval_object(o: &ObjectExpr, scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<Value> {
    let mut obj = JsObject::new();
    for prop in &o.properties {
        match prop {
            ObjectProperty::KeyValue { key, value, .. } => {
                let name = property_key_name(key, scope, this, ctx)?;
                let v = eval_expression(value, scope, this, ctx)?;
                security::check_property_name(&name, PropertyTarget::SandboxObject, o.loc).map_err(Flow::Error)?;
                obj.set_data(name.as_str(), v);
            }
            ObjectProperty::Method { key, kind, function } => {
                let name = property_key_name(key, scope, this, ctx)?;
                security::check_property_name(&name, PropertyTarget::SandboxObject, o.loc).map_err(Flow::Error)?;
                let f = Rc::new(make_function_from_expr(function, scope, Rc::from(name.as_str())));
                let rc_name: Rc<str> = Rc::from(name.as_str());
                match kind {
                    MethodKind::Get => upsert_accessor(&mut obj, rc_name, Some(f), None),
                    MethodKind::Set => upsert_accessor(&mut obj, rc_name, None, Some(f)),
                    _ => obj.set_data(rc_name, Value::Function(f)),
                }
            }
            ObjectProperty::Spread(expr) => {
                let v = eval_expression(expr, scope, this, ctx)?;
                if let Value::Object(src) = v {
                    let entries: Vec<(Rc<str>, Value)> = src
                        .borrow()
                        .properties
                        .iter()
                        .filter_map(|(k, d)| match d {
                            PropertyDescriptor::Data { value, .. } => Some((k.clone(), value.clone())),
                            PropertyDescriptor::Accessor { .. } => None,
                        })
                        .collect();
                    for (k, v) in entries {
                        obj.set_data(k, v);
                    }
                }
            }
        }
    }
    ctx.track_allocation(approx_object_bytes(obj.properties.len()))?;
    Ok(Value::object(obj))
}

/// A rough per-property byte cost (key + descriptor + `Value`'s own
/// overhead) — not exact, only large enough to make `max_total_memory`
/// actually bite on unbounded object/array growth.
fn approx_object_bytes(property_count: usize) -> u64 {
    64 + property_count as u64 * 64
}

fn approx_array_bytes(element_count: usize) -> u64 {
    32 + element_count as u64 * 32
}

fn upsert_accessor(obj: &mut JsObject, name: Rc<str>, getter: Option<Rc<SandboxFunction>>, setter: Option<Rc<SandboxFunction>>) {
    let (mut g, mut s) = match obj.properties.get(&name) {
        Some(PropertyDescriptor::Accessor { get, set }) => (get.clone(), set.clone()),
        _ => (None, None),
    };
    if getter.is_some() {
        g = getter;
    }
    if setter.is_some() {
        s = setter;
    }
    obj.properties.insert(name, PropertyDescriptor::Accessor { get: g, set: s });
}

fn eval_array(a: &ArrayExpr, scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<Value> {
    let mut items = Vec::new();
    for el in &a.elements {
        match el {
            None => items.push(Value::Undefined),
            Some(Argument::Normal(expr)) => items.push(eval_expression(expr, scope, this, ctx)?),
            Some(Argument::Spread(expr)) => {
                let v = eval_expression(expr, scope, this, ctx)?;
                items.extend(destructure::iterate_for_destructure(&v, a.loc)?);
            }
        }
    }
    ctx.track_allocation(approx_array_bytes(items.len()))?;
    Ok(Value::array(items))
}

pub(crate) fn eval_arguments(args: &[Argument], scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<Vec<Value>> {
    let mut out = Vec::new();
    for a in args {
        match a {
            Argument::Normal(expr) => out.push(eval_expression(expr, scope, this, ctx)?),
            Argument::Spread(expr) => {
                let v = eval_expression(expr, scope, this, ctx)?;
                out.extend(destructure::iterate_for_destructure(&v, expr.loc())?);
            }
        }
    }
    Ok(out)
}

// --- Member expressions, calls, `new` ----------------------------------------

pub(crate) fn member_key_name(member: &MemberExpr, scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<String> {
    if member.computed {
        let v = eval_expression(&member.property, scope, this, ctx)?;
        return Ok(v.to_js_string().to_string());
    }
    match member.property.as_ref() {
        Expression::Identifier(name, _) => Ok(name.clone()),
        Expression::PrivateName(name, _) => Ok(format!("#{name}")),
        other => unreachable!("non-computed member property is always Identifier or PrivateName, got {other:?}"),
    }
}

pub(crate) fn property_key_name(key: &PropertyKey, scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<String> {
    Ok(match key {
        PropertyKey::Identifier(n) | PropertyKey::StringLiteral(n) => n.clone(),
        PropertyKey::PrivateIdentifier(n) => format!("#{n}"),
        PropertyKey::NumberLiteral(n) => n.to_string(),
        PropertyKey::Computed(expr) => eval_expression(expr, scope, this, ctx)?.to_js_string().to_string(),
    })
}

fn eval_member_read(member: &MemberExpr, scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<Value> {
    if matches!(member.object.as_ref(), Expression::Super(_)) {
        return eval_super_property(member, scope, this, ctx);
    }
    let obj = eval_expression(&member.object, scope, this, ctx)?;
    if member.optional && matches!(obj, Value::Undefined | Value::Null) {
        return Ok(Value::Undefined);
    }
    let key = member_key_name(member, scope, this, ctx)?;
    get_member_by_name(&obj, &key, member.loc, ctx)
}

pub(crate) fn eval_super_property(member: &MemberExpr, scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<Value> {
    let Value::Instance(instance) = this else {
        return Err(Flow::Error(InterpreterError::syntax("'super' keyword is only valid inside a class", member.loc)));
    };
    let class = instance.borrow().class_ref.clone();
    let Some(superclass) = &class.superclass else {
        return Err(Flow::Error(InterpreterError::syntax("'super' requires a superclass", member.loc)));
    };
    let key = member_key_name(member, scope, this, ctx)?;
    match superclass.resolve_instance_method(&key).cloned() {
        Some(Member::Method(f)) => Ok(Value::Function(Rc::new(SandboxFunction { bound_this: Some(this.clone()), ..(*f).clone() }))),
        Some(Member::Accessor(a)) => match a.get {
            Some(getter) => call_function(&getter, this.clone(), Vec::new(), ctx),
            None => Ok(Value::Undefined),
        },
        None => Ok(Value::Undefined),
    }
}

fn resolve_static(class: &Rc<SandboxClass>, name: &str) -> Option<(Option<Value>, Option<Member>)> {
    if let Some(v) = class.static_values.borrow().get(name) {
        return Some((Some(v.clone()), None));
    }
    if let Some(m) = class.static_methods.get(name) {
        return Some((None, Some(m.clone())));
    }
    class.superclass.as_ref().and_then(|p| resolve_static(p, name))
}

/// Generic property read, shared by plain `Member` expressions, destructuring
/// object patterns, and the call-expression callee lookup.
pub(crate) fn get_member_by_name(object: &Value, name: &str, loc: CodeLoc, ctx: &EvalContext) -> EvalResult<Value> {
    match object {
        Value::Undefined | Value::Null => Err(Flow::Error(InterpreterError::type_error(
            format!("Cannot read properties of {} (reading '{name}')", object.to_js_string()),
            loc,
        ))),
        Value::Array(items) => {
            if name == "length" {
                return Ok(Value::Number(items.borrow().len() as f64));
            }
            if let Ok(index) = name.parse::<usize>() {
                return Ok(items.borrow().get(index).cloned().unwrap_or(Value::Undefined));
            }
            Ok(Value::Undefined)
        }
        Value::String(s) => {
            if name == "length" {
                return Ok(Value::Number(s.chars().count() as f64));
            }
            if let Ok(index) = name.parse::<usize>() {
                return Ok(s.chars().nth(index).map(|c| Value::string(c.to_string())).unwrap_or(Value::Undefined));
            }
            Ok(Value::Undefined)
        }
        Value::Object(obj) => {
            security::check_property_name(name, PropertyTarget::SandboxObject, loc).map_err(Flow::Error)?;
            let descriptor = obj.borrow().get(name).cloned_descriptor();
            match descriptor {
                Some(PropertyDescriptor::Data { value, .. }) => Ok(value),
                Some(PropertyDescriptor::Accessor { get: Some(getter), .. }) => call_function(&getter, object.clone(), Vec::new(), ctx),
                Some(PropertyDescriptor::Accessor { get: None, .. }) | None => Ok(Value::Undefined),
            }
        }
        Value::Instance(instance) => {
            if name.starts_with('#') {
                let inst = instance.borrow();
                if let Some(v) = inst.private_fields.get(name) {
                    return Ok(v.clone());
                }
                if inst.class_ref.is_known_private_name(name) {
                    return Ok(Value::Undefined);
                }
                return Err(Flow::Error(InterpreterError::syntax(format!("Private field '{name}' must be declared in an enclosing class"), loc)));
            }
            security::check_property_name(name, PropertyTarget::SandboxInstance, loc).map_err(Flow::Error)?;
            let inst = instance.borrow();
            if let Some(v) = inst.fields.get(name) {
                return Ok(v.clone());
            }
            let member = inst.class_ref.resolve_instance_method(name).cloned();
            drop(inst);
            match member {
                Some(Member::Method(f)) => Ok(Value::Function(Rc::new(SandboxFunction { bound_this: Some(object.clone()), ..(*f).clone() }))),
                Some(Member::Accessor(a)) => match a.get {
                    Some(getter) => call_function(&getter, object.clone(), Vec::new(), ctx),
                    None => Ok(Value::Undefined),
                },
                None => Ok(Value::Undefined),
            }
        }
        Value::Class(class) => {
            if name.starts_with('#') {
                return Err(Flow::Error(InterpreterError::syntax(format!("Private name '{name}' is not accessible here"), loc)));
            }
            security::check_property_name(name, PropertyTarget::SandboxObject, loc).map_err(Flow::Error)?;
            match resolve_static(class, name) {
                Some((Some(v), None)) => Ok(v),
                Some((None, Some(Member::Method(f)))) => Ok(Value::Function(Rc::new(SandboxFunction { bound_this: Some(object.clone()), ..(*f).clone() }))),
                Some((None, Some(Member::Accessor(a)))) => match a.get {
                    Some(getter) => call_function(&getter, object.clone(), Vec::new(), ctx),
                    None => Ok(Value::Undefined),
                },
                _ => Ok(Value::Undefined),
            }
        }
        Value::Function(f) => Ok(match name {
            "name" => Value::string(f.name.clone().unwrap_or_default()),
            "length" => Value::Number(f.arity() as f64),
            _ => Value::Undefined,
        }),
        Value::HostCallable(c) => {
            if name == "name" {
                return Ok(Value::string(c.name.clone()));
            }
            // Static properties on a standalone callable (e.g.
            // `Promise.resolve`) are reached the same way a host proxy's own
            // keys are, since a `HostCallable` is itself backed by a
            // `HostObject`. Bound (method-reference) callables have no such
            // surface — there is no parent object identity to read from.
            if let security::CallableTarget::Standalone(obj) = &c.target {
                if obj.static_methods().contains(&name) {
                    return Ok(Value::HostCallable(Rc::new(security::HostCallable {
                        kind: security::CallableKind::MethodBound,
                        name: name.to_string(),
                        arity: None,
                        target: security::CallableTarget::Bound { parent: obj.clone(), method: name.to_string() },
                    })));
                }
                if let Some(result) = obj.get_own(name) {
                    return Ok(security::wrap_host_result(result, obj, &c.name, 0));
                }
            }
            Ok(Value::Undefined)
        }
        Value::Host(host) => security::read_host_property(host, name, loc).map_err(Flow::Error),
        Value::Number(_) | Value::Boolean(_) | Value::Promise(_) => Ok(Value::Undefined),
    }
}

/// Small helper so the `Object` read arm above doesn't hold a `Ref` across
/// the accessor-getter call below (which may itself mutate the object).
trait ClonedDescriptor {
    fn cloned_descriptor(self) -> Option<PropertyDescriptor>;
}

impl ClonedDescriptor for Option<&PropertyDescriptor> {
    fn cloned_descriptor(self) -> Option<PropertyDescriptor> {
        self.cloned()
    }
}

pub(crate) fn set_member(object: &Value, name: &str, value: Value, loc: CodeLoc, ctx: &EvalContext) -> EvalResult<()> {
    match object {
        Value::Array(items) => {
            if name == "length" {
                let new_len = value.to_number().max(0.0) as usize;
                items.borrow_mut().resize(new_len, Value::Undefined);
                return Ok(());
            }
            if let Ok(index) = name.parse::<usize>() {
                let mut a = items.borrow_mut();
                if index >= a.len() {
                    a.resize(index + 1, Value::Undefined);
                }
                a[index] = value;
            }
            Ok(())
        }
        Value::Object(obj) => {
            security::check_property_name(name, PropertyTarget::SandboxObject, loc).map_err(Flow::Error)?;
            let setter = match obj.borrow().get(name) {
                Some(PropertyDescriptor::Accessor { set, .. }) => set.clone(),
                _ => None,
            };
            if let Some(setter) = setter {
                call_function(&setter, object.clone(), vec![value], ctx)?;
                return Ok(());
            }
            obj.borrow_mut().set_data(name, value);
            Ok(())
        }
        Value::Instance(instance) => {
            if name.starts_with('#') {
                if !instance.borrow().class_ref.is_known_private_name(name) {
                    return Err(Flow::Error(InterpreterError::syntax(format!("Private field '{name}' must be declared in an enclosing class"), loc)));
                }
                instance.borrow_mut().private_fields.insert(Rc::from(name), value);
                return Ok(());
            }
            security::check_property_name(name, PropertyTarget::SandboxInstance, loc).map_err(Flow::Error)?;
            let setter = instance.borrow().class_ref.resolve_instance_method(name).and_then(|m| match m {
                Member::Accessor(a) => a.set.clone(),
                Member::Method(_) => None,
            });
            if let Some(setter) = setter {
                call_function(&setter, object.clone(), vec![value], ctx)?;
                return Ok(());
            }
            instance.borrow_mut().fields.insert(Rc::from(name), value);
            Ok(())
        }
        Value::Host(host) => Err(Flow::Error(security::host_mutation_denied(&host.display_path, name, loc))),
        Value::Undefined | Value::Null => Err(Flow::Error(InterpreterError::type_error(format!("Cannot set properties of {}", object.to_js_string()), loc))),
        _ => Err(Flow::Error(InterpreterError::type_error("value does not support property assignment", loc))),
    }
}

pub(crate) fn assign_member_pattern(member: &MemberExpr, value: Value, scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<()> {
    let obj = eval_expression(&member.object, scope, this, ctx)?;
    let key = member_key_name(member, scope, this, ctx)?;
    set_member(&obj, &key, value, member.loc, ctx)
}

fn eval_call(call: &CallExpr, scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<Value> {
    if matches!(call.callee.as_ref(), Expression::Super(_)) {
        let Value::Instance(instance) = this else {
            return Err(Flow::Error(InterpreterError::syntax("'super' keyword is only valid inside a class constructor", call.loc)));
        };
        let class = instance.borrow().class_ref.clone();
        let Some(superclass) = &class.superclass else {
            return Err(Flow::Error(InterpreterError::syntax("'super' requires a superclass", call.loc)));
        };
        let args = eval_arguments(&call.arguments, scope, this, ctx)?;
        let result = match &superclass.constructor {
            Some(ctor) => call_function(ctor, this.clone(), args, ctx)?,
            None => Value::Undefined,
        };
        // The class whose constructor body contains this `super(...)` call
        // is the one `this` was constructed as — its own instance fields
        // initialize now, immediately after `super()` returns and before
        // the rest of this constructor's statements run.
        classes::init_own_instance_fields(&class, this, ctx)?;
        return Ok(result);
    }

    if let Expression::Member(member) = call.callee.as_ref() {
        if matches!(member.object.as_ref(), Expression::Super(_)) {
            let Value::Instance(instance) = this else {
                return Err(Flow::Error(InterpreterError::syntax("'super' keyword is only valid inside a class", call.loc)));
            };
            let class = instance.borrow().class_ref.clone();
            let Some(superclass) = &class.superclass else {
                return Err(Flow::Error(InterpreterError::syntax("'super' requires a superclass", call.loc)));
            };
            let key = member_key_name(member, scope, this, ctx)?;
            let args = eval_arguments(&call.arguments, scope, this, ctx)?;
            return match superclass.resolve_instance_method(&key).cloned() {
                Some(Member::Method(f)) => call_function(&f, this.clone(), args, ctx),
                _ => Err(Flow::Error(InterpreterError::type_error(format!("super.{key} is not a function"), call.loc))),
            };
        }

        let obj = eval_expression(&member.object, scope, this, ctx)?;
        if member.optional && matches!(obj, Value::Undefined | Value::Null) {
            return Ok(Value::Undefined);
        }
        let key = member_key_name(member, scope, this, ctx)?;
        if let Value::Array(items) = &obj {
            if native_methods::is_array_method(&key) {
                let args = eval_arguments(&call.arguments, scope, this, ctx)?;
                return native_methods::call_array_method(items, &key, &args, call.loc, ctx);
            }
        }
        if let Value::String(s) = &obj {
            if native_methods::is_string_method(&key) {
                let args = eval_arguments(&call.arguments, scope, this, ctx)?;
                return native_methods::call_string_method(s, &key, &args, call.loc, ctx);
            }
        }
        let callee_val = get_member_by_name(&obj, &key, call.loc, ctx)?;
        if call.optional && matches!(callee_val, Value::Undefined | Value::Null) {
            return Ok(Value::Undefined);
        }
        let args = eval_arguments(&call.arguments, scope, this, ctx)?;
        return call_value(&callee_val, obj, args, call.loc, ctx);
    }

    let callee_val = eval_expression(&call.callee, scope, this, ctx)?;
    if call.optional && matches!(callee_val, Value::Undefined | Value::Null) {
        return Ok(Value::Undefined);
    }
    let args = eval_arguments(&call.arguments, scope, this, ctx)?;
    call_value(&callee_val, Value::Undefined, args, call.loc, ctx)
}

pub fn call_value(callee: &Value, this: Value, args: Vec<Value>, loc: CodeLoc, ctx: &EvalContext) -> EvalResult<Value> {
    match callee {
        Value::Function(f) => call_function(f, this, args, ctx),
        Value::HostCallable(c) => {
            ctx.tracer.on_host_boundary(&c.name);
            security::invoke_callable(c, args, ctx, ctx.security.hide_host_error_messages, loc).map_err(Flow::Error)
        }
        Value::Class(_) => Err(Flow::Error(InterpreterError::type_error("Class constructor cannot be invoked without 'new'", loc))),
        other => Err(Flow::Error(InterpreterError::type_error(format!("{} is not a function", other.typeof_str()), loc))),
    }
}

pub fn call_function(f: &SandboxFunction, this: Value, args: Vec<Value>, ctx: &EvalContext) -> EvalResult<Value> {
    if f.is_async {
        return Err(Flow::Error(InterpreterError::AsyncInSync(crate::error::AsyncInSyncError {
            message: "cannot call an async function from synchronous evaluation".to_string(),
            loc: f.loc,
        })));
    }
    ctx.resource.on_function_call();
    if let Some(err) = ctx.resource.is_exhausted() {
        return Err(Flow::Error(InterpreterError::ResourceExhausted(crate::error::ResourceExhaustedError { message: err.message })));
    }

    let call_scope = f.call_scope();
    let effective_this = if f.is_arrow { f.bound_this.clone().unwrap_or(Value::Undefined) } else { this };
    let args_snapshot = args.clone();
    destructure::bind_params(&f.params, &args, &call_scope, &effective_this, f.loc, ctx)?;
    if !f.is_arrow {
        call_scope.declare("arguments", Value::array(args_snapshot), BindingKind::Var);
    }

    ctx.tracer.on_call(f.name.as_deref().unwrap_or("<anonymous>"), ctx.depth.get());
    ctx.tracer.on_scope_push(ctx.depth.get());
    ctx.depth.set(ctx.depth.get() + 1);
    let result = if f.is_generator {
        ctx.push_generator_frame();
        let body_result = eval_function_body(&f.body, &call_scope, &effective_this, ctx);
        let yielded = ctx.pop_generator_frame();
        body_result.map(|_| Value::array(yielded))
    } else {
        eval_function_body(&f.body, &call_scope, &effective_this, ctx)
    };
    ctx.depth.set(ctx.depth.get() - 1);
    ctx.tracer.on_scope_pop(ctx.depth.get());
    ctx.tracer.on_return(ctx.depth.get());
    result
}

fn eval_function_body(body: &[Statement], scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<Value> {
    hoist_block(body, scope, scope)?;
    for stmt in body {
        match eval_statement(stmt, scope, scope, this, ctx) {
            Ok(_) => {}
            Err(Flow::Return(v)) => return Ok(v),
            Err(other) => return Err(other),
        }
    }
    Ok(Value::Undefined)
}

pub(crate) fn construct_value(callee: Value, args: Vec<Value>, ctx: &EvalContext, loc: CodeLoc) -> EvalResult<Value> {
    match callee {
        Value::Class(class) => classes::construct_instance(&class, args, ctx, loc),
        Value::Function(f) => {
            if f.is_arrow || f.is_async || f.is_generator {
                return Err(Flow::Error(InterpreterError::type_error("value is not a constructor", loc)));
            }
            let instance_obj = Value::object(JsObject::new());
            let result = call_function(&f, instance_obj.clone(), args, ctx)?;
            Ok(match result {
                Value::Object(_) => result,
                _ => instance_obj,
            })
        }
        Value::HostCallable(c) => {
            ctx.tracer.on_host_boundary(&c.name);
            let converted: Vec<Value> = args.iter().map(security::snapshot_for_host).collect();
            let target_obj = match &c.target {
                security::CallableTarget::Standalone(obj) => obj,
                security::CallableTarget::Bound { parent, .. } => parent,
            };
            let as_value = target_obj.construct_as_value(converted.clone(), ctx);
            let to_sandbox_error = |message: String| {
                let shown = if ctx.security.hide_host_error_messages { "host call failed".to_string() } else { message };
                Flow::Error(InterpreterError::HostCall(crate::error::HostCallError { message: shown, loc }))
            };
            if let Some(result) = as_value {
                return result.map_err(to_sandbox_error);
            }
            match target_obj.construct(converted, ctx) {
                Ok(obj) => Ok(Value::Host(Rc::new(HostValue::root(obj, c.name.clone())))),
                Err(message) => Err(to_sandbox_error(message)),
            }
        }
        other => Err(Flow::Error(InterpreterError::type_error(format!("{} is not a constructor", other.typeof_str()), loc))),
    }
}

// --- Function/arrow construction ---------------------------------------------

pub(crate) fn make_function_from_decl(decl: &FunctionDecl, scope: &Scope) -> SandboxFunction {
    SandboxFunction {
        name: Some(decl.name.clone()),
        params: Params::from_ast(&decl.params),
        body: Rc::new(decl.body.clone()),
        defining_env: scope.clone(),
        is_arrow: false,
        is_async: decl.is_async,
        is_generator: decl.is_generator,
        bound_this: None,
        loc: decl.loc,
    }
}

pub(crate) fn make_function_from_expr(expr: &FunctionExpr, scope: &Scope, name: Rc<str>) -> SandboxFunction {
    SandboxFunction {
        name: Some(name.to_string()),
        params: Params::from_ast(&expr.params),
        body: Rc::new(expr.body.clone()),
        defining_env: scope.clone(),
        is_arrow: false,
        is_async: expr.is_async,
        is_generator: expr.is_generator,
        bound_this: None,
        loc: expr.loc,
    }
}

pub(crate) fn make_arrow(expr: &ArrowFunctionExpr, scope: &Scope, this: &Value) -> SandboxFunction {
    let body = match &expr.body {
        ArrowBody::Block(stmts) => stmts.clone(),
        ArrowBody::Expr(e) => vec![Statement::Return(ReturnStatement { argument: Some((**e).clone()), loc: expr.loc })],
    };
    SandboxFunction {
        name: None,
        params: Params::from_ast(&expr.params),
        body: Rc::new(body),
        defining_env: scope.clone(),
        is_arrow: true,
        is_async: expr.is_async,
        is_generator: false,
        bound_this: Some(this.clone()),
        loc: expr.loc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::NoLimitTracker;
    use crate::tracer::NoopTracer;

    fn run(src: &str) -> Result<Value, InterpreterError> {
        let program = crate::parse::parse(src).unwrap();
        let security = SecurityOptions::default();
        let ctx = EvalContext::new(&security, &NoLimitTracker, &NoopTracer);
        let scope = Scope::root();
        eval_program(&program, &scope, &ctx)
    }

    #[test]
    fn arithmetic_and_variables() {
        let result = run("let x = 2 + 3 * 4; x;").unwrap();
        assert_eq!(result.to_number(), 14.0);
    }

    #[test]
    fn closures_capture_defining_scope() {
        let result = run(
            r#"
            function makeCounter() {
                let count = 0;
                return function () { count = count + 1; return count; };
            }
            let counter = makeCounter();
            counter();
            counter();
            counter();
            "#,
        )
        .unwrap();
        assert_eq!(result.to_number(), 3.0);
    }

    #[test]
    fn arrow_functions_inherit_lexical_this() {
        let result = run(
            r#"
            class Box {
                constructor(value) { this.value = value; }
                makeGetter() { return () => this.value; }
            }
            let box = new Box(42);
            let getter = box.makeGetter();
            getter();
            "#,
        )
        .unwrap();
        assert_eq!(result.to_number(), 42.0);
    }

    #[test]
    fn try_catch_intercepts_thrown_value() {
        let result = run(
            r#"
            let caught;
            try {
                throw "boom";
            } catch (e) {
                caught = e;
            }
            caught;
            "#,
        )
        .unwrap();
        assert_eq!(result.to_js_string().as_ref(), "boom");
    }

    #[test]
    fn finally_runs_even_when_try_returns() {
        let result = run(
            r#"
            function f() {
                let log = [];
                try {
                    return 1;
                } finally {
                    log.push("finally");
                }
            }
            f();
            "#,
        )
        .unwrap();
        assert_eq!(result.to_number(), 1.0);
    }

    #[test]
    fn labeled_break_exits_outer_loop() {
        let result = run(
            r#"
            let total = 0;
            outer: for (let i = 0; i < 3; i = i + 1) {
                for (let j = 0; j < 3; j = j + 1) {
                    if (j === 1) { continue outer; }
                    if (i === 2) { break outer; }
                    total = total + 1;
                }
            }
            total;
            "#,
        )
        .unwrap();
        assert_eq!(result.to_number(), 2.0);
    }

    #[test]
    fn forbidden_property_name_is_security_error() {
        let err = run("let o = {}; o.__proto__;").unwrap_err();
        assert_eq!(err.kind_name(), "SecurityError");
    }

    #[test]
    fn const_reassignment_is_type_error() {
        let err = run("const x = 1; x = 2;").unwrap_err();
        assert_eq!(err.kind_name(), "TypeError");
    }

    #[test]
    fn array_destructuring_with_rest() {
        let result = run("let [a, ...rest] = [1, 2, 3]; rest.length;").unwrap();
        assert_eq!(result.to_number(), 2.0);
    }

    #[test]
    fn generator_call_collects_yielded_values_as_an_array() {
        let result = run(
            r#"
            function* g() { yield 1; yield 2; yield 3; }
            let total = 0;
            for (const v of g()) { total = total + v; }
            total;
            "#,
        )
        .unwrap();
        assert_eq!(result.to_number(), 6.0);
    }

    #[test]
    fn generator_return_value_is_not_among_yielded_items() {
        let result = run(
            r#"
            function* g() { yield 1; return 99; }
            let items = [];
            for (const v of g()) { items.push(v); }
            items.length;
            "#,
        )
        .unwrap();
        assert_eq!(result.to_number(), 1.0);
    }

    #[test]
    fn yield_outside_generator_is_syntax_error() {
        let err = run("function f() { yield 1; } f();").unwrap_err();
        assert_eq!(err.kind_name(), "SyntaxError");
    }
}
