//! The interpreter façade (component I): the one entry point a host actually
//! calls. Everything above this module (parser, security gate, evaluator,
//! async driver, built-ins catalog) is plumbing this struct wires together,
//! the same role the teacher's `Runner`/`ReplSession` split plays over its
//! own bytecode VM — `Interpreter::new` is `Runner::new` (parse configuration
//! once), `evaluate`/`evaluate_async` are `Runner::run`/`start` (execute with
//! fresh input against persistent state), and `evaluate_steps` is
//! `ReplSession`'s stepper, reshaped as a plain `Iterator`.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context as TaskContext, Poll};
use std::time::{Duration, Instant};

use crate::ast::{Program, Statement};
use crate::async_driver;
use crate::builtins::{self, EsVersion};
use crate::environment::{BindingKind, Scope};
use crate::error::{CancelledError, CodeLoc, InterpreterError, ResourceExhaustedError};
use crate::evaluator::{self, EvalContext, Flow};
use crate::parse;
use crate::resource::{HistoryEntry, LimitedTracker, NoLimitTracker, ResourceTracker, Stats};
use crate::security::SecurityOptions;
use crate::tracer::{EvalTracer, NoopTracer};
use crate::validator::{self, Validator};
use crate::value::Value;

/// A host-supplied name/value pair, declared as a `var` binding at the
/// layer named by where it's installed (constructor-time globals vs
/// per-call globals — see `Interpreter::new`/`CallOptions`).
pub type Global = (String, Value);

/// A cooperative cancellation flag an `evaluate_async` caller can flip from
/// outside while the future is being polled elsewhere. Cheap to clone —
/// it's an `Arc<AtomicBool>` underneath, matching spec §5's "optional abort
/// signal".
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Construction-time configuration (spec §4.I's "options at construction").
pub struct InterpreterOptions {
    pub globals: Vec<Global>,
    pub validator: Option<Box<Validator>>,
    pub security: SecurityOptions,
    pub preset: EsVersion,
    pub resource_limits: Option<crate::resource::ResourceLimits>,
    pub tracer: Box<dyn EvalTracer>,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            globals: Vec::new(),
            validator: None,
            security: SecurityOptions::default(),
            preset: EsVersion::default(),
            resource_limits: None,
            tracer: Box::new(NoopTracer),
        }
    }
}

/// Per-call overrides (spec §4.I: "override constructor values for that
/// call only"). Every field defaults to "no override".
#[derive(Default)]
pub struct CallOptions {
    pub globals: Vec<Global>,
    pub validator: Option<Box<Validator>>,
    pub cancellation: Option<CancellationToken>,
    pub timeout: Option<Duration>,
}

/// One step of `evaluate_steps`: the next top-level statement's node kind
/// and source line, or the program's completion value once `done` is true.
#[derive(Debug, Clone)]
pub struct Step {
    pub kind: &'static str,
    pub line: Option<u32>,
    pub done: bool,
    pub value: Option<Value>,
}

/// Wraps the interpreter's configured tracker with this call's cancellation
/// token and deadline, so both are checked at exactly the points
/// `ResourceTracker` is already consulted (every AST node, every
/// loop-iteration/function-call boundary) without adding a second check
/// site. `tripped_by_deadline` records which reason fired so the caller can
/// report `CancelledError` instead of `ResourceExhaustedError` when that's
/// what actually happened.
struct CallGuard<'a> {
    inner: &'a dyn ResourceTracker,
    cancellation: Option<&'a CancellationToken>,
    deadline: Option<Instant>,
    tripped_by_cancellation: std::cell::Cell<bool>,
}

impl ResourceTracker for CallGuard<'_> {
    fn on_node_evaluated(&self) {
        self.inner.on_node_evaluated();
    }

    fn on_function_call(&self) {
        self.inner.on_function_call();
    }

    fn on_loop_iteration(&self) {
        self.inner.on_loop_iteration();
    }

    fn check_time(&self) -> Result<(), crate::resource::ResourceError> {
        self.check_cancel_and_deadline()?;
        self.inner.check_time()
    }

    fn is_exhausted(&self) -> Option<crate::resource::ResourceError> {
        if let Err(e) = self.check_cancel_and_deadline() {
            return Some(e);
        }
        self.inner.is_exhausted()
    }

    fn stats(&self) -> Stats {
        self.inner.stats()
    }

    fn record_evaluation(&self, entry: HistoryEntry) {
        self.inner.record_evaluation(entry);
    }
}

impl CallGuard<'_> {
    fn check_cancel_and_deadline(&self) -> Result<(), crate::resource::ResourceError> {
        if self.cancellation.is_some_and(CancellationToken::is_cancelled) {
            self.tripped_by_cancellation.set(true);
            return Err(crate::resource::ResourceError { message: "evaluation cancelled".to_string() });
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            self.tripped_by_cancellation.set(true);
            return Err(crate::resource::ResourceError { message: "evaluation timed out".to_string() });
        }
        Ok(())
    }

    /// Remaps a `ResourceExhausted` produced by this guard's own
    /// cancellation/timeout check back into the `CancelledError` kind spec
    /// §7 requires, leaving a genuine tracker-exhaustion error untouched.
    fn remap(&self, err: InterpreterError) -> InterpreterError {
        match err {
            InterpreterError::ResourceExhausted(ResourceExhaustedError { message }) if self.tripped_by_cancellation.get() => {
                InterpreterError::Cancelled(CancelledError { message })
            }
            other => other,
        }
    }
}

/// The sandboxed interpreter. Cheap to construct per script, cheap to reuse
/// across many `evaluate` calls against the same `Interpreter` — persistent
/// user state (top-level `let`/`const`/`var`/function/class bindings) lives
/// in `user_entries` and is rebuilt onto a fresh scope chain at the start of
/// every call (see `scope_for_call`), since per-call globals need to sit
/// *under* that persistent state without ever being saved into it.
pub struct Interpreter {
    builtins_scope: Scope,
    constructor_globals: Vec<Global>,
    default_validator: Option<Box<Validator>>,
    security: SecurityOptions,
    tracker: Box<dyn ResourceTracker>,
    tracer: Box<dyn EvalTracer>,
    user_entries: RefCell<Vec<(Rc<str>, Value, BindingKind)>>,
    call_guard: Mutex<()>,
}

impl Interpreter {
    #[must_use]
    pub fn new(options: InterpreterOptions) -> Self {
        let builtins_scope = Scope::root();
        builtins::register_globals(&builtins_scope, options.preset);
        let tracker: Box<dyn ResourceTracker> = match options.resource_limits {
            Some(limits) => Box::new(LimitedTracker::new(limits)),
            None => Box::new(NoLimitTracker),
        };
        Self {
            builtins_scope,
            constructor_globals: options.globals,
            default_validator: options.validator,
            security: options.security,
            tracker,
            tracer: options.tracer,
            user_entries: RefCell::new(Vec::new()),
            call_guard: Mutex::new(()),
        }
    }

    /// Parses `source` without evaluating it (spec §4.I's `parse`).
    ///
    /// # Errors
    /// Returns [`InterpreterError::Parse`]/[`InterpreterError::Syntax`] for
    /// malformed or unsupported source.
    pub fn parse(&self, source: &str) -> Result<Program, InterpreterError> {
        parse::parse(source)
    }

    /// Builds the scope chain this call evaluates against: builtins →
    /// constructor globals → (optional) per-call globals → persistent user
    /// state copied in fresh. The returned scope is where the program's
    /// top-level statements hoist and declare into.
    fn scope_for_call(&self, call_globals: &[Global]) -> Scope {
        let mut base = self.builtins_scope.child();
        for (name, value) in &self.constructor_globals {
            base.declare(name.clone(), value.clone(), BindingKind::Var);
        }
        if !call_globals.is_empty() {
            let layer = base.child();
            for (name, value) in call_globals {
                layer.declare(name.clone(), value.clone(), BindingKind::Var);
            }
            base = layer;
        }
        let call_scope = base.child();
        for (name, value, kind) in self.user_entries.borrow().iter() {
            call_scope.declare(name.clone(), value.clone(), *kind);
        }
        call_scope
    }

    /// Saves this call's top-level bindings back as persistent user state —
    /// anything declared directly in `call_scope` (never a per-call global,
    /// since those live one layer up and are discarded with `call_scope`).
    fn save_user_state(&self, call_scope: &Scope) {
        *self.user_entries.borrow_mut() = call_scope.own_entries();
    }

    fn run_validator<'a>(&'a self, program: &Program, override_validator: &'a Option<Box<Validator>>) -> Result<(), InterpreterError> {
        let validator = override_validator.as_deref().or(self.default_validator.as_deref());
        validator::validate(validator, program)
    }

    /// Evaluates `source` synchronously and returns the program's
    /// completion value (spec §4.I's `evaluate`).
    ///
    /// # Errors
    /// Any [`InterpreterError`] variant the program's evaluation, parsing,
    /// or validation produced.
    pub fn evaluate(&self, source: &str, options: Option<CallOptions>) -> Result<Value, InterpreterError> {
        let options = options.unwrap_or_default();
        let _serialize = self.call_guard.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.tracker.begin_execution();
        let program = self.parse(source)?;
        self.run_validator(&program, &options.validator)?;

        let guard = CallGuard {
            inner: self.tracker.as_ref(),
            cancellation: options.cancellation.as_ref(),
            deadline: options.timeout.map(|d| Instant::now() + d),
            tripped_by_cancellation: std::cell::Cell::new(false),
        };
        let ctx = EvalContext::new(&self.security, &guard, self.tracer.as_ref());
        let call_scope = self.scope_for_call(&options.globals);
        let started = Instant::now();
        let result = evaluator::eval_program(&program, &call_scope, &ctx);
        self.save_user_state(&call_scope);
        self.tracker.record_evaluation(HistoryEntry {
            nodes_evaluated: guard.stats().nodes_evaluated,
            function_calls: guard.stats().function_calls,
            loop_iterations: guard.stats().loop_iterations,
            elapsed: started.elapsed(),
        });
        result.map_err(|e| guard.remap(e))
    }

    /// Evaluates `source` through the async driver, returning a boxed
    /// future the host polls/drives with its own executor (spec §4.I's
    /// `evaluateAsync`; this crate never runs one of its own). Two
    /// concurrently-polled futures from the same `Interpreter` serialize on
    /// `call_guard` the same way `evaluate` does, honoring cancellation and
    /// timeout while waiting for the lock.
    pub fn evaluate_async<'a>(&'a self, source: &str, options: Option<CallOptions>) -> Pin<Box<dyn Future<Output = Result<Value, InterpreterError>> + 'a>> {
        let options = options.unwrap_or_default();
        Box::pin(async move {
            // Held for the rest of this async block (not just until
            // acquired) so a second `evaluate_async` polled concurrently on
            // the same `Interpreter` genuinely waits out this one, not just
            // the moment of acquisition.
            let _serialize = SerializedCall { interpreter: self, cancellation: options.cancellation.clone(), deadline: options.timeout.map(|d| Instant::now() + d) }
                .await?;
            self.tracker.begin_execution();

            let program = self.parse(source)?;
            self.run_validator(&program, &options.validator)?;

            let guard = CallGuard {
                inner: self.tracker.as_ref(),
                cancellation: options.cancellation.as_ref(),
                deadline: options.timeout.map(|d| Instant::now() + d),
                tripped_by_cancellation: std::cell::Cell::new(false),
            };
            let ctx = EvalContext::new(&self.security, &guard, self.tracer.as_ref());
            let call_scope = self.scope_for_call(&options.globals);
            let started = Instant::now();
            let result = async_driver::eval_program_async(&program, &call_scope, &ctx).await;
            self.save_user_state(&call_scope);
            self.tracker.record_evaluation(HistoryEntry {
                nodes_evaluated: guard.stats().nodes_evaluated,
                function_calls: guard.stats().function_calls,
                loop_iterations: guard.stats().loop_iterations,
                elapsed: started.elapsed(),
            });
            result.map_err(|e| guard.remap(e))
        })
    }

    /// Returns a restartable, lazy step sequence over `source`'s top-level
    /// statements (spec §4.I's `evaluateSteps`). Parses and hoists once up
    /// front; each `.next()` call evaluates exactly one top-level statement.
    ///
    /// # Errors
    /// Parsing or validation failures are returned immediately rather than
    /// through the stepper, since there is nothing to step through yet.
    pub fn evaluate_steps<'a>(&'a self, source: &str, options: Option<CallOptions>) -> Result<EvaluationStepper<'a>, InterpreterError> {
        let options = options.unwrap_or_default();
        self.tracker.begin_execution();
        let program = self.parse(source)?;
        self.run_validator(&program, &options.validator)?;
        let call_scope = self.scope_for_call(&options.globals);
        evaluator::hoist_block(&program.body, &call_scope, &call_scope).map_err(|flow| evaluator::flow_to_interpreter_error(flow, CodeLoc::UNKNOWN))?;
        Ok(EvaluationStepper { interpreter: self, program, scope: call_scope, index: 0, done: false })
    }

    /// Every name visible at top level, builtins through persistent user
    /// state, with its current value (spec §4.I's `getScope`).
    #[must_use]
    pub fn get_scope(&self) -> Vec<(String, Value)> {
        self.scope_for_call(&[]).visible().into_iter().map(|(name, value)| (name.to_string(), value)).collect()
    }

    /// Drops all persistent user-declared bindings; built-ins and
    /// constructor-provided globals are untouched (spec §4.I's
    /// `clearGlobals`, which despite the name clears *user* state, not the
    /// globals).
    pub fn clear_globals(&self) {
        self.user_entries.borrow_mut().clear();
    }

    /// The cumulative counters maintained across every `evaluate`/
    /// `evaluate_async` call on this `Interpreter` (spec §4.I's
    /// `getStats`).
    #[must_use]
    pub fn get_stats(&self) -> Stats {
        self.tracker.stats()
    }
}

/// Resolves to the interpreter's call-guard lock once it's free, checking
/// cancellation/timeout on every poll while it waits — `std::sync::Mutex`
/// holds no real contention here (this crate is single-threaded, `Rc`-based
/// state guarantees that), so `try_lock` plus re-polling via the waker
/// stands in for a proper async mutex without pulling in one more
/// dependency just for this. The caller holds the returned guard for the
/// rest of its async block so a second concurrently-polled `evaluate_async`
/// genuinely waits, not just until the instant this one happened to look.
struct SerializedCall<'a> {
    interpreter: &'a Interpreter,
    cancellation: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl<'a> Future for SerializedCall<'a> {
    type Output = Result<std::sync::MutexGuard<'a, ()>, InterpreterError>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        if self.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Poll::Ready(Err(InterpreterError::Cancelled(CancelledError { message: "evaluation cancelled while waiting".to_string() })));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Poll::Ready(Err(InterpreterError::Cancelled(CancelledError { message: "evaluation timed out while waiting".to_string() })));
        }
        match self.interpreter.call_guard.try_lock() {
            Ok(guard) => Poll::Ready(Ok(guard)),
            Err(_) => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }
}

/// The lazy step sequence `evaluate_steps` returns. `Iterator::next`
/// evaluates exactly one top-level statement per call; the final `Ok(Step)`
/// carries `done: true` and the program's completion value, matching "the
/// final step carrying done=true and the program's completion value".
pub struct EvaluationStepper<'a> {
    interpreter: &'a Interpreter,
    program: Program,
    scope: Scope,
    index: usize,
    done: bool,
}

impl Iterator for EvaluationStepper<'_> {
    type Item = Result<Step, InterpreterError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.index >= self.program.body.len() {
            self.done = true;
            self.interpreter.save_user_state(&self.scope);
            return Some(Ok(Step { kind: "Program", line: None, done: true, value: Some(Value::Undefined) }));
        }

        let stmt: &Statement = &self.program.body[self.index];
        let kind = stmt.kind_name();
        let line = stmt.loc().line;
        let guard = CallGuard { inner: self.interpreter.tracker.as_ref(), cancellation: None, deadline: None, tripped_by_cancellation: std::cell::Cell::new(false) };
        let ctx = EvalContext::new(&self.interpreter.security, &guard, self.interpreter.tracer.as_ref());
        let this = Value::Undefined;
        let result = evaluator::eval_statement(stmt, &self.scope, &self.scope, &this, &ctx);
        self.index += 1;

        let is_last = self.index >= self.program.body.len();
        match result {
            Ok(value) => {
                if is_last {
                    self.done = true;
                    self.interpreter.save_user_state(&self.scope);
                    Some(Ok(Step { kind, line, done: true, value: Some(value) }))
                } else {
                    Some(Ok(Step { kind, line, done: false, value: None }))
                }
            }
            Err(flow) => {
                self.done = true;
                self.interpreter.save_user_state(&self.scope);
                Some(Err(evaluator::flow_to_interpreter_error(flow, stmt.loc())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_arithmetic() {
        let interp = Interpreter::new(InterpreterOptions::default());
        let result = interp.evaluate("1 + 2 * 3", None).unwrap();
        assert_eq!(result.to_number(), 7.0);
    }

    #[test]
    fn user_let_bindings_persist_across_calls() {
        let interp = Interpreter::new(InterpreterOptions::default());
        interp.evaluate("let counter = 1;", None).unwrap();
        let result = interp.evaluate("counter += 1; counter", None).unwrap();
        assert_eq!(result.to_number(), 2.0);
    }

    #[test]
    fn clear_globals_drops_user_state_only() {
        let interp = Interpreter::new(InterpreterOptions::default());
        interp.evaluate("let x = 42;", None).unwrap();
        interp.clear_globals();
        let err = interp.evaluate("x", None).unwrap_err();
        assert_eq!(err.kind_name(), "ReferenceError");
        // Math is a built-in, not user state, so it survives clear_globals.
        assert!(interp.evaluate("typeof Math", None).unwrap().to_js_string().as_ref() == "object");
    }

    #[test]
    fn per_call_globals_do_not_persist() {
        let interp = Interpreter::new(InterpreterOptions::default());
        let opts = CallOptions { globals: vec![("injected".to_string(), Value::Number(5.0))], ..Default::default() };
        assert_eq!(interp.evaluate("injected", Some(opts)).unwrap().to_number(), 5.0);
        let err = interp.evaluate("injected", None).unwrap_err();
        assert_eq!(err.kind_name(), "ReferenceError");
    }

    #[test]
    fn evaluate_steps_reports_each_top_level_statement() {
        let interp = Interpreter::new(InterpreterOptions::default());
        let mut steps = interp.evaluate_steps("let a = 1; let b = 2; a + b", None).unwrap();
        let first = steps.next().unwrap().unwrap();
        assert_eq!(first.kind, "VariableDeclaration");
        assert!(!first.done);
        let second = steps.next().unwrap().unwrap();
        assert!(!second.done);
        let third = steps.next().unwrap().unwrap();
        assert!(third.done);
        assert_eq!(third.value.unwrap().to_number(), 3.0);
        assert!(steps.next().is_none());
    }

    #[test]
    fn validator_rejection_short_circuits_evaluation() {
        let mut options = InterpreterOptions::default();
        options.validator = Some(Box::new(|_program: &Program| Ok(false)));
        let interp = Interpreter::new(options);
        let err = interp.evaluate("1 + 1", None).unwrap_err();
        assert_eq!(err.kind_name(), "ValidationError");
    }

    #[test]
    fn cancellation_token_aborts_evaluation() {
        let interp = Interpreter::new(InterpreterOptions::default());
        let token = CancellationToken::new();
        token.cancel();
        let opts = CallOptions { cancellation: Some(token), ..Default::default() };
        let err = interp.evaluate("1 + 1", Some(opts)).unwrap_err();
        assert_eq!(err.kind_name(), "CancelledError");
    }
}
