//! `Promise`: `new Promise(executor)`, `resolve`/`reject`/`all`/`race`/
//! `allSettled`/`withResolvers`.
//!
//! A `Value::Promise` is the one sandbox value this catalog produces that
//! isn't a host proxy (see [`crate::security::HostObject::construct_as_value`]),
//! since [`crate::async_driver::PromiseLike`] is polled directly by the async
//! driver rather than read through the property-gate machinery the rest of
//! the builtins use. Settlement here is always either immediate (the
//! executor ran synchronously and already called `resolve`/`reject`) or
//! driven by polling nested promises — there is no event loop or timer
//! queue, matching the single-threaded cooperative model the rest of the
//! async driver assumes.

use std::cell::RefCell;
use std::rc::Rc;
use std::task::{Context as TaskContext, Poll};

use crate::async_driver::PromiseLike;
use crate::error::{CodeLoc, HostCallError, InterpreterError};
use crate::security::{CallableKind, CallableTarget, HostCallCtx, HostKind, HostObject, HostResult};
use crate::value::{JsObject, Value};

struct Deferred {
    state: RefCell<Option<Result<Value, InterpreterError>>>,
}

impl Deferred {
    fn pending() -> Rc<Self> {
        Rc::new(Self { state: RefCell::new(None) })
    }

    fn settled(result: Result<Value, InterpreterError>) -> Rc<Self> {
        Rc::new(Self { state: RefCell::new(Some(result)) })
    }
}

impl PromiseLike for Deferred {
    fn poll_promise(&self, _cx: &mut TaskContext<'_>) -> Poll<Result<Value, InterpreterError>> {
        match self.state.borrow().clone() {
            Some(result) => Poll::Ready(result),
            None => Poll::Pending,
        }
    }
}

/// Stringifies a rejection value into a catchable `HostCallError` — the
/// only `InterpreterError` kind this crate's `try`/`catch` recognizes that
/// doesn't require the rejection to already be an `Error`-shaped object.
/// Loses structure for a rejection with a rich value; documented as a known
/// simplification rather than threading a new catchable-throw-of-arbitrary-
/// value path through the async driver for this one case.
fn rejection(value: &Value) -> InterpreterError {
    InterpreterError::HostCall(HostCallError { message: value.to_js_string().to_string(), loc: CodeLoc::UNKNOWN })
}

fn resolved(value: Value) -> Value {
    if matches!(value, Value::Promise(_)) {
        value
    } else {
        Value::Promise(Deferred::settled(Ok(value)))
    }
}

struct Settle {
    target: Rc<Deferred>,
    reject: bool,
}

impl HostObject for Settle {
    fn kind(&self) -> HostKind {
        HostKind::Function
    }

    fn get_own(&self, _name: &str) -> Option<HostResult> {
        None
    }

    fn call(&self, args: Vec<Value>, _ctx: &dyn HostCallCtx) -> Result<HostResult, String> {
        let value = args.into_iter().next().unwrap_or(Value::Undefined);
        let mut state = self.target.state.borrow_mut();
        if state.is_none() {
            *state = Some(if self.reject { Err(rejection(&value)) } else { Ok(value) });
        }
        Ok(HostResult::Scalar(Value::Undefined))
    }
}

fn settle_callable(target: &Rc<Deferred>, reject: bool, name: &str) -> Value {
    Value::HostCallable(Rc::new(crate::security::HostCallable {
        kind: CallableKind::Function,
        name: name.to_string(),
        arity: Some(1),
        target: CallableTarget::Standalone(Rc::new(Settle { target: target.clone(), reject })),
    }))
}

fn as_promise_like(value: &Value) -> Rc<dyn PromiseLike> {
    match value {
        Value::Promise(p) => p.clone(),
        other => Deferred::settled(Ok(other.clone())),
    }
}

/// `Promise.all`: resolves with an array of results once every input has
/// resolved, or rejects with the first rejection observed.
struct AllCombinator {
    inputs: Vec<Rc<dyn PromiseLike>>,
    slots: RefCell<Vec<Option<Value>>>,
}

impl PromiseLike for AllCombinator {
    fn poll_promise(&self, cx: &mut TaskContext<'_>) -> Poll<Result<Value, InterpreterError>> {
        let mut slots = self.slots.borrow_mut();
        for (i, input) in self.inputs.iter().enumerate() {
            if slots[i].is_some() {
                continue;
            }
            match input.poll_promise(cx) {
                Poll::Ready(Ok(v)) => slots[i] = Some(v),
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }
        Poll::Ready(Ok(Value::array(slots.iter().cloned().map(|v| v.unwrap_or(Value::Undefined)).collect())))
    }
}

/// `Promise.race`: settles with whichever input settles first.
struct RaceCombinator {
    inputs: Vec<Rc<dyn PromiseLike>>,
}

impl PromiseLike for RaceCombinator {
    fn poll_promise(&self, cx: &mut TaskContext<'_>) -> Poll<Result<Value, InterpreterError>> {
        for input in &self.inputs {
            if let Poll::Ready(result) = input.poll_promise(cx) {
                return Poll::Ready(result);
            }
        }
        Poll::Pending
    }
}

/// `Promise.allSettled`: never rejects; each slot becomes a `{status,
/// value}` or `{status, reason}` record once its input settles.
struct AllSettledCombinator {
    inputs: Vec<Rc<dyn PromiseLike>>,
    slots: RefCell<Vec<Option<Value>>>,
}

impl PromiseLike for AllSettledCombinator {
    fn poll_promise(&self, cx: &mut TaskContext<'_>) -> Poll<Result<Value, InterpreterError>> {
        let mut slots = self.slots.borrow_mut();
        for (i, input) in self.inputs.iter().enumerate() {
            if slots[i].is_some() {
                continue;
            }
            match input.poll_promise(cx) {
                Poll::Ready(Ok(v)) => {
                    let mut record = JsObject::new();
                    record.set_data("status", Value::string("fulfilled"));
                    record.set_data("value", v);
                    slots[i] = Some(Value::object(record));
                }
                Poll::Ready(Err(e)) => {
                    let mut record = JsObject::new();
                    record.set_data("status", Value::string("rejected"));
                    record.set_data("reason", Value::string(e.message()));
                    slots[i] = Some(Value::object(record));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
        Poll::Ready(Ok(Value::array(slots.iter().cloned().map(|v| v.unwrap_or(Value::Undefined)).collect())))
    }
}

fn input_list(args: &[Value]) -> Vec<Rc<dyn PromiseLike>> {
    match args.first() {
        Some(Value::Array(items)) => items.borrow().iter().map(as_promise_like).collect(),
        _ => Vec::new(),
    }
}

struct PromiseConstructor;

impl PromiseConstructor {
    const STATICS: &'static [&'static str] = &["resolve", "reject", "all", "race", "allSettled", "withResolvers"];
}

impl HostObject for PromiseConstructor {
    fn kind(&self) -> HostKind {
        HostKind::Function
    }

    fn get_own(&self, _name: &str) -> Option<HostResult> {
        None
    }

    fn static_methods(&self) -> &'static [&'static str] {
        Self::STATICS
    }

    fn invoke(&self, name: &str, args: Vec<Value>, ctx: &dyn HostCallCtx) -> Result<HostResult, String> {
        let _ = ctx;
        match name {
            "resolve" => Ok(HostResult::Scalar(resolved(args.into_iter().next().unwrap_or(Value::Undefined)))),
            "reject" => {
                let value = args.into_iter().next().unwrap_or(Value::Undefined);
                Ok(HostResult::Scalar(Value::Promise(Deferred::settled(Err(rejection(&value))))))
            }
            "all" => Ok(HostResult::Scalar(Value::Promise(Rc::new(AllCombinator {
                slots: RefCell::new(vec![None; input_list(&args).len()]),
                inputs: input_list(&args),
            })))),
            "race" => Ok(HostResult::Scalar(Value::Promise(Rc::new(RaceCombinator { inputs: input_list(&args) })))),
            "allSettled" => Ok(HostResult::Scalar(Value::Promise(Rc::new(AllSettledCombinator {
                slots: RefCell::new(vec![None; input_list(&args).len()]),
                inputs: input_list(&args),
            })))),
            "withResolvers" => {
                let deferred = Deferred::pending();
                let mut obj = JsObject::new();
                obj.set_data("promise", Value::Promise(deferred.clone()));
                obj.set_data("resolve", settle_callable(&deferred, false, "resolve"));
                obj.set_data("reject", settle_callable(&deferred, true, "reject"));
                Ok(HostResult::Scalar(Value::object(obj)))
            }
            _ => Err(format!("'{name}' is not a function")),
        }
    }

    fn construct_as_value(&self, args: Vec<Value>, ctx: &dyn HostCallCtx) -> Option<Result<Value, String>> {
        let Some(Value::Function(executor)) = args.first().cloned() else {
            return Some(Err("Promise resolver is not a function".to_string()));
        };
        let deferred = Deferred::pending();
        let resolve = settle_callable(&deferred, false, "resolve");
        let reject = settle_callable(&deferred, true, "reject");
        if let Err(e) = ctx.call_sandbox_function(&executor, vec![resolve, reject]) {
            let mut state = deferred.state.borrow_mut();
            if state.is_none() {
                *state = Some(Err(e));
            }
        }
        Some(Ok(Value::Promise(deferred)))
    }
}

pub fn namespace_and_constructor() -> Value {
    Value::HostCallable(Rc::new(crate::security::HostCallable {
        kind: CallableKind::Constructor,
        name: "Promise".to_string(),
        arity: Some(1),
        target: CallableTarget::Standalone(Rc::new(PromiseConstructor)),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::task::{RawWaker, RawWakerVTable, Waker};

    fn noop_waker() -> Waker {
        fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(std::ptr::null(), &VTABLE)
        }
        fn noop(_: *const ()) {}
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
    }

    #[test]
    fn all_combinator_resolves_once_every_input_is_ready() {
        let inputs: Vec<Rc<dyn PromiseLike>> = vec![
            Deferred::settled(Ok(Value::Number(1.0))),
            Deferred::settled(Ok(Value::Number(2.0))),
        ];
        let combinator = AllCombinator { slots: RefCell::new(vec![None; inputs.len()]), inputs };
        let waker = noop_waker();
        let mut cx = TaskContext::from_waker(&waker);
        match combinator.poll_promise(&mut cx) {
            Poll::Ready(Ok(Value::Array(items))) => assert_eq!(items.borrow().len(), 2),
            other => panic!("expected resolved array, got {other:?}"),
        }
    }

    #[test]
    fn race_combinator_takes_the_first_settled() {
        let inputs: Vec<Rc<dyn PromiseLike>> = vec![Deferred::pending(), Deferred::settled(Ok(Value::Number(9.0)))];
        let combinator = RaceCombinator { inputs };
        let waker = noop_waker();
        let mut cx = TaskContext::from_waker(&waker);
        match combinator.poll_promise(&mut cx) {
            Poll::Ready(Ok(Value::Number(n))) => assert_eq!(n, 9.0),
            other => panic!("expected a settled number, got {other:?}"),
        }
    }
}
