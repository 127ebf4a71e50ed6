//! Black-box coverage of the documented invariants and literal scenarios,
//! driven entirely through the public API (`sandboxed_js::Interpreter` and
//! friends) rather than any internal module.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use pretty_assertions::assert_eq;
use sandboxed_js::ast::Program;
use sandboxed_js::{CallOptions, CancellationToken, Global, Interpreter, InterpreterOptions, PropertyDescriptor, ResourceLimits, Value};

/// Polls a future to completion with a no-op waker. Every async path this
/// crate drives resolves without real suspension (see `async_driver`'s own
/// tests), so busy-polling here never spins for long.
fn block_on<T>(mut fut: Pin<Box<dyn Future<Output = T>>>) -> T {
    fn noop(_: *const ()) {}
    fn clone(_: *const ()) -> RawWaker {
        RawWaker::new(std::ptr::null(), &VTABLE)
    }
    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
    let waker = unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) };
    let mut cx = Context::from_waker(&waker);
    loop {
        if let Poll::Ready(v) = fut.as_mut().poll(&mut cx) {
            return v;
        }
    }
}

fn eval(src: &str) -> Value {
    Interpreter::new(InterpreterOptions::default()).evaluate(src, None).unwrap()
}

fn is_true(v: &Value) -> bool {
    matches!(v, Value::Boolean(true))
}

fn data_value(obj: &sandboxed_js::JsObject, key: &str) -> Option<Value> {
    match obj.get(key) {
        Some(PropertyDescriptor::Data { value, .. }) => Some(value.clone()),
        _ => None,
    }
}

// --- Scenarios (spec §8) --------------------------------------------------

#[test]
fn scenario_1_curried_arrow_functions() {
    assert_eq!(eval("let f = x => y => x + y; f(10)(5)").to_number(), 15.0);
}

#[test]
fn scenario_2_recursive_factorial() {
    assert_eq!(eval("function fact(n){return n<=1?1:n*fact(n-1);} fact(6)").to_number(), 720.0);
}

#[test]
fn scenario_3_method_mutates_its_own_this() {
    let result = eval("let c = { n: 0, inc(){ this.n += 1; return this.n; } }; c.inc(); c.inc(); c.inc()");
    assert_eq!(result.to_number(), 3.0);
}

#[test]
fn scenario_4_finally_runs_before_the_outer_catch_sees_the_throw() {
    let result = eval(r#"try { try { throw "e"; } finally { } } catch(e){ String(e).indexOf("e")>=0 }"#);
    assert!(is_true(&result));
}

#[test]
fn scenario_5_writing_to_math_is_a_security_error() {
    let interp = Interpreter::new(InterpreterOptions::default());
    let err = interp.evaluate("Math.PI = 3", None).unwrap_err();
    assert_eq!(err.kind_name(), "SecurityError");
}

#[test]
fn scenario_6_validator_rejects_while_but_allows_plain_arithmetic() {
    let mut options = InterpreterOptions::default();
    options.validator = Some(Box::new(|program: &Program| Ok(!program.body.iter().any(|s| s.kind_name() == "WhileStatement"))));
    let interp = Interpreter::new(options);

    let err = interp.evaluate("while (false) {}", None).unwrap_err();
    assert_eq!(err.kind_name(), "ValidationError");

    assert_eq!(interp.evaluate("5+10", None).unwrap().to_number(), 15.0);
}

#[test]
fn scenario_7_async_functions_combine_without_an_explicit_await() {
    let interp = Interpreter::new(InterpreterOptions::default());
    let fut = interp.evaluate_async("let asyncDouble = async x=>x*2; asyncDouble(5)+asyncDouble(10);", None);
    let result = block_on(fut).unwrap();
    assert_eq!(result.to_number(), 30.0);
}

#[test]
fn scenario_8_array_and_object_rest_destructuring() {
    let rest = eval("let [a,...r] = [1,2,3,4]; r");
    let Value::Array(items) = rest else { panic!("expected array") };
    assert_eq!(items.borrow().iter().map(Value::to_number).collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);

    let obj_rest = eval("let {x,...rest}={x:1,y:2,z:3}; rest");
    let Value::Object(obj) = obj_rest else { panic!("expected object") };
    let obj = obj.borrow();
    assert!(data_value(&obj, "x").is_none());
    assert_eq!(data_value(&obj, "y").unwrap().to_number(), 2.0);
    assert_eq!(data_value(&obj, "z").unwrap().to_number(), 3.0);
}

#[test]
fn scenario_9_private_class_fields_accumulate_across_calls() {
    let result = eval("class Counter { #n=0; add(v){ this.#n+=v; return this.#n; } } let c=new Counter(); c.add(5); c.add(10)");
    assert_eq!(result.to_number(), 15.0);
}

#[test]
fn scenario_10_for_await_of_drains_an_async_generator() {
    let interp = Interpreter::new(InterpreterOptions::default());
    let src = "async function*g(){yield 1;yield 2;} async function r(){let s=0; for await(const v of g()) s+=v; return s;} r()";
    let result = block_on(interp.evaluate_async(src, None)).unwrap();
    assert_eq!(result.to_number(), 3.0);
}

// --- Invariants (spec §8) --------------------------------------------------

#[test]
fn i1_forbidden_properties_are_rejected_via_dot_bracket_and_concatenated_keys() {
    let interp = Interpreter::new(InterpreterOptions::default());
    for src in [
        "let o = {}; o.__proto__",
        "let o = {}; o['constructor']",
        "let o = {}; let k = '__pro' + 'to__'; o[k]",
        "let o = {}; o.prototype = 1",
    ] {
        let err = interp.evaluate(src, None).unwrap_err();
        assert_eq!(err.kind_name(), "SecurityError", "expected SecurityError for `{src}`");
    }
}

#[test]
fn i2_host_proxied_values_reject_every_mutation() {
    let interp = Interpreter::new(InterpreterOptions::default());
    assert_eq!(interp.evaluate("Math.PI = 3", None).unwrap_err().kind_name(), "SecurityError");
    assert_eq!(interp.evaluate("delete Math.PI", None).unwrap_err().kind_name(), "SecurityError");
    assert_eq!(interp.evaluate("JSON.parse = null", None).unwrap_err().kind_name(), "SecurityError");
}

#[test]
fn i3_reassigning_a_const_binding_is_a_type_error() {
    let err = Interpreter::new(InterpreterOptions::default()).evaluate("const x = 1; x = 2;", None).unwrap_err();
    assert_eq!(err.kind_name(), "TypeError");
}

#[test]
fn i4_finally_runs_on_every_exit_path() {
    let interp = Interpreter::new(InterpreterOptions::default());

    // Exception path.
    let threw = eval("let ran = false; try { try { throw 1; } finally { ran = true; } } catch(e) {} ran");
    assert!(is_true(&threw));

    // Return path: `finally` still runs even though the try block returns.
    let result = interp.evaluate("let log = []; function f(){ try { return 1; } finally { log.push('f'); } } f(); log.length", None).unwrap();
    assert_eq!(result.to_number(), 1.0);

    // An abnormal completion inside `finally` overrides the try block's own.
    let overridden = eval("function f(){ try { return 1; } finally { return 2; } } f()");
    assert_eq!(overridden.to_number(), 2.0);
}

#[test]
fn i5_for_let_binds_a_fresh_variable_per_iteration() {
    let result = eval("let fns = []; for (let i = 0; i < 3; i++) { fns.push(() => i); } fns.map(f => f())");
    let Value::Array(items) = result else { panic!("expected array") };
    assert_eq!(items.borrow().iter().map(Value::to_number).collect::<Vec<_>>(), vec![0.0, 1.0, 2.0]);
}

#[test]
fn i6_typeof_on_an_undeclared_identifier_never_throws() {
    assert_eq!(eval("typeof neverDeclared").to_js_string().as_ref(), "undefined");
}

#[test]
fn i7_catch_without_a_binding_still_handles_the_throw() {
    let result = eval("let handled = false; try { throw 'x'; } catch { handled = true; } handled");
    assert!(is_true(&result));
}

#[test]
fn i8_evaluating_the_same_source_twice_is_deterministic() {
    let src = "function fib(n){ return n < 2 ? n : fib(n-1)+fib(n-2); } fib(10)";
    let first = eval(src);
    let second = eval(src);
    assert_eq!(first.to_number(), second.to_number());
}

#[test]
fn i9_cumulative_resource_limit_trips_on_a_later_call_even_though_each_call_alone_is_within_it() {
    let options = InterpreterOptions { resource_limits: Some(ResourceLimits { max_total_iterations: Some(5), ..Default::default() }), ..InterpreterOptions::default() };
    let interp = Interpreter::new(options);
    let three_iterations = "for (let i = 0; i < 3; i++) {}";

    interp.evaluate(three_iterations, None).unwrap();
    let err = interp.evaluate(three_iterations, None).unwrap_err();
    assert_eq!(err.kind_name(), "ResourceExhaustedError");
}

#[test]
fn i10_per_call_globals_vanish_but_user_bindings_persist() {
    let interp = Interpreter::new(InterpreterOptions::default());
    let injected: Global = ("injected".to_string(), Value::Number(5.0));
    let opts = CallOptions { globals: vec![injected], ..Default::default() };
    assert_eq!(interp.evaluate("let kept = injected; kept", Some(opts)).unwrap().to_number(), 5.0);

    let err = interp.evaluate("injected", None).unwrap_err();
    assert_eq!(err.kind_name(), "ReferenceError");
    assert_eq!(interp.evaluate("kept", None).unwrap().to_number(), 5.0);
}

#[test]
fn max_total_memory_rejects_an_unboundedly_growing_array() {
    let options = InterpreterOptions { resource_limits: Some(ResourceLimits { max_total_memory: Some(512), ..Default::default() }), ..InterpreterOptions::default() };
    let interp = Interpreter::new(options);
    let err = interp.evaluate("let a = []; for (let i = 0; i < 1000; i++) { a.push(i); a = [...a]; }", None).unwrap_err();
    assert_eq!(err.kind_name(), "ResourceExhaustedError");
}

#[test]
fn derived_field_initializer_sees_a_value_the_base_constructor_set_on_this() {
    let result = eval(
        r"
        class Base {
            constructor() { this.fromBase = 10; }
        }
        class Derived extends Base {
            doubled = this.fromBase * 2;
            constructor() { super(); }
        }
        new Derived().doubled
        ",
    );
    assert_eq!(result.to_number(), 20.0);
}

#[test]
fn base_class_field_initializes_before_its_constructor_body_runs() {
    let result = eval(
        r"
        class Base {
            seen = this.setByCtor;
            constructor() { this.setByCtor = 'too late'; }
        }
        typeof new Base().seen
        ",
    );
    assert_eq!(result.to_js_string().as_ref(), "undefined");
}

#[test]
fn for_of_drains_a_host_proxied_set_and_map() {
    let result = eval("let s = new Set([1,2,3]); let total = 0; for (const v of s) { total += v; } total");
    assert_eq!(result.to_number(), 6.0);

    let result = eval("let m = new Map([['a',1],['b',2]]); let keys = ''; for (const [k,v] of m) { keys += k + v; } keys");
    assert_eq!(result.to_js_string().as_ref(), "a1b2");
}

#[test]
fn spreading_a_host_proxied_set_yields_a_plain_array() {
    let result = eval("[...new Set([1,2,2,3])]");
    let Value::Array(items) = result else { panic!("expected array") };
    assert_eq!(items.borrow().iter().map(Value::to_number).collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
}

#[test]
fn cancellation_token_aborts_a_running_evaluation() {
    let interp = Interpreter::new(InterpreterOptions::default());
    let token = CancellationToken::new();
    token.cancel();
    let opts = CallOptions { cancellation: Some(token), ..Default::default() };
    let err = interp.evaluate("1 + 1", Some(opts)).unwrap_err();
    assert_eq!(err.kind_name(), "CancelledError");
}
