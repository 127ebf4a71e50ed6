//! The built-ins catalog (component G): one file per namespace, registered
//! into the global scope according to an [`preset::EsVersion`] selector.
//!
//! Every builtin goes through the same security boundary (component C) a
//! host-injected global does — a namespace (`Math`, `JSON`, `Object`,
//! `Array`'s static side) is a read-only [`Value::Host`] proxy built by
//! [`host_namespace`], and a constructor (`Date`, `Map`, `Set`, `RegExp`,
//! `Promise`, `Number`, `String`, `Symbol`) is a `HostCallable` whose `call`/
//! `construct` produces a fresh `HostObject` instance exposed the same way a
//! host-returned object would be. Nothing here reaches into the evaluator's
//! internals beyond what `HostCallCtx` already exposes.

pub mod array_ns;
pub mod date;
pub mod error_ns;
pub mod json;
pub mod math;
pub mod number_ns;
pub mod object_ns;
pub mod preset;
pub mod promise;
pub mod regexp;
pub mod set_map;
pub mod string_ns;
pub mod symbol_ns;

use std::rc::Rc;

use crate::environment::{BindingKind, Scope};
use crate::security::{HostCallCtx, HostKind, HostObject, HostResult};
use crate::value::Value;

pub use preset::EsVersion;

type Entries = Vec<(&'static str, usize, Box<dyn Fn(&[Value], &dyn HostCallCtx) -> Result<HostResult, String>>)>;

/// A read-only namespace (`Math`, `JSON`, `Object`, `Array`'s static side):
/// several named functions plus optional constant data properties, none of
/// it callable as `Namespace(...)` itself (unlike `Number`/`String`, which
/// need `HostCallable`'s `call` slot instead — see those modules). Dispatch
/// goes through `invoke` the same way `Map`/`Set` instance methods do;
/// `handle` hands back a fresh `Rc` over the same shared entry table rather
/// than a self-referential one, the same trick `SandboxMap::self_rc` uses.
struct NativeNamespace {
    consts: Vec<(&'static str, Value)>,
    entries: Rc<Entries>,
}

impl NativeNamespace {
    fn handle(&self) -> Rc<dyn HostObject> {
        Rc::new(NativeNamespace { consts: self.consts.clone(), entries: self.entries.clone() })
    }
}

impl HostObject for NativeNamespace {
    fn kind(&self) -> HostKind {
        HostKind::Object
    }

    fn get_own(&self, name: &str) -> Option<HostResult> {
        if let Some((_, value)) = self.consts.iter().find(|(n, _)| *n == name) {
            return Some(HostResult::Scalar(value.clone()));
        }
        self.entries.iter().any(|(n, _, _)| *n == name).then(|| HostResult::Function { object: self.handle(), name: name.to_string() })
    }

    fn invoke(&self, name: &str, args: Vec<Value>, ctx: &dyn HostCallCtx) -> Result<HostResult, String> {
        match self.entries.iter().find(|(n, _, _)| *n == name) {
            Some((_, _, f)) => f(&args, ctx),
            None => Err(format!("'{name}' is not a function")),
        }
    }
}

/// Wraps `entries` (plus optional constant properties) as a `Value::Host`
/// proxy at `display_path`, so property writes on the result go through the
/// same rejection every other host-proxied value gets (`Math.PI = 3` fails
/// `SecurityError` instead of silently succeeding the way writing to a plain
/// sandbox object would).
fn host_namespace(display_path: &'static str, consts: Vec<(&'static str, Value)>, entries: Entries) -> Value {
    let namespace = NativeNamespace { consts, entries: Rc::new(entries) };
    Value::Host(Rc::new(crate::security::HostValue::root(Rc::new(namespace), display_path)))
}

/// Registers every builtin the given [`EsVersion`] preset exposes as a
/// `var` binding in `scope` (spec §4.I's "built-ins exposed by default").
/// Constructor-provided globals and user code both declare into the same
/// scope afterwards; `Interpreter::clear_globals` never touches bindings
/// this function creates (see `interpreter.rs`).
pub fn register_globals(scope: &Scope, version: EsVersion) {
    scope.declare("Math", math::namespace(), BindingKind::Var);
    scope.declare("JSON", json::namespace(), BindingKind::Var);
    scope.declare("Object", object_ns::namespace(), BindingKind::Var);
    scope.declare("Array", array_ns::namespace(), BindingKind::Var);
    scope.declare("Number", number_ns::namespace(), BindingKind::Var);
    scope.declare("String", string_ns::namespace(), BindingKind::Var);
    scope.declare("Symbol", symbol_ns::namespace(), BindingKind::Var);
    scope.declare("Error", error_ns::constructor("Error"), BindingKind::Var);
    if version.at_least(EsVersion::Es2015) {
        scope.declare("Map", set_map::map_constructor(), BindingKind::Var);
        scope.declare("Set", set_map::set_constructor(), BindingKind::Var);
        scope.declare("Promise", promise::namespace_and_constructor(), BindingKind::Var);
        for name in ["TypeError", "RangeError", "SyntaxError", "ReferenceError"] {
            scope.declare(name, error_ns::constructor(name), BindingKind::Var);
        }
    }
    scope.declare("Date", date::constructor(), BindingKind::Var);
    scope.declare("RegExp", regexp::constructor(), BindingKind::Var);
}
