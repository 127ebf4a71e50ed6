//! The host-boundary security layer (component C): the property-name gate,
//! the read-only host proxy, and the native-method allow-lists.
//!
//! Grounded on the teacher's capability model (`capability.rs`): a small set
//! of static allow-lists checked before any host-observable effect, never
//! escalated at runtime, with a dedicated error type for the denial path.
//! Where the teacher gates *external function calls* by name, this module
//! gates *property names and inherited methods* — the shape of the check is
//! the same "static table, checked at the boundary" discipline.

use std::fmt;
use std::rc::Rc;

use crate::callable::SandboxFunction;
use crate::error::{CodeLoc, InterpreterError};
use crate::value::Value;

/// Rejected by name on sandbox-authored objects and on host proxies
/// (invariant I1, I2). `.length`/`.description` are not in this set, so
/// they are never blocked; `toString`/`valueOf` are in the set — they can
/// still be reached through the delegated native-method path below, which
/// does not consult this gate at all.
pub const FORBIDDEN_PROPERTIES: &[&str] = &[
    "__proto__",
    "constructor",
    "prototype",
    "__defineGetter__",
    "__defineSetter__",
    "__lookupGetter__",
    "__lookupSetter__",
    "valueOf",
    "toString",
    "call",
    "apply",
    "bind",
    "toLocaleString",
];

/// What kind of target a property-name check is guarding, purely for
/// callers that want a tailored message; the gate itself applies uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyTarget {
    SandboxObject,
    SandboxArray,
    SandboxInstance,
    Host,
}

/// `check_property(name, context)` from the design — fails on every name in
/// [`FORBIDDEN_PROPERTIES`] regardless of target kind. Symbol-valued keys
/// never reach this function: the evaluator rejects them before computing a
/// property name (there is no `Value::Symbol`; only `.description` on the
/// one host `Symbol` kind is reachable, via the native-method path).
pub fn check_property_name(name: &str, target: PropertyTarget, loc: CodeLoc) -> Result<(), InterpreterError> {
    if FORBIDDEN_PROPERTIES.contains(&name) {
        let _ = target;
        return Err(InterpreterError::security(
            format!("Property name '{name}' is not allowed for security reasons"),
            loc,
        ));
    }
    Ok(())
}

/// `security` construction option from spec §4.I.
#[derive(Debug, Clone)]
pub struct SecurityOptions {
    pub hide_host_error_messages: bool,
}

impl Default for SecurityOptions {
    fn default() -> Self {
        Self { hide_host_error_messages: true }
    }
}

/// Every mutation of a host-proxied value is denied outright (invariant I2)
/// — there is no allow-list for writes, only for reads and calls.
pub fn host_mutation_denied(path: &str, property: &str, loc: CodeLoc) -> InterpreterError {
    InterpreterError::security(format!("Cannot modify property '{property}' on global '{path}'"), loc)
}

/// The host-value kind a [`HostObject`] presents as, used to pick the right
/// native-method allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    String,
    Array,
    Number,
    Boolean,
    Symbol,
    Date,
    Map,
    Set,
    RegExp,
    Error,
    Object,
    Function,
}

fn allow_list_for(kind: HostKind) -> &'static [&'static str] {
    match kind {
        HostKind::String => &[
            "at", "charAt", "charCodeAt", "codePointAt", "concat", "includes", "indexOf", "lastIndexOf", "slice",
            "substring", "substr", "toLowerCase", "toUpperCase", "trim", "trimStart", "trimEnd", "split", "replace",
            "replaceAll", "startsWith", "endsWith", "padStart", "padEnd", "repeat", "search", "match", "matchAll",
            "normalize", "localeCompare",
        ],
        HostKind::Array => &[
            "push", "pop", "shift", "unshift", "slice", "concat", "join", "indexOf", "lastIndexOf", "includes",
            "reverse", "sort", "map", "filter", "reduce", "reduceRight", "forEach", "every", "some", "find",
            "findIndex", "findLast", "findLastIndex", "flat", "flatMap", "at", "fill", "splice", "copyWithin",
            "toReversed", "toSorted", "toSpliced", "with",
        ],
        HostKind::Number => &["toFixed", "toString"],
        HostKind::Symbol => &[],
        HostKind::Date => &[
            "getTime", "getFullYear", "getMonth", "getDate", "getDay", "getHours", "getMinutes", "getSeconds",
            "getMilliseconds", "getTimezoneOffset", "getUTCFullYear", "getUTCMonth", "getUTCDate", "getUTCDay",
            "getUTCHours", "getUTCMinutes", "getUTCSeconds", "getUTCMilliseconds", "toISOString", "toJSON",
            "toDateString", "toTimeString", "valueOf",
        ],
        HostKind::Map => &["get", "set", "has", "delete", "clear", "forEach", "keys", "values", "entries"],
        HostKind::Set => &["add", "has", "delete", "clear", "forEach", "keys", "values", "entries"],
        HostKind::RegExp => &["test", "exec"],
        HostKind::Boolean | HostKind::Error | HostKind::Object | HostKind::Function => &[],
    }
}

/// `length` is always reachable on strings/arrays even though it's a plain
/// property read, not a method call — it never goes through
/// [`check_property_name`] at all (it isn't in the forbidden set), so there
/// is nothing to special-case here; this helper exists for the native-method
/// dispatch path, where `.length` is requested the same way a method is.
#[must_use]
pub fn is_allowed_inherited_method(kind: HostKind, name: &str) -> bool {
    allow_list_for(kind).contains(&name) || (name == "length" && matches!(kind, HostKind::String | HostKind::Array))
}

/// The raw shape of a value as a [`HostObject`] implementation produced it,
/// before the boundary decides how to wrap it for the sandbox to see.
pub enum HostResult {
    /// A primitive: passes through unchanged.
    Scalar(Value),
    /// `name` on `object` is itself invocable — becomes a method-bound
    /// `HostCallable` rather than a nested proxy.
    Function { object: Rc<dyn HostObject>, name: String },
    /// A nested host object/array — wrapped as a fresh proxy one level
    /// deeper than its parent.
    Nested(Rc<dyn HostObject>),
}

/// Callback surface the evaluator provides to [`HostObject`] implementations
/// so a host function can invoke a sandbox function passed to it as an
/// argument (e.g. `hostArray.forEach(sandboxFn)`), without `HostObject`
/// needing to know anything about the evaluator itself.
pub trait HostCallCtx {
    fn call_sandbox_function(&self, f: &SandboxFunction, args: Vec<Value>) -> Result<Value, InterpreterError>;
}

/// The interface a host implements for every value it exposes to the
/// sandbox (spec §9's "read-only proxy is an interface abstraction"). All
/// default method implementations deny the corresponding operation.
pub trait HostObject {
    fn kind(&self) -> HostKind;

    /// Looks up an **own** key without consulting the allow-list (own keys
    /// are always readable; the allow-list only governs *inherited*
    /// methods reached through [`HostObject::invoke`]).
    fn get_own(&self, name: &str) -> Option<HostResult>;

    fn has_own(&self, name: &str) -> bool {
        self.get_own(name).is_some()
    }

    fn own_keys(&self) -> Vec<String> {
        Vec::new()
    }

    /// Drains this value as a `for...of`/spread source, the boundary's
    /// stand-in for a `Symbol.iterator` protocol: every produced element is
    /// an ordinary, already-owned `Value` (a plain sandbox array/object, not
    /// a nested host proxy), the same way `Map`/`Set`'s own `"keys"`/
    /// `"values"`/`"entries"` methods hand back plain arrays through
    /// `HostObject::invoke` rather than wrapping them again. `Err` means
    /// "not iterable", matching how every other non-iterable value fails
    /// here.
    fn iterate(&self) -> Result<Vec<Value>, String> {
        Err("value is not iterable".to_string())
    }

    /// Invokes an allow-listed inherited method. Callers must have already
    /// checked [`is_allowed_inherited_method`] — this trait does not
    /// re-check it, so a `HostObject` impl must never be driven directly by
    /// untrusted code outside `security.rs`/`evaluator`.
    fn invoke(&self, name: &str, args: Vec<Value>, ctx: &dyn HostCallCtx) -> Result<HostResult, String> {
        let _ = (args, ctx);
        Err(format!("'{name}' is not a function"))
    }

    fn call(&self, args: Vec<Value>, ctx: &dyn HostCallCtx) -> Result<HostResult, String> {
        let _ = (args, ctx);
        Err("value is not callable".to_string())
    }

    fn construct(&self, args: Vec<Value>, ctx: &dyn HostCallCtx) -> Result<Rc<dyn HostObject>, String> {
        let _ = (args, ctx);
        Err("value is not a constructor".to_string())
    }

    /// Names reachable as `thisCallable.<name>(...)` on a standalone
    /// callable (e.g. `Promise.resolve`), dispatched through [`Self::invoke`]
    /// with `self` as the bound target. Empty by default — most `HostObject`
    /// impls are either plain values or callables with no static surface.
    /// Exists so a constructor can expose static methods without building a
    /// self-referential `Rc` just to hand one back through `get_own`.
    fn static_methods(&self) -> &'static [&'static str] {
        &[]
    }

    /// Overrides what `new Thing(...)` produces for the one builtin whose
    /// sandbox-visible result isn't a host proxy: `Promise`, which must come
    /// back as `Value::Promise`, not `Value::Host`. `None` (the default)
    /// means "use the ordinary `construct`-then-wrap-as-host-proxy path".
    fn construct_as_value(&self, args: Vec<Value>, ctx: &dyn HostCallCtx) -> Option<Result<Value, String>> {
        let _ = (args, ctx);
        None
    }
}

/// A read-only proxy over a host-owned value (spec §3's `HostValue`).
pub struct HostValue {
    pub object: Rc<dyn HostObject>,
    pub display_path: String,
    pub proxy_depth: u32,
}

impl HostValue {
    #[must_use]
    pub fn root(object: Rc<dyn HostObject>, display_path: impl Into<String>) -> Self {
        Self { object, display_path: display_path.into(), proxy_depth: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableKind {
    Function,
    Constructor,
    MethodBound,
}

pub enum CallableTarget {
    /// A host value that is itself callable (an injected global function).
    Standalone(Rc<dyn HostObject>),
    /// A method reached through a parent host object (`host.method(...)`).
    Bound { parent: Rc<dyn HostObject>, method: String },
}

/// Spec §3's `HostCallable{fn, kind, name, arity?}`.
pub struct HostCallable {
    pub kind: CallableKind,
    pub name: String,
    pub arity: Option<usize>,
    pub target: CallableTarget,
}

/// Wraps a raw [`HostResult`] the way a property read or method call must
/// present it to the sandbox: scalars pass through, functions become
/// method-bound callables, nested objects become one-level-deeper proxies.
#[must_use]
pub fn wrap_host_result(result: HostResult, parent: &Rc<dyn HostObject>, parent_path: &str, proxy_depth: u32) -> Value {
    match result {
        HostResult::Scalar(v) => v,
        HostResult::Function { object, name } => Value::HostCallable(Rc::new(HostCallable {
            kind: CallableKind::MethodBound,
            name: name.clone(),
            arity: None,
            target: CallableTarget::Bound { parent: object, method: name },
        })),
        HostResult::Nested(object) => {
            let _ = parent;
            Value::Host(Rc::new(HostValue {
                object,
                display_path: format!("{parent_path}"),
                proxy_depth: proxy_depth + 1,
            }))
        }
    }
}

/// Reads property `name` off a host proxy, applying the gate, then own-key
/// lookup, then the inherited-method allow-list, in that order (spec
/// §4.C's three-step read algorithm).
pub fn read_host_property(host: &HostValue, name: &str, loc: CodeLoc) -> Result<Value, InterpreterError> {
    check_property_name(name, PropertyTarget::Host, loc)?;
    if let Some(result) = host.object.get_own(name) {
        let path = format!("{}.{name}", host.display_path);
        return Ok(wrap_host_result(result, &host.object, &path, host.proxy_depth));
    }
    if is_allowed_inherited_method(host.object.kind(), name) {
        return Ok(Value::HostCallable(Rc::new(HostCallable {
            kind: CallableKind::MethodBound,
            name: name.to_string(),
            arity: None,
            target: CallableTarget::Bound { parent: host.object.clone(), method: name.to_string() },
        })));
    }
    Err(InterpreterError::security(
        format!("Cannot read property '{name}' on global '{}'", host.display_path),
        loc,
    ))
}

/// Deep-copies sandbox arrays/objects into fresh, unshared values before
/// they cross into host code, so the host never observes a handle aliasing
/// live sandbox state (spec §4.C argument conversion). Functions are passed
/// through as-is — the host calls them back via [`HostCallCtx`], it never
/// mutates them. Everything else is already either a value type or a
/// reference the host may not mutate through (classes/instances/host
/// values/promises).
#[must_use]
pub fn snapshot_for_host(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::array(items.borrow().iter().map(snapshot_for_host).collect()),
        Value::Object(obj) => {
            let mut copy = crate::value::JsObject::new();
            for (key, descriptor) in &obj.borrow().properties {
                if let crate::value::PropertyDescriptor::Data { value, .. } = descriptor {
                    copy.set_data(key.clone(), snapshot_for_host(value));
                }
            }
            Value::object(copy)
        }
        other => other.clone(),
    }
}

/// Invokes a [`HostCallable`], translating a host-side error string into
/// `HostCallError` and wrapping the result through [`wrap_host_result`].
/// `hide_message` mirrors `security.hideHostErrorMessages` (default `true`).
pub fn invoke_callable(
    callable: &HostCallable,
    args: Vec<Value>,
    ctx: &dyn HostCallCtx,
    hide_message: bool,
    loc: CodeLoc,
) -> Result<Value, InterpreterError> {
    let converted: Vec<Value> = args.iter().map(snapshot_for_host).collect();
    let outcome = match &callable.target {
        CallableTarget::Standalone(object) => object.call(converted, ctx).map(|r| (r, object.clone(), callable.name.clone())),
        CallableTarget::Bound { parent, method } => {
            parent.invoke(method, converted, ctx).map(|r| (r, parent.clone(), method.clone()))
        }
    };
    match outcome {
        Ok((result, object, name)) => Ok(wrap_host_result(result, &object, &name, 0)),
        Err(message) => {
            let shown = if hide_message { "host call failed".to_string() } else { message };
            Err(InterpreterError::HostCall(crate::error::HostCallError { message: shown, loc }))
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostValue({})", self.display_path)
    }
}

impl fmt::Debug for HostCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostCallable({:?}, {})", self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_properties_are_rejected() {
        for name in FORBIDDEN_PROPERTIES {
            assert!(check_property_name(name, PropertyTarget::SandboxObject, CodeLoc::UNKNOWN).is_err());
        }
    }

    #[test]
    fn length_is_never_forbidden() {
        assert!(check_property_name("length", PropertyTarget::SandboxArray, CodeLoc::UNKNOWN).is_ok());
    }

    #[test]
    fn array_allow_list_matches_spec() {
        assert!(is_allowed_inherited_method(HostKind::Array, "map"));
        assert!(is_allowed_inherited_method(HostKind::Array, "toSorted"));
        assert!(!is_allowed_inherited_method(HostKind::Array, "constructor"));
    }

    #[test]
    fn number_tostring_is_allowed_only_via_delegation() {
        assert!(is_allowed_inherited_method(HostKind::Number, "toString"));
        assert!(check_property_name("toString", PropertyTarget::SandboxObject, CodeLoc::UNKNOWN).is_err());
    }
}
