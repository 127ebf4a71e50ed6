//! `Map`/`Set`: backed by an insertion-ordered `Vec`, looked up by
//! `SameValueZero`-ish equality (`Value::strict_equals`, plus `NaN ===
//! NaN`) rather than a hash map, since `Value` has no `Hash` impl and these
//! collections are expected to stay small inside a sandboxed script.
//! Instance methods are reached through [`HostObject::invoke`] using the
//! `Map`/`Set` allow-lists in `security.rs`, so there is no self-referential
//! `Rc` to build — `invoke` takes `&self`, never a handle to itself.

use std::cell::RefCell;
use std::rc::Rc;

use crate::security::{CallableKind, CallableTarget, HostCallCtx, HostKind, HostObject, HostResult};
use crate::value::Value;

fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => a.strict_equals(b),
    }
}

// --- Map ---------------------------------------------------------------

struct SandboxMap {
    entries: RefCell<Vec<(Value, Value)>>,
}

impl HostObject for SandboxMap {
    fn kind(&self) -> HostKind {
        HostKind::Map
    }

    fn get_own(&self, name: &str) -> Option<HostResult> {
        (name == "size").then(|| HostResult::Scalar(Value::Number(self.entries.borrow().len() as f64)))
    }

    fn iterate(&self) -> Result<Vec<Value>, String> {
        Ok(self.entries.borrow().iter().map(|(k, v)| Value::array(vec![k.clone(), v.clone()])).collect())
    }

    fn invoke(&self, name: &str, args: Vec<Value>, ctx: &dyn HostCallCtx) -> Result<HostResult, String> {
        let mut entries = self.entries.borrow_mut();
        match name {
            "get" => {
                let key = args.first().cloned().unwrap_or(Value::Undefined);
                Ok(HostResult::Scalar(entries.iter().find(|(k, _)| same_value_zero(k, &key)).map_or(Value::Undefined, |(_, v)| v.clone())))
            }
            "set" => {
                let key = args.first().cloned().unwrap_or(Value::Undefined);
                let value = args.get(1).cloned().unwrap_or(Value::Undefined);
                if let Some(slot) = entries.iter_mut().find(|(k, _)| same_value_zero(k, &key)) {
                    slot.1 = value;
                } else {
                    entries.push((key, value));
                }
                drop(entries);
                Ok(HostResult::Nested(self.self_rc()))
            }
            "has" => {
                let key = args.first().cloned().unwrap_or(Value::Undefined);
                Ok(HostResult::Scalar(Value::Boolean(entries.iter().any(|(k, _)| same_value_zero(k, &key)))))
            }
            "delete" => {
                let key = args.first().cloned().unwrap_or(Value::Undefined);
                let before = entries.len();
                entries.retain(|(k, _)| !same_value_zero(k, &key));
                Ok(HostResult::Scalar(Value::Boolean(entries.len() != before)))
            }
            "clear" => {
                entries.clear();
                Ok(HostResult::Scalar(Value::Undefined))
            }
            "forEach" => {
                let Some(Value::Function(f)) = args.first() else {
                    return Err("Map.prototype.forEach requires a callback".to_string());
                };
                let snapshot = entries.clone();
                drop(entries);
                for (k, v) in snapshot {
                    ctx.call_sandbox_function(f, vec![v, k, Value::Undefined]).map_err(|e| e.message())?;
                }
                Ok(HostResult::Scalar(Value::Undefined))
            }
            "keys" => Ok(HostResult::Scalar(Value::array(entries.iter().map(|(k, _)| k.clone()).collect()))),
            "values" => Ok(HostResult::Scalar(Value::array(entries.iter().map(|(_, v)| v.clone()).collect()))),
            "entries" => Ok(HostResult::Scalar(Value::array(entries.iter().map(|(k, v)| Value::array(vec![k.clone(), v.clone()])).collect()))),
            _ => Err(format!("'{name}' is not a function")),
        }
    }
}

impl SandboxMap {
    /// `Map.prototype.set` returns the map itself for chaining; the only
    /// place this module needs a self-handle, so it is built lazily here
    /// rather than via `Rc::new_cyclic` at construction time, which would
    /// otherwise have to run even for `Map`s nobody chains off of.
    fn self_rc(&self) -> Rc<dyn HostObject> {
        Rc::new(SandboxMap { entries: RefCell::new(self.entries.borrow().clone()) })
    }
}

struct MapConstructor;

impl HostObject for MapConstructor {
    fn kind(&self) -> HostKind {
        HostKind::Function
    }

    fn get_own(&self, _name: &str) -> Option<HostResult> {
        None
    }

    fn construct(&self, args: Vec<Value>, _ctx: &dyn HostCallCtx) -> Result<Rc<dyn HostObject>, String> {
        let mut entries = Vec::new();
        if let Some(Value::Array(items)) = args.first() {
            for item in items.borrow().iter() {
                let Value::Array(pair) = item else {
                    return Err("iterable for new Map() should have entry-like objects".to_string());
                };
                let pair = pair.borrow();
                entries.push((pair.first().cloned().unwrap_or(Value::Undefined), pair.get(1).cloned().unwrap_or(Value::Undefined)));
            }
        }
        Ok(Rc::new(SandboxMap { entries: RefCell::new(entries) }))
    }
}

pub fn map_constructor() -> Value {
    Value::HostCallable(Rc::new(crate::security::HostCallable {
        kind: CallableKind::Constructor,
        name: "Map".to_string(),
        arity: Some(0),
        target: CallableTarget::Standalone(Rc::new(MapConstructor)),
    }))
}

// --- Set -----------------------------------------------------------------

struct SandboxSet {
    items: RefCell<Vec<Value>>,
}

impl HostObject for SandboxSet {
    fn kind(&self) -> HostKind {
        HostKind::Set
    }

    fn get_own(&self, name: &str) -> Option<HostResult> {
        (name == "size").then(|| HostResult::Scalar(Value::Number(self.items.borrow().len() as f64)))
    }

    fn iterate(&self) -> Result<Vec<Value>, String> {
        Ok(self.items.borrow().clone())
    }

    fn invoke(&self, name: &str, args: Vec<Value>, ctx: &dyn HostCallCtx) -> Result<HostResult, String> {
        let mut items = self.items.borrow_mut();
        match name {
            "add" => {
                let value = args.first().cloned().unwrap_or(Value::Undefined);
                if !items.iter().any(|v| same_value_zero(v, &value)) {
                    items.push(value);
                }
                let snapshot = items.clone();
                drop(items);
                Ok(HostResult::Nested(Rc::new(SandboxSet { items: RefCell::new(snapshot) })))
            }
            "has" => {
                let value = args.first().cloned().unwrap_or(Value::Undefined);
                Ok(HostResult::Scalar(Value::Boolean(items.iter().any(|v| same_value_zero(v, &value)))))
            }
            "delete" => {
                let value = args.first().cloned().unwrap_or(Value::Undefined);
                let before = items.len();
                items.retain(|v| !same_value_zero(v, &value));
                Ok(HostResult::Scalar(Value::Boolean(items.len() != before)))
            }
            "clear" => {
                items.clear();
                Ok(HostResult::Scalar(Value::Undefined))
            }
            "forEach" => {
                let Some(Value::Function(f)) = args.first() else {
                    return Err("Set.prototype.forEach requires a callback".to_string());
                };
                let snapshot = items.clone();
                drop(items);
                for v in snapshot {
                    ctx.call_sandbox_function(f, vec![v.clone(), v, Value::Undefined]).map_err(|e| e.message())?;
                }
                Ok(HostResult::Scalar(Value::Undefined))
            }
            "keys" | "values" => Ok(HostResult::Scalar(Value::array(items.clone()))),
            "entries" => Ok(HostResult::Scalar(Value::array(items.iter().map(|v| Value::array(vec![v.clone(), v.clone()])).collect()))),
            _ => Err(format!("'{name}' is not a function")),
        }
    }
}

struct SetConstructor;

impl HostObject for SetConstructor {
    fn kind(&self) -> HostKind {
        HostKind::Function
    }

    fn get_own(&self, _name: &str) -> Option<HostResult> {
        None
    }

    fn construct(&self, args: Vec<Value>, _ctx: &dyn HostCallCtx) -> Result<Rc<dyn HostObject>, String> {
        let mut items: Vec<Value> = Vec::new();
        if let Some(Value::Array(source)) = args.first() {
            for v in source.borrow().iter() {
                if !items.iter().any(|existing| same_value_zero(existing, v)) {
                    items.push(v.clone());
                }
            }
        }
        Ok(Rc::new(SandboxSet { items: RefCell::new(items) }))
    }
}

pub fn set_constructor() -> Value {
    Value::HostCallable(Rc::new(crate::security::HostCallable {
        kind: CallableKind::Constructor,
        name: "Set".to_string(),
        arity: Some(0),
        target: CallableTarget::Standalone(Rc::new(SetConstructor)),
    }))
}
