//! `Error` and its subclasses (`TypeError`, `RangeError`, `SyntaxError`,
//! `ReferenceError`). Each is its own `HostCallable` constructor rather than
//! a shared class hierarchy — the spec only needs `.name`/`.message`/a
//! `toString`-ish read, not real `instanceof` chaining through `Error`.

use std::rc::Rc;

use crate::security::{CallableKind, CallableTarget, HostCallCtx, HostKind, HostObject, HostResult};
use crate::value::Value;

struct ErrorInstance {
    name: &'static str,
    message: String,
}

impl HostObject for ErrorInstance {
    fn kind(&self) -> HostKind {
        HostKind::Error
    }

    fn get_own(&self, name: &str) -> Option<HostResult> {
        match name {
            "name" => Some(HostResult::Scalar(Value::string(self.name))),
            "message" => Some(HostResult::Scalar(Value::string(self.message.clone()))),
            "stack" => Some(HostResult::Scalar(Value::string(format!("{}: {}", self.name, self.message)))),
            _ => None,
        }
    }
}

struct ErrorConstructor {
    name: &'static str,
}

impl ErrorConstructor {
    fn build(&self, args: Vec<Value>) -> Rc<dyn HostObject> {
        let message = args.first().map(Value::to_js_string).map_or(String::new(), |s| s.to_string());
        Rc::new(ErrorInstance { name: self.name, message })
    }
}

impl HostObject for ErrorConstructor {
    fn kind(&self) -> HostKind {
        HostKind::Function
    }

    fn get_own(&self, _name: &str) -> Option<HostResult> {
        None
    }

    /// `Error("boom")` without `new` produces the same instance as
    /// `new Error("boom")`, matching native `Error` behavior.
    fn call(&self, args: Vec<Value>, _ctx: &dyn HostCallCtx) -> Result<HostResult, String> {
        Ok(HostResult::Nested(self.build(args)))
    }

    fn construct(&self, args: Vec<Value>, _ctx: &dyn HostCallCtx) -> Result<Rc<dyn HostObject>, String> {
        Ok(self.build(args))
    }
}

pub fn constructor(name: &'static str) -> Value {
    Value::HostCallable(Rc::new(crate::security::HostCallable {
        kind: CallableKind::Constructor,
        name: name.to_string(),
        arity: Some(1),
        target: CallableTarget::Standalone(Rc::new(ErrorConstructor { name })),
    }))
}
