//! `RegExp`. Pattern *compilation* is an explicit non-goal of this sandbox —
//! a real `RegExp` engine is the host's responsibility, supplied by
//! overriding the `RegExp` global through the interpreter's `globals`
//! option (spec §4.I's per-call/constructor global override). What this
//! catalog ships is a placeholder constructor so `new RegExp(...)` fails
//! with a clear message instead of silently compiling something naive.

use std::rc::Rc;

use crate::security::{CallableKind, CallableTarget, HostCallCtx, HostKind, HostObject, HostResult};
use crate::value::Value;

struct RegExpConstructor;

impl HostObject for RegExpConstructor {
    fn kind(&self) -> HostKind {
        HostKind::Function
    }

    fn get_own(&self, _name: &str) -> Option<HostResult> {
        None
    }

    fn construct(&self, _args: Vec<Value>, _ctx: &dyn HostCallCtx) -> Result<Rc<dyn HostObject>, String> {
        Err("RegExp is not available unless the host supplies one via the `globals` option".to_string())
    }
}

pub fn constructor() -> Value {
    Value::HostCallable(Rc::new(crate::security::HostCallable {
        kind: CallableKind::Constructor,
        name: "RegExp".to_string(),
        arity: Some(2),
        target: CallableTarget::Standalone(Rc::new(RegExpConstructor)),
    }))
}
