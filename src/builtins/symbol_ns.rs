//! `Symbol`, reduced to the one facet the spec keeps: `Symbol(description)`
//! produces a host value whose only reachable property is `.description`,
//! via the `HostKind::Symbol` allow-list (which is empty — `.description`
//! is an own key, not an inherited method, so it never needs the allow-list
//! at all).

use std::rc::Rc;

use crate::security::{CallableKind, CallableTarget, HostCallCtx, HostKind, HostObject, HostResult};
use crate::value::Value;

struct SandboxSymbol {
    description: Option<String>,
}

impl HostObject for SandboxSymbol {
    fn kind(&self) -> HostKind {
        HostKind::Symbol
    }

    fn get_own(&self, name: &str) -> Option<HostResult> {
        match name {
            "description" => Some(HostResult::Scalar(self.description.clone().map_or(Value::Undefined, Value::string))),
            _ => None,
        }
    }
}

struct SymbolConstructor;

impl HostObject for SymbolConstructor {
    fn kind(&self) -> HostKind {
        HostKind::Function
    }

    fn get_own(&self, _name: &str) -> Option<HostResult> {
        None
    }

    fn call(&self, args: Vec<Value>, _ctx: &dyn HostCallCtx) -> Result<HostResult, String> {
        let description = args.first().map(Value::to_js_string).map(|s| s.to_string());
        Ok(HostResult::Nested(Rc::new(SandboxSymbol { description })))
    }
}

pub fn namespace() -> Value {
    Value::HostCallable(Rc::new(crate::security::HostCallable {
        kind: CallableKind::Function,
        name: "Symbol".to_string(),
        arity: Some(0),
        target: CallableTarget::Standalone(Rc::new(SymbolConstructor)),
    }))
}
