//! `String` as both a conversion function (`String(value)`) and a namespace
//! (`String.fromCharCode`/`fromCodePoint`) — the same `call` +
//! `static_methods` split `builtins::promise::PromiseConstructor` uses, since
//! a plain namespace object (the way `Math`/`JSON` are built) has no `call`
//! slot to hang a conversion function off. Instance methods (`slice`,
//! `split`, ...) are handled by `evaluator::native_methods`, same split as
//! `Array`.

use std::rc::Rc;

use crate::security::{CallableKind, CallableTarget, HostCallCtx, HostKind, HostObject, HostResult};
use crate::value::Value;

struct StringConstructor;

impl StringConstructor {
    const STATICS: &'static [&'static str] = &["fromCharCode", "fromCodePoint"];
}

impl HostObject for StringConstructor {
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
            "fromCharCode" => {
                let s: String = args.iter().map(|v| char::from_u32(v.to_number() as u32).unwrap_or(char::REPLACEMENT_CHARACTER)).collect();
                Ok(HostResult::Scalar(Value::string(s)))
            }
            "fromCodePoint" => {
                let mut s = String::new();
                for v in &args {
                    let code = v.to_number();
                    if !(0.0..=0x0010_FFFF as f64).contains(&code) {
                        return Err("Invalid code point".to_string());
                    }
                    match char::from_u32(code as u32) {
                        Some(c) => s.push(c),
                        None => return Err("Invalid code point".to_string()),
                    }
                }
                Ok(HostResult::Scalar(Value::string(s)))
            }
            _ => Err(format!("'{name}' is not a function")),
        }
    }

    fn call(&self, args: Vec<Value>, ctx: &dyn HostCallCtx) -> Result<HostResult, String> {
        let _ = ctx;
        let text = args.first().map_or_else(|| Rc::from(""), Value::to_js_string);
        Ok(HostResult::Scalar(Value::String(text)))
    }
}

#[must_use]
pub fn namespace() -> Value {
    Value::HostCallable(Rc::new(crate::security::HostCallable {
        kind: CallableKind::Function,
        name: "String".to_string(),
        arity: Some(1),
        target: CallableTarget::Standalone(Rc::new(StringConstructor)),
    }))
}
