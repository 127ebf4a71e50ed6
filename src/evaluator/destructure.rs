//! Pattern binding, shared by `let`/`const`/`var` declarators, function
//! parameters, `catch` clauses, `for`/`for-of`/`for-in` heads, and
//! assignment-expression destructuring targets.
//!
//! One walk (`bind_pattern`) handles every binding site; the only thing that
//! differs between them is *how* a leaf identifier is bound, captured by
//! [`BindMode`].

use std::rc::Rc;

use crate::ast::{ObjectPatternProp, Pattern};
use crate::environment::{BindingKind, Scope};
use crate::error::CodeLoc;
use crate::security::HostObject;
use crate::value::Value;

use super::{EvalContext, EvalResult, Flow};

/// How a leaf identifier in a pattern gets bound.
pub enum BindMode<'s> {
    /// Fresh `let`/`const`/parameter binding in `scope`.
    Declare(&'s Scope, BindingKind),
    /// Plain assignment, walking up the scope chain to find the declaring
    /// scope — used for `var` (already hoisted) and assignment-expression
    /// targets.
    Assign(&'s Scope),
}

/// Recursively collects every identifier a pattern would bind, used by the
/// hoisting pass to reserve `let`/`const` names and by `var` collection to
/// find names nested inside destructuring declarators.
pub fn collect_pattern_names(pattern: &Pattern, out: &mut Vec<String>) {
    match pattern {
        Pattern::Identifier(name) => out.push(name.clone()),
        Pattern::Array(elements) => {
            for el in elements.iter().flatten() {
                collect_pattern_names(el, out);
            }
        }
        Pattern::Object { props, rest } => {
            for prop in props {
                collect_pattern_names(&prop.value, out);
            }
            if let Some(rest) = rest {
                collect_pattern_names(rest, out);
            }
        }
        Pattern::Assignment(inner, _) | Pattern::Rest(inner) => collect_pattern_names(inner, out),
        Pattern::Member(_) => {}
    }
}

pub fn bind_pattern(pattern: &Pattern, value: Value, mode: &BindMode<'_>, this: &Value, loc: CodeLoc, ctx: &EvalContext) -> EvalResult<()> {
    match pattern {
        Pattern::Identifier(name) => match mode {
            BindMode::Declare(scope, kind) => {
                scope.declare(name.clone(), value, *kind);
                Ok(())
            }
            BindMode::Assign(scope) => scope.assign(name, value, loc).map_err(Flow::Error),
        },
        Pattern::Assignment(inner, default) => {
            let value = if matches!(value, Value::Undefined) { super::eval_expression(default, bind_scope(mode), this, ctx)? } else { value };
            bind_pattern(inner, value, mode, this, loc, ctx)
        }
        Pattern::Array(elements) => {
            let items = iterate_for_destructure(&value, loc)?;
            let mut iter = items.into_iter();
            for element in elements {
                let item = iter.next().unwrap_or(Value::Undefined);
                match element {
                    Some(Pattern::Rest(inner)) => {
                        let remainder: Vec<Value> = iter.by_ref().collect();
                        bind_pattern(inner, Value::array(remainder), mode, this, loc, ctx)?;
                        break;
                    }
                    Some(p) => bind_pattern(p, item, mode, this, loc, ctx)?,
                    None => {}
                }
            }
            Ok(())
        }
        Pattern::Rest(inner) => bind_pattern(inner, value, mode, this, loc, ctx),
        Pattern::Object { props, rest } => {
            let mut taken: Vec<Rc<str>> = Vec::new();
            for prop in props {
                let key = super::property_key_name(&prop.key, bind_scope(mode), this, ctx)?;
                let item = super::get_member_by_name(&value, &key, loc, ctx)?;
                taken.push(Rc::from(key.as_str()));
                bind_pattern(&prop.value, item, mode, this, loc, ctx)?;
            }
            if let Some(rest_pattern) = rest {
                let mut obj = crate::value::JsObject::new();
                if let Value::Object(source) = &value {
                    for (k, descriptor) in &source.borrow().properties {
                        if taken.iter().any(|t| t == k) {
                            continue;
                        }
                        if let crate::value::PropertyDescriptor::Data { value, .. } = descriptor {
                            obj.set_data(k.clone(), value.clone());
                        }
                    }
                }
                bind_pattern(rest_pattern, Value::object(obj), mode, this, loc, ctx)?;
            }
            Ok(())
        }
        Pattern::Member(member) => match mode {
            BindMode::Assign(scope) => super::assign_member_pattern(member, value, scope, this, ctx),
            BindMode::Declare(..) => Err(Flow::Error(crate::error::InterpreterError::syntax(
                "invalid destructuring assignment target",
                loc,
            ))),
        },
    }
}

fn bind_scope<'s>(mode: &BindMode<'s>) -> &'s Scope {
    match mode {
        BindMode::Declare(scope, _) | BindMode::Assign(scope) => scope,
    }
}

/// Spreads an array, a string (by UTF-16-ish code point, approximated here
/// as Unicode scalar values since this value model has no UTF-16 code unit
/// type), or a host-proxied iterable (`Map`/`Set` and anything a host
/// `HostObject` impl chooses to drain through `HostObject::iterate`) into a
/// `Vec<Value>` for array-pattern destructuring, `for...of`, and spread
/// arguments/elements.
pub fn iterate_for_destructure(value: &Value, loc: CodeLoc) -> EvalResult<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items.borrow().clone()),
        Value::String(s) => Ok(s.chars().map(|c| Value::string(c.to_string())).collect()),
        Value::Host(host) => host
            .object
            .iterate()
            .map_err(|message| Flow::Error(crate::error::InterpreterError::type_error(message, loc))),
        Value::Undefined | Value::Null => Err(Flow::Error(crate::error::InterpreterError::type_error(
            "value is not iterable",
            loc,
        ))),
        other => Err(Flow::Error(crate::error::InterpreterError::type_error(
            format!("{} is not iterable", other.typeof_str()),
            loc,
        ))),
    }
}

/// Binds a function's formal parameters into its freshly-created call scope:
/// positional patterns first (each may itself be a default or a
/// destructuring pattern), then the rest parameter, if any, collecting
/// whatever positional arguments remain.
pub fn bind_params(params: &crate::callable::Params, args: &[Value], scope: &Scope, this: &Value, loc: CodeLoc, ctx: &EvalContext) -> EvalResult<()> {
    let mode = BindMode::Declare(scope, BindingKind::Let);
    for (index, pattern) in params.patterns.iter().enumerate() {
        let value = args.get(index).cloned().unwrap_or(Value::Undefined);
        bind_pattern(pattern, value, &mode, this, loc, ctx)?;
    }
    if let Some(rest) = &params.rest {
        let remainder = args.iter().skip(params.patterns.len()).cloned().collect();
        bind_pattern(rest, Value::array(remainder), &mode, this, loc, ctx)?;
    }
    Ok(())
}
