//! The lexical scope chain: `let`/`const`/`var` binding rules, shadowing,
//! and the temporal-dead-zone errors the spec requires (invariant I3).
//!
//! A scope is pure data with no back-pointers from parent to child, so
//! `Rc<RefCell<ScopeData>>` is enough — closures hold a strong reference to
//! their defining scope and nothing ever needs to walk downward.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;

use crate::error::{CodeLoc, InterpreterError};
use crate::value::Value;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BindingKind {
    Var,
    Let,
    Const,
}

struct Binding {
    value: Value,
    kind: BindingKind,
    /// `false` between scope creation and the declaring statement actually
    /// running — reading or writing it is a `ReferenceError` (TDZ).
    initialized: bool,
}

#[derive(Default)]
struct ScopeData {
    bindings: AHashMap<Rc<str>, Binding>,
    parent: Option<Scope>,
}

/// A handle to one link in the scope chain. Cloning a `Scope` clones the
/// `Rc`, not the bindings.
#[derive(Clone)]
pub struct Scope(Rc<RefCell<ScopeData>>);

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Scope")
    }
}

impl Scope {
    #[must_use]
    pub fn root() -> Self {
        Self(Rc::new(RefCell::new(ScopeData::default())))
    }

    /// A fresh child scope, e.g. for a block, a loop iteration, or a
    /// `catch` clause.
    #[must_use]
    pub fn child(&self) -> Self {
        Self(Rc::new(RefCell::new(ScopeData { bindings: AHashMap::new(), parent: Some(self.clone()) })))
    }

    /// Reserves `name` in this scope as uninitialized (TDZ), for `let`
    /// and `const` whose declaring statement has not run yet. Hoisted
    /// `var`s skip this and go straight to `declare` with `Value::Undefined`.
    pub fn reserve(&self, name: impl Into<Rc<str>>, kind: BindingKind) {
        self.0.borrow_mut().bindings.insert(name.into(), Binding { value: Value::Undefined, kind, initialized: false });
    }

    /// Declares `name` with an initial value, immediately initialized.
    /// `var` redeclaration in the same scope is allowed and simply
    /// overwrites; `let`/`const` redeclaration is a caller-level
    /// `SyntaxError` this module does not itself enforce (the evaluator
    /// checks before calling `declare` for those kinds, since it alone
    /// knows whether the existing binding is a hoisted placeholder or a
    /// real one, per invariant I3).
    pub fn declare(&self, name: impl Into<Rc<str>>, value: Value, kind: BindingKind) {
        self.0.borrow_mut().bindings.insert(name.into(), Binding { value, kind, initialized: true });
    }

    #[must_use]
    pub fn has_own(&self, name: &str) -> bool {
        self.0.borrow().bindings.contains_key(name)
    }

    /// Looks up `name`, walking outward through parents. Returns
    /// `ReferenceError` if undeclared anywhere, or if found but still in
    /// its temporal dead zone.
    pub fn lookup(&self, name: &str, loc: CodeLoc) -> Result<Value, InterpreterError> {
        let data = self.0.borrow();
        if let Some(binding) = data.bindings.get(name) {
            return if binding.initialized {
                Ok(binding.value.clone())
            } else {
                Err(InterpreterError::reference(format!("Cannot access '{name}' before initialization"), loc))
            };
        }
        match &data.parent {
            Some(parent) => parent.lookup(name, loc),
            None => Err(InterpreterError::reference(format!("{name} is not defined"), loc)),
        }
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        let data = self.0.borrow();
        if data.bindings.contains_key(name) {
            return true;
        }
        match &data.parent {
            Some(parent) => parent.has(name),
            None => false,
        }
    }

    /// Walks to the scope that declares `name` and assigns into it.
    /// Used both for plain assignment and for marking a `let`/`const`
    /// binding initialized the first time its declarator runs.
    pub fn assign(&self, name: &str, value: Value, loc: CodeLoc) -> Result<(), InterpreterError> {
        let mut data = self.0.borrow_mut();
        if let Some(binding) = data.bindings.get_mut(name) {
            if binding.initialized && binding.kind == BindingKind::Const {
                return Err(InterpreterError::type_error(format!("Assignment to constant variable '{name}'"), loc));
            }
            binding.value = value;
            binding.initialized = true;
            return Ok(());
        }
        let parent = data.parent.clone();
        drop(data);
        match parent {
            Some(parent) => parent.assign(name, value, loc),
            None => Err(InterpreterError::reference(format!("{name} is not defined"), loc)),
        }
    }

    /// Every initialized binding declared directly in this scope (not its
    /// parents). Used by the interpreter façade to move persistent
    /// user-declared state between the fresh scope chains built for each
    /// top-level call, and to answer `getScope`/`clearGlobals`.
    #[must_use]
    pub fn own_entries(&self) -> Vec<(Rc<str>, Value, BindingKind)> {
        self.0.borrow().bindings.iter().filter(|(_, b)| b.initialized).map(|(k, b)| (k.clone(), b.value.clone(), b.kind)).collect()
    }

    /// Every name visible from this scope, innermost declaration winning,
    /// walking outward to the root — `getScope()`'s "mapping of visible
    /// names to current values".
    #[must_use]
    pub fn visible(&self) -> Vec<(Rc<str>, Value)> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        let mut cur = Some(self.clone());
        while let Some(s) = cur {
            for (name, value, _) in s.own_entries() {
                if seen.insert(name.clone()) {
                    out.push((name, value));
                }
            }
            cur = s.0.borrow().parent.clone();
        }
        out
    }

    /// `var` declarations attach to the nearest function/program scope, not
    /// the nearest block. Callers walk up to that scope themselves (the
    /// evaluator tracks it alongside the lexical scope while walking a
    /// function body) and call `declare` there directly; this helper exists
    /// for the common "declare-or-leave-alone" hoisting pass, which must not
    /// clobber a `var` that a previous statement in the same function body
    /// already initialized.
    pub fn hoist_var(&self, name: impl Into<Rc<str>> + Clone, loc: CodeLoc) -> Result<(), InterpreterError> {
        let name_rc = name.clone().into();
        if self.has_own(&name_rc) {
            let existing_kind = self.0.borrow().bindings.get(&name_rc).map(|b| b.kind);
            if matches!(existing_kind, Some(BindingKind::Let | BindingKind::Const)) {
                return Err(InterpreterError::syntax(
                    format!("Identifier '{name_rc}' has already been declared"),
                    loc,
                ));
            }
            return Ok(());
        }
        self.declare(name_rc, Value::Undefined, BindingKind::Var);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_scope_shadows_parent() {
        let root = Scope::root();
        root.declare("x", Value::Number(1.0), BindingKind::Let);
        let block = root.child();
        block.declare("x", Value::Number(2.0), BindingKind::Let);
        assert_eq!(block.lookup("x", CodeLoc::UNKNOWN).unwrap().to_number(), 2.0);
        assert_eq!(root.lookup("x", CodeLoc::UNKNOWN).unwrap().to_number(), 1.0);
    }

    #[test]
    fn assign_walks_to_declaring_scope() {
        let root = Scope::root();
        root.declare("x", Value::Number(1.0), BindingKind::Let);
        let block = root.child();
        block.assign("x", Value::Number(9.0), CodeLoc::UNKNOWN).unwrap();
        assert_eq!(root.lookup("x", CodeLoc::UNKNOWN).unwrap().to_number(), 9.0);
    }

    #[test]
    fn const_reassignment_is_type_error() {
        let root = Scope::root();
        root.declare("x", Value::Number(1.0), BindingKind::Const);
        let err = root.assign("x", Value::Number(2.0), CodeLoc::UNKNOWN).unwrap_err();
        assert_eq!(err.kind_name(), "TypeError");
    }

    #[test]
    fn tdz_read_is_reference_error() {
        let root = Scope::root();
        root.reserve("x", BindingKind::Let);
        let err = root.lookup("x", CodeLoc::UNKNOWN).unwrap_err();
        assert_eq!(err.kind_name(), "ReferenceError");
    }

    #[test]
    fn undeclared_name_is_reference_error() {
        let root = Scope::root();
        assert_eq!(root.lookup("missing", CodeLoc::UNKNOWN).unwrap_err().kind_name(), "ReferenceError");
    }
}
