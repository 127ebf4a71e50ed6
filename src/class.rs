//! Sandbox classes and instances (component D, class half).
//!
//! Sandbox objects have no prototype chain — classes instead carry an
//! explicit `superclass` link, matching the redesign note in the design
//! document: "sandbox classes carry an explicit parent link resolved by
//! class-id lookup, avoiding cyclic ownership."

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::callable::SandboxFunction;
use crate::environment::Scope;
use crate::error::CodeLoc;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Accessor {
    pub get: Option<Rc<SandboxFunction>>,
    pub set: Option<Rc<SandboxFunction>>,
}

/// A field, method, or accessor owned by a class, static or instance.
#[derive(Debug, Clone)]
pub enum Member {
    Method(Rc<SandboxFunction>),
    Accessor(Accessor),
}

/// A field initializer, run in source order at instance construction time
/// (instance fields) or at class-declaration time (static fields). `None`
/// initializes to `undefined`.
#[derive(Debug, Clone)]
pub struct FieldInit {
    pub name: Rc<str>,
    pub is_private: bool,
    pub initializer: Option<crate::ast::Expression>,
}

/// Spec §3's `SandboxClass`.
pub struct SandboxClass {
    pub name: Option<String>,
    pub constructor: Option<Rc<SandboxFunction>>,
    pub instance_fields: Vec<FieldInit>,
    pub instance_methods: IndexMap<Rc<str>, Member>,
    pub static_fields: Vec<FieldInit>,
    /// Evaluated once, at class-declaration time, and stored here —
    /// static fields are properties of the class itself, not re-run per
    /// instance.
    pub static_values: RefCell<IndexMap<Rc<str>, Value>>,
    pub static_methods: IndexMap<Rc<str>, Member>,
    /// Names declared with a `#` sigil, tracked so an unknown private name
    /// referenced anywhere is a `SyntaxError` at evaluation time (spec
    /// §4.D) rather than silently resolving to `undefined`.
    pub private_names: Vec<Rc<str>>,
    pub superclass: Option<Rc<SandboxClass>>,
    pub defining_env: Scope,
    pub loc: CodeLoc,
}

impl SandboxClass {
    /// Walks the superclass chain to decide `instanceof`.
    #[must_use]
    pub fn is_or_extends(self: &Rc<Self>, other: &Rc<Self>) -> bool {
        if Rc::ptr_eq(self, other) {
            return true;
        }
        match &self.superclass {
            Some(parent) => parent.is_or_extends(other),
            None => false,
        }
    }

    /// Finds an instance method by name, walking the superclass chain —
    /// used for `super.m(...)` and for ordinary method dispatch once an
    /// instance's own method table misses.
    #[must_use]
    pub fn resolve_instance_method(&self, name: &str) -> Option<&Member> {
        if let Some(m) = self.instance_methods.get(name) {
            return Some(m);
        }
        self.superclass.as_ref().and_then(|p| p.resolve_instance_method(name))
    }

    #[must_use]
    pub fn is_known_private_name(&self, name: &str) -> bool {
        self.private_names.iter().any(|n| &**n == name) || self.superclass.as_ref().is_some_and(|p| p.is_known_private_name(name))
    }
}

/// Spec §3's `SandboxInstance`.
pub struct SandboxInstance {
    pub class_ref: Rc<SandboxClass>,
    pub fields: IndexMap<Rc<str>, Value>,
    /// Keyed by the private name including its `#` sigil, so a lookup can't
    /// collide with a same-named public field.
    pub private_fields: HashMap<Rc<str>, Value>,
}

impl SandboxInstance {
    #[must_use]
    pub fn new(class_ref: Rc<SandboxClass>) -> Self {
        Self { class_ref, fields: IndexMap::new(), private_fields: HashMap::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Scope;

    fn empty_class(name: &str, superclass: Option<Rc<SandboxClass>>) -> Rc<SandboxClass> {
        Rc::new(SandboxClass {
            name: Some(name.to_string()),
            constructor: None,
            instance_fields: Vec::new(),
            instance_methods: IndexMap::new(),
            static_fields: Vec::new(),
            static_values: RefCell::new(IndexMap::new()),
            static_methods: IndexMap::new(),
            private_names: Vec::new(),
            superclass,
            defining_env: Scope::root(),
            loc: CodeLoc::UNKNOWN,
        })
    }

    #[test]
    fn instanceof_walks_superclass_chain() {
        let base = empty_class("Animal", None);
        let derived = empty_class("Dog", Some(base.clone()));
        assert!(derived.is_or_extends(&base));
        assert!(!base.is_or_extends(&derived));
    }
}
