//! Class declaration/expression evaluation and instance construction
//! (component D's class half, driven from `evaluator::mod`).

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::{ClassDecl, ClassMember, MethodKind};
use crate::class::{Accessor, FieldInit, Member, SandboxClass, SandboxInstance};
use crate::environment::Scope;
use crate::error::{CodeLoc, InterpreterError};
use crate::value::Value;

use super::{EvalContext, EvalResult, Flow};

/// Builds a `SandboxClass` from a class declaration/expression, evaluating
/// the superclass expression (if any) and every static field initializer
/// once, in source order, matching "static fields are evaluated once, at
/// class-declaration time" (spec §4.D).
pub fn build_class(decl: &ClassDecl, scope: &Scope, this: &Value, ctx: &EvalContext) -> EvalResult<Rc<SandboxClass>> {
    let superclass = match &decl.superclass {
        Some(expr) => match super::eval_expression(expr, scope, this, ctx)? {
            Value::Class(c) => Some(c),
            other => return Err(Flow::Error(InterpreterError::type_error(format!("'{}' is not a class", other.typeof_str()), decl.loc))),
        },
        None => None,
    };

    let mut constructor = None;
    let mut instance_methods: IndexMap<Rc<str>, Member> = IndexMap::new();
    let mut instance_accessors: IndexMap<Rc<str>, Accessor> = IndexMap::new();
    let mut static_methods: IndexMap<Rc<str>, Member> = IndexMap::new();
    let mut static_accessors: IndexMap<Rc<str>, Accessor> = IndexMap::new();
    let mut instance_fields = Vec::new();
    let mut static_fields = Vec::new();
    let mut private_names = Vec::new();

    for member in &decl.members {
        match member {
            ClassMember::Method { key, kind, is_static, function } => {
                let name = member_name(key, &mut private_names);
                let f = Rc::new(super::make_function_from_expr(function, scope, name.clone()));
                if *kind == MethodKind::Constructor {
                    constructor = Some(f);
                    continue;
                }
                let (methods, accessors) = if *is_static { (&mut static_methods, &mut static_accessors) } else { (&mut instance_methods, &mut instance_accessors) };
                match kind {
                    MethodKind::Get => {
                        let entry = accessors.entry(name.clone()).or_insert(Accessor { get: None, set: None });
                        entry.get = Some(f);
                    }
                    MethodKind::Set => {
                        let entry = accessors.entry(name.clone()).or_insert(Accessor { get: None, set: None });
                        entry.set = Some(f);
                    }
                    MethodKind::Method => {
                        methods.insert(name, Member::Method(f));
                    }
                    MethodKind::Constructor => unreachable!(),
                }
            }
            ClassMember::Field { key, value, is_static } => {
                let name = member_name(key, &mut private_names);
                let init = FieldInit { name, is_private: matches!(key, crate::ast::PropertyKey::PrivateIdentifier(_)), initializer: value.clone() };
                if *is_static { static_fields.push(init) } else { instance_fields.push(init) }
            }
        }
    }
    for (name, accessor) in instance_accessors {
        instance_methods.insert(name, Member::Accessor(accessor));
    }
    for (name, accessor) in static_accessors {
        static_methods.insert(name, Member::Accessor(accessor));
    }

    let class = Rc::new(SandboxClass {
        name: decl.name.clone(),
        constructor,
        instance_fields,
        instance_methods,
        static_fields,
        static_values: RefCell::new(IndexMap::new()),
        static_methods,
        private_names,
        superclass,
        defining_env: scope.clone(),
        loc: decl.loc,
    });

    for field in &class.static_fields {
        let value = match &field.initializer {
            Some(expr) => super::eval_expression(expr, scope, &Value::Class(class.clone()), ctx)?,
            None => Value::Undefined,
        };
        class.static_values.borrow_mut().insert(field.name.clone(), value);
    }
    Ok(class)
}

fn member_name(key: &crate::ast::PropertyKey, private_names: &mut Vec<Rc<str>>) -> Rc<str> {
    use crate::ast::PropertyKey as K;
    match key {
        K::Identifier(n) | K::StringLiteral(n) => Rc::from(n.as_str()),
        K::NumberLiteral(n) => Rc::from(n.to_string().as_str()),
        K::PrivateIdentifier(n) => {
            let full: Rc<str> = Rc::from(format!("#{n}").as_str());
            if !private_names.contains(&full) {
                private_names.push(full.clone());
            }
            full
        }
        K::Computed(_) => Rc::from("<computed>"),
    }
}

/// `new SomeClass(...)`: allocates the instance, then runs `class`'s own
/// constructor (or, for an implicit constructor, forwards straight to the
/// superclass's). A class's own instance field initializers run immediately
/// after its own `super(...)` call returns — here for an implicit
/// constructor, or inside the constructor body itself via the
/// `Expression::Super` call handling — or, for a base class with no
/// superclass at all, immediately before its constructor body runs, since
/// no `super()` call will ever fire to trigger them.
pub fn construct_instance(class: &Rc<SandboxClass>, args: Vec<Value>, ctx: &EvalContext, loc: CodeLoc) -> EvalResult<Value> {
    let instance = Rc::new(RefCell::new(SandboxInstance::new(class.clone())));
    let this = Value::Instance(instance.clone());
    if class.superclass.is_none() {
        init_own_instance_fields(class, &this, ctx)?;
    }
    if let Some(ctor) = &class.constructor {
        super::call_function(ctor, this.clone(), args, ctx)?;
    } else if let Some(superclass) = &class.superclass {
        // An implicit constructor forwards every argument to `super(...)`;
        // once that call returns, this class's own fields initialize.
        if let Some(super_ctor) = &superclass.constructor {
            super::call_function(super_ctor, this.clone(), args, ctx)?;
        }
        init_own_instance_fields(class, &this, ctx)?;
    }
    let _ = loc;
    Ok(this)
}

/// Initializes `class`'s own instance fields only, not its superclass's —
/// callers decide when in the construction sequence that point falls.
pub(super) fn init_own_instance_fields(class: &Rc<SandboxClass>, this: &Value, ctx: &EvalContext) -> EvalResult<()> {
    let Value::Instance(instance) = this else { unreachable!("init_own_instance_fields always called with a freshly constructed instance") };
    for field in &class.instance_fields {
        let value = match &field.initializer {
            Some(expr) => super::eval_expression(expr, &class.defining_env, this, ctx)?,
            None => Value::Undefined,
        };
        if field.is_private {
            instance.borrow_mut().private_fields.insert(field.name.clone(), value);
        } else {
            instance.borrow_mut().fields.insert(field.name.clone(), value);
        }
    }
    Ok(())
}
