//! A sandboxed tree-walking interpreter for a substantial subset of
//! ECMAScript (through ES2024-era features), embedded inside a trusted host
//! program. The host supplies globals, optionally injects callable
//! functions and constructors, optionally validates the parsed program
//! before execution, and receives results either synchronously or through a
//! cooperative async driver it polls itself.
//!
//! [`Interpreter`] is the only entry point most hosts need; the other
//! modules are its implementation, public where a host needs to name a
//! type it passes across that boundary (a [`value::Value`] to inject as a
//! global, a [`security::HostObject`] to implement a native callable, an
//! [`error::InterpreterError`] to match on).

pub mod ast;
mod async_driver;
mod builtins;
mod callable;
mod class;
mod environment;
mod evaluator;
mod interpreter;
mod parse;
mod resource;
mod security;
mod tracer;
mod validator;
mod value;

pub mod error;

pub use crate::async_driver::PromiseLike;
pub use crate::builtins::EsVersion;
pub use crate::callable::{Params, SandboxFunction};
pub use crate::class::{Member, SandboxClass, SandboxInstance};
pub use crate::environment::{BindingKind, Scope};
pub use crate::interpreter::{CallOptions, CancellationToken, EvaluationStepper, Global, Interpreter, InterpreterOptions, Step};
pub use crate::resource::{
    BoundedHistory, HistoryEntry, LimitedTracker, NoLimitTracker, ResourceError, ResourceLimits, ResourceTracker, Stats,
};
pub use crate::security::{
    CallableKind, CallableTarget, HostCallCtx, HostCallable, HostKind, HostObject, HostResult, HostValue, SecurityOptions,
};
pub use crate::tracer::{EvalTracer, NoopTracer, StderrTracer, TraceEvent};
pub use crate::validator::Validator;
pub use crate::value::{JsObject, PropertyDescriptor, Value};
