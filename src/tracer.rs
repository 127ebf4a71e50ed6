//! Execution tracing.
//!
//! Mirrors the teacher's `VmTracer` design: a trait with hook points at key
//! evaluation events, monomorphized away entirely when the no-op
//! implementation is selected, so instrumentation costs nothing in the
//! default configuration. Where the teacher hooks opcode dispatch, this
//! crate hooks AST node dispatch — the granularity the tree-walking
//! evaluator actually has.

/// One traced event. [`RecordingTracer`] buffers these; [`StderrTracer`]
/// prints a line per event instead of buffering.
#[derive(Debug, Clone)]
pub enum TraceEvent {
    /// A statement was about to be evaluated.
    Statement { kind: &'static str, depth: usize },
    /// An expression was about to be evaluated.
    Expression { kind: &'static str, depth: usize },
    /// A sandbox function call is starting.
    Call { name: String, depth: usize },
    /// A sandbox function call returned.
    Return { depth: usize },
    /// A new lexical scope was pushed (block, loop iteration, call, catch).
    ScopePush { depth: usize },
    ScopePop { depth: usize },
    /// Control crossed into host code (a native-method call or a host
    /// function/constructor invocation).
    HostBoundary { description: String },
}

/// Zero-cost hook trait. The synchronous and async evaluators take
/// `&impl EvalTracer` generically so [`NoopTracer`] calls inline away.
pub trait EvalTracer {
    fn on_statement(&self, _kind: &'static str, _depth: usize) {}
    fn on_expression(&self, _kind: &'static str, _depth: usize) {}
    fn on_call(&self, _name: &str, _depth: usize) {}
    fn on_return(&self, _depth: usize) {}
    fn on_scope_push(&self, _depth: usize) {}
    fn on_scope_pop(&self, _depth: usize) {}
    fn on_host_boundary(&self, _description: &str) {}
}

/// Production default: every hook is an empty inlined function.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl EvalTracer for NoopTracer {}

/// Prints a human-readable line per event, for local debugging.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrTracer;

impl EvalTracer for StderrTracer {
    fn on_statement(&self, kind: &'static str, depth: usize) {
        eprintln!("{:width$}stmt {kind}", "", width = depth * 2);
    }
    fn on_expression(&self, kind: &'static str, depth: usize) {
        eprintln!("{:width$}expr {kind}", "", width = depth * 2);
    }
    fn on_call(&self, name: &str, depth: usize) {
        eprintln!("{:width$}call {name}", "", width = depth * 2);
    }
    fn on_return(&self, depth: usize) {
        eprintln!("{:width$}return", "", width = depth * 2);
    }
    fn on_host_boundary(&self, description: &str) {
        eprintln!("host> {description}");
    }
}

/// Buffers every event for post-mortem inspection (tests, replay).
#[derive(Default)]
pub struct RecordingTracer {
    events: std::cell::RefCell<Vec<TraceEvent>>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl EvalTracer for RecordingTracer {
    fn on_statement(&self, kind: &'static str, depth: usize) {
        self.events.borrow_mut().push(TraceEvent::Statement { kind, depth });
    }
    fn on_expression(&self, kind: &'static str, depth: usize) {
        self.events.borrow_mut().push(TraceEvent::Expression { kind, depth });
    }
    fn on_call(&self, name: &str, depth: usize) {
        self.events.borrow_mut().push(TraceEvent::Call { name: name.to_string(), depth });
    }
    fn on_return(&self, depth: usize) {
        self.events.borrow_mut().push(TraceEvent::Return { depth });
    }
    fn on_scope_push(&self, depth: usize) {
        self.events.borrow_mut().push(TraceEvent::ScopePush { depth });
    }
    fn on_scope_pop(&self, depth: usize) {
        self.events.borrow_mut().push(TraceEvent::ScopePop { depth });
    }
    fn on_host_boundary(&self, description: &str) {
        self.events.borrow_mut().push(TraceEvent::HostBoundary { description: description.to_string() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_tracer_buffers_events() {
        let tracer = RecordingTracer::new();
        tracer.on_statement("ExpressionStatement", 0);
        tracer.on_call("f", 1);
        assert_eq!(tracer.events().len(), 2);
    }
}
