//! Cumulative resource accounting (component H, tracker half).
//!
//! Adapted from the teacher's `resource.rs`: a small trait with
//! zero-overhead checks on the hot path when no limits are configured
//! (`NoLimitTracker`), and a counting implementation consulted at the top
//! of every `evaluate`/`evaluateAsync` call and at the evaluator's
//! loop-iteration/function-call boundaries.

use std::time::{Duration, Instant};

/// Why the tracker refused to let evaluation start or continue.
#[derive(Debug, Clone)]
pub struct ResourceError {
    pub message: String,
}

impl std::fmt::Display for ResourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ResourceError {}

/// One entry in a tracker's bounded history, recorded at the end of each
/// top-level evaluation.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub nodes_evaluated: u64,
    pub function_calls: u64,
    pub loop_iterations: u64,
    pub elapsed: Duration,
}

/// A fixed-capacity ring buffer of [`HistoryEntry`] — the "optional bounded
/// history of per-evaluation entries" from the spec.
pub struct BoundedHistory {
    capacity: usize,
    entries: std::collections::VecDeque<HistoryEntry>,
}

impl BoundedHistory {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: std::collections::VecDeque::with_capacity(capacity.min(256)) }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    #[must_use]
    pub fn entries(&self) -> &std::collections::VecDeque<HistoryEntry> {
        &self.entries
    }
}

/// Counters surfaced by `Interpreter::get_stats()`, reset at the start of
/// each top-level call.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub nodes_evaluated: u64,
    pub function_calls: u64,
    pub loop_iterations: u64,
}

/// The four counters the evaluator maintains, plus the hooks an external
/// cumulative tracker consumes. Every hook is a no-op by default so a
/// tracker only needs to implement what it actually limits.
pub trait ResourceTracker {
    /// Marks the start of a top-level `evaluate`/`evaluate_async` call —
    /// counted toward `max_evaluations` and the clock `max_cpu_time` checks
    /// against. Called once per call by the interpreter façade, before the
    /// program runs.
    fn begin_execution(&self) {}
    fn on_node_evaluated(&self) {}
    fn on_function_call(&self) {}
    fn on_loop_iteration(&self) {}
    /// Called at the evaluator's main allocation sites (object/array
    /// literals, string concatenation) with an approximate byte size for
    /// the value just built, counted cumulatively toward
    /// `max_total_memory`. Unlike the other counters this can fail the
    /// allocation itself, the same way the teacher's own
    /// `ResourceTracker::on_allocate` gates a heap allocation before it
    /// completes.
    fn on_allocate(&self, _bytes: u64) -> Result<(), ResourceError> {
        Ok(())
    }
    fn check_time(&self) -> Result<(), ResourceError> {
        Ok(())
    }
    /// Consulted before every top-level `evaluate`/`evaluate_async` call.
    fn is_exhausted(&self) -> Option<ResourceError> {
        None
    }
    fn stats(&self) -> Stats {
        Stats::default()
    }
    fn record_evaluation(&self, _entry: HistoryEntry) {}
}

/// Zero-overhead tracker used when the host configures no limits at all —
/// every method is an empty inlined function, the same pattern as
/// [`crate::tracer::NoopTracer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {}

/// Construction-time limits for [`LimitedTracker`]. `None` means
/// unbounded for that dimension.
#[derive(Debug, Clone, Default)]
pub struct ResourceLimits {
    pub max_total_memory: Option<u64>,
    pub max_total_iterations: Option<u64>,
    pub max_function_calls: Option<u64>,
    pub max_cpu_time: Option<Duration>,
    pub max_evaluations: Option<u64>,
}

struct Counters {
    nodes_evaluated: u64,
    function_calls: u64,
    loop_iterations: u64,
    evaluations: u64,
    memory_used: u64,
}

/// A counting tracker enforcing [`ResourceLimits`] cumulatively across
/// every `evaluate`/`evaluate_async` call made through the same
/// `Interpreter` (invariant I9: two calls individually within limits can
/// still combine to exceed a cumulative one).
pub struct LimitedTracker {
    limits: ResourceLimits,
    counters: std::cell::RefCell<Counters>,
    started_at: std::cell::Cell<Option<Instant>>,
    history: std::cell::RefCell<Option<BoundedHistory>>,
}

impl LimitedTracker {
    #[must_use]
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            counters: std::cell::RefCell::new(Counters { nodes_evaluated: 0, function_calls: 0, loop_iterations: 0, evaluations: 0, memory_used: 0 }),
            started_at: std::cell::Cell::new(None),
            history: std::cell::RefCell::new(None),
        }
    }

    #[must_use]
    pub fn with_history(mut self, capacity: usize) -> Self {
        self.history = std::cell::RefCell::new(Some(BoundedHistory::new(capacity)));
        self
    }
}

impl ResourceTracker for LimitedTracker {
    fn begin_execution(&self) {
        self.started_at.set(Some(Instant::now()));
        self.counters.borrow_mut().evaluations += 1;
    }

    fn on_node_evaluated(&self) {
        self.counters.borrow_mut().nodes_evaluated += 1;
    }

    fn on_function_call(&self) {
        self.counters.borrow_mut().function_calls += 1;
    }

    fn on_loop_iteration(&self) {
        self.counters.borrow_mut().loop_iterations += 1;
    }

    fn on_allocate(&self, bytes: u64) -> Result<(), ResourceError> {
        let Some(max) = self.limits.max_total_memory else {
            return Ok(());
        };
        let mut counters = self.counters.borrow_mut();
        let new_total = counters.memory_used + bytes;
        if new_total > max {
            return Err(ResourceError { message: format!("total memory limit of {max} bytes exceeded ({new_total} bytes)") });
        }
        counters.memory_used = new_total;
        Ok(())
    }

    fn check_time(&self) -> Result<(), ResourceError> {
        if let (Some(limit), Some(started)) = (self.limits.max_cpu_time, self.started_at.get()) {
            if started.elapsed() > limit {
                return Err(ResourceError { message: format!("CPU time limit of {limit:?} exceeded") });
            }
        }
        Ok(())
    }

    fn is_exhausted(&self) -> Option<ResourceError> {
        let counters = self.counters.borrow();
        if let Some(max) = self.limits.max_total_iterations {
            if counters.loop_iterations >= max {
                return Some(ResourceError { message: format!("total loop iteration limit of {max} reached") });
            }
        }
        if let Some(max) = self.limits.max_function_calls {
            if counters.function_calls >= max {
                return Some(ResourceError { message: format!("function call limit of {max} reached") });
            }
        }
        if let Some(max) = self.limits.max_evaluations {
            if counters.evaluations > max {
                return Some(ResourceError { message: format!("evaluation count limit of {max} reached") });
            }
        }
        None
    }

    fn stats(&self) -> Stats {
        let c = self.counters.borrow();
        Stats { nodes_evaluated: c.nodes_evaluated, function_calls: c.function_calls, loop_iterations: c.loop_iterations }
    }

    fn record_evaluation(&self, entry: HistoryEntry) {
        if let Some(history) = self.history.borrow_mut().as_mut() {
            history.push(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cumulative_limit_trips_on_second_call() {
        let tracker = LimitedTracker::new(ResourceLimits { max_function_calls: Some(3), ..Default::default() });
        tracker.on_function_call();
        tracker.on_function_call();
        assert!(tracker.is_exhausted().is_none());
        tracker.on_function_call();
        assert!(tracker.is_exhausted().is_some());
    }

    #[test]
    fn no_limit_tracker_never_exhausts() {
        let tracker = NoLimitTracker;
        for _ in 0..1000 {
            tracker.on_function_call();
        }
        assert!(tracker.is_exhausted().is_none());
    }

    #[test]
    fn memory_limit_rejects_an_allocation_that_would_cross_it() {
        let tracker = LimitedTracker::new(ResourceLimits { max_total_memory: Some(100), ..Default::default() });
        assert!(tracker.on_allocate(60).is_ok());
        assert!(tracker.on_allocate(60).is_err());
    }
}
