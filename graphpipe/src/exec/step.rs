// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Pipeline steps
//!
//! A [`Step`] is one unit of the pipeline. The owning plan holds the step
//! chain as a vector and threads each step's output stream into the next
//! one's `start`; steps never hold back-pointers to their predecessors.
//! Steps may own nested plans (subqueries, MATCH branches, script
//! bodies), which is where the pipeline becomes a tree.

use crate::exec::context::ExecutionContext;
use crate::exec::error::{ExecResult, ExecutionError};
use crate::exec::row::Row;
use crate::exec::stream::{ExecutionStream, RowSource};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What to do when a step's timeout fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutStrategy {
    /// Raise [`ExecutionError::Timeout`]
    #[default]
    Fail,
    /// Swallow the timeout and return whatever was produced so far
    ReturnPartial,
}

/// A unit of the execution pipeline.
///
/// Lifecycle: idle → started → (timed-out | exhausted | closed).
/// `start` without an intervening `reset` after a previous `start` is a
/// programming error and fails with `IllegalState`.
pub trait Step {
    fn name(&self) -> String;

    fn base(&self) -> &StepBase;

    fn base_mut(&mut self) -> &mut StepBase;

    /// Begin execution, consuming the upstream stream (if this step has a
    /// predecessor) and returning this step's output stream. Must not
    /// eagerly drain the upstream unless the operator is inherently
    /// buffering.
    fn start(
        &mut self,
        upstream: Option<ExecutionStream>,
        ctx: &mut ExecutionContext,
    ) -> ExecResult<ExecutionStream>;

    /// Clear per-execution state so the step can be started again.
    fn reset(&mut self) {
        self.base_mut().reset();
    }

    /// Upstream-directed timeout notification (the owning plan walks the
    /// chain backwards). Buffering steps abort accumulation here.
    fn on_timeout(&mut self) {}

    /// False taints the whole plan's cacheability.
    fn can_be_cached(&self) -> bool {
        true
    }

    /// Does running this step constitute a RETURN from the enclosing
    /// script?
    fn contains_return(&self) -> bool {
        false
    }

    /// Whether the last execution actually performed a RETURN. Equal to
    /// [`Step::contains_return`] except for conditional flow steps,
    /// which only know after running.
    fn returned(&self) -> bool {
        self.contains_return()
    }

    /// Deep copy producing an idle step (plan-cache reuse, per-iteration
    /// FOREACH bodies).
    fn boxed_clone(&self) -> Box<dyn Step>;

    /// One line of the human-readable execution tree.
    fn explain(&self, depth: usize) -> String {
        let mut line = format!("{}+ {}", "  ".repeat(depth), self.name());
        if let Some(cost) = self.cost() {
            line.push_str(&format!(" (cost: {} us)", cost.as_micros()));
        }
        line
    }

    /// Accumulated execution time, when profiling was enabled.
    fn cost(&self) -> Option<Duration> {
        self.base().profiled_cost()
    }
}

impl Clone for Box<dyn Step> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// Shared per-step runtime state: the idle/started flag and the optional
/// profiling cost slot.
#[derive(Debug, Default)]
pub struct StepBase {
    started: bool,
    cost: Option<CostTracker>,
}

impl StepBase {
    /// Enforce the idle → started transition.
    pub fn mark_started(&mut self, name: &str) -> ExecResult<()> {
        if self.started {
            return Err(ExecutionError::IllegalState(format!(
                "step '{}' started twice without reset",
                name
            )));
        }
        self.started = true;
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn reset(&mut self) {
        self.started = false;
        if let Some(cost) = &self.cost {
            cost.clear();
        }
    }

    /// Turn on cost attribution for this step; returns the tracker the
    /// plan wires into the profiling stream decorator.
    pub fn enable_profiling(&mut self) -> CostTracker {
        let tracker = self.cost.get_or_insert_with(CostTracker::new);
        tracker.clone()
    }

    pub fn profiled_cost(&self) -> Option<Duration> {
        self.cost.as_ref().map(|c| c.get())
    }
}

// A cloned step starts idle: runtime state never travels with a deep copy.
impl Clone for StepBase {
    fn clone(&self) -> Self {
        StepBase::default()
    }
}

/// Accumulated execution time attributed to one step.
#[derive(Debug, Clone)]
pub struct CostTracker(Arc<Mutex<Duration>>);

impl CostTracker {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Duration::ZERO)))
    }

    pub fn add(&self, d: Duration) {
        *self.0.lock() += d;
    }

    pub fn get(&self) -> Duration {
        *self.0.lock()
    }

    pub fn clear(&self) {
        *self.0.lock() = Duration::ZERO;
    }
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap a step's output stream so that time spent pulling through it is
/// attributed to the step. Only used when profiling is enabled; otherwise
/// the stream is returned untouched and the hot path pays nothing.
pub fn profiled(stream: ExecutionStream, cost: CostTracker) -> ExecutionStream {
    ExecutionStream::new(ProfiledSource {
        upstream: stream,
        cost,
    })
}

struct ProfiledSource {
    upstream: ExecutionStream,
    cost: CostTracker,
}

impl RowSource for ProfiledSource {
    fn fetch(&mut self, ctx: &mut ExecutionContext) -> ExecResult<Option<Row>> {
        let started = Instant::now();
        let result = if self.upstream.has_next(ctx)? {
            Ok(Some(self.upstream.next(ctx)?))
        } else {
            Ok(None)
        };
        self.cost.add(started.elapsed());
        result
    }

    fn close(&mut self, ctx: &mut ExecutionContext) {
        let started = Instant::now();
        self.upstream.close(ctx);
        self.cost.add(started.elapsed());
    }
}

/// Deadline bookkeeping for buffering operators: checked once per
/// buffered input row (and once more per group during finalization).
#[derive(Debug, Clone)]
pub struct TimeoutGuard {
    started: Instant,
    timeout: Duration,
    strategy: TimeoutStrategy,
}

/// Outcome of a deadline check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutCheck {
    Continue,
    /// ReturnPartial strategy: stop consuming, emit what was accumulated
    StopEarly,
}

impl TimeoutGuard {
    pub fn new(timeout: Duration, strategy: TimeoutStrategy) -> Self {
        Self {
            started: Instant::now(),
            timeout,
            strategy,
        }
    }

    pub fn check(&self) -> ExecResult<TimeoutCheck> {
        let elapsed = self.started.elapsed();
        if elapsed < self.timeout {
            return Ok(TimeoutCheck::Continue);
        }
        match self.strategy {
            TimeoutStrategy::ReturnPartial => {
                log::debug!(
                    "timeout after {} ms, returning partial result",
                    elapsed.as_millis()
                );
                Ok(TimeoutCheck::StopEarly)
            }
            TimeoutStrategy::Fail => Err(ExecutionError::Timeout {
                elapsed_ms: elapsed.as_millis() as u64,
            }),
        }
    }
}

/// Pass-through step enforcing a deadline at every pull point.
///
/// Wraps any upstream; non-buffering operators get their timeout handling
/// from this instead of re-implementing deadline checks.
#[derive(Clone)]
pub struct TimeoutStep {
    base: StepBase,
    timeout: Duration,
    strategy: TimeoutStrategy,
}

impl TimeoutStep {
    pub fn new(timeout: Duration, strategy: TimeoutStrategy) -> Self {
        Self {
            base: StepBase::default(),
            timeout,
            strategy,
        }
    }
}

impl Step for TimeoutStep {
    fn name(&self) -> String {
        format!("Timeout[{} ms]", self.timeout.as_millis())
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn start(
        &mut self,
        upstream: Option<ExecutionStream>,
        ctx: &mut ExecutionContext,
    ) -> ExecResult<ExecutionStream> {
        let _ = ctx;
        self.base.mark_started("Timeout")?;
        let upstream = upstream.ok_or_else(|| {
            ExecutionError::IllegalState("Timeout step requires a predecessor".to_string())
        })?;
        let guard = TimeoutGuard::new(self.timeout, self.strategy);
        Ok(ExecutionStream::new(TimeoutSource { upstream, guard }))
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}

struct TimeoutSource {
    upstream: ExecutionStream,
    guard: TimeoutGuard,
}

impl RowSource for TimeoutSource {
    fn fetch(&mut self, ctx: &mut ExecutionContext) -> ExecResult<Option<Row>> {
        match self.guard.check() {
            Ok(TimeoutCheck::Continue) => {}
            Ok(TimeoutCheck::StopEarly) => return Ok(None),
            Err(e) => {
                // Let the upstream release resources before the error
                // reaches the caller.
                self.upstream.close(ctx);
                return Err(e);
            }
        }
        if !self.upstream.has_next(ctx)? {
            return Ok(None);
        }
        Ok(Some(self.upstream.next(ctx)?))
    }

    fn close(&mut self, ctx: &mut ExecutionContext) {
        self.upstream.close(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_twice_without_reset_is_illegal() {
        let mut base = StepBase::default();
        base.mark_started("x").unwrap();
        assert!(base.mark_started("x").is_err());
        base.reset();
        assert!(base.mark_started("x").is_ok());
    }

    #[test]
    fn test_cloned_step_base_is_idle() {
        let mut base = StepBase::default();
        base.mark_started("x").unwrap();
        let copy = base.clone();
        assert!(!copy.is_started());
    }

    #[test]
    fn test_timeout_guard_return_partial() {
        let guard = TimeoutGuard::new(Duration::ZERO, TimeoutStrategy::ReturnPartial);
        assert_eq!(guard.check().unwrap(), TimeoutCheck::StopEarly);
    }

    #[test]
    fn test_timeout_guard_fail() {
        let guard = TimeoutGuard::new(Duration::ZERO, TimeoutStrategy::Fail);
        assert!(matches!(
            guard.check(),
            Err(ExecutionError::Timeout { .. })
        ));
    }
}
