// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Execution plans
//!
//! A plan owns an ordered chain of steps. Starting the plan threads each
//! step's output stream into the next step and hands the caller the last
//! stream; nothing runs until the caller pulls. Mutation plans are the
//! exception: they drain themselves on start so that writes happen even
//! if the caller never iterates the result.

use crate::exec::context::ExecutionContext;
use crate::exec::error::{ExecResult, ExecutionError};
use crate::exec::row::QueryResult;
use crate::exec::step::{profiled, Step};
use crate::exec::stream::ExecutionStream;
use std::time::Instant;

/// Whether starting the plan already performs its work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    /// Work happens as the caller pulls rows.
    Lazy,
    /// The plan drains itself on start; the returned stream replays the
    /// buffered rows. Used for INSERT/UPDATE/DELETE pipelines.
    Eager,
}

#[derive(Clone)]
pub struct ExecutionPlan {
    steps: Vec<Box<dyn Step>>,
    mode: PlanMode,
    profile: bool,
}

impl ExecutionPlan {
    pub fn lazy(steps: Vec<Box<dyn Step>>) -> Self {
        Self {
            steps,
            mode: PlanMode::Lazy,
            profile: false,
        }
    }

    pub fn eager(steps: Vec<Box<dyn Step>>) -> Self {
        Self {
            steps,
            mode: PlanMode::Eager,
            profile: false,
        }
    }

    /// Enable per-step cost attribution for the next execution.
    pub fn with_profiling(mut self) -> Self {
        self.profile = true;
        self
    }

    pub fn mode(&self) -> PlanMode {
        self.mode
    }

    pub fn push(&mut self, step: Box<dyn Step>) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Box<dyn Step>] {
        &self.steps
    }

    /// Start the chain and return its output stream.
    ///
    /// In eager mode the stream is already fully materialized when this
    /// returns. If any step fails to start, the streams built so far are
    /// closed before the error propagates.
    pub fn execute(&mut self, ctx: &mut ExecutionContext) -> ExecResult<ExecutionStream> {
        if self.steps.is_empty() {
            return Err(ExecutionError::IllegalState(
                "cannot execute an empty plan".to_string(),
            ));
        }
        let mut current: Option<ExecutionStream> = None;
        for step in &mut self.steps {
            let stream = match step.start(current.take(), ctx) {
                Ok(stream) => stream,
                Err(e) => {
                    if let Some(mut stream) = current.take() {
                        stream.close(ctx);
                    }
                    return Err(e);
                }
            };
            let stream = if self.profile {
                profiled(stream, step.base_mut().enable_profiling())
            } else {
                stream
            };
            current = Some(stream);
        }
        // The loop always leaves a stream behind for a non-empty chain.
        let stream = current.ok_or_else(|| {
            ExecutionError::IllegalState("step chain produced no stream".to_string())
        })?;
        match self.mode {
            PlanMode::Lazy => Ok(stream),
            PlanMode::Eager => match stream.drain(ctx) {
                Ok(rows) => Ok(ExecutionStream::from_rows(rows)),
                Err(e) => {
                    if matches!(e, ExecutionError::Timeout { .. }) {
                        self.send_timeout();
                    }
                    Err(e)
                }
            },
        }
    }

    /// Execute to completion and materialize the result. Mutation steps
    /// emit one row per touched record, so the drained count doubles as
    /// the affected count.
    pub fn run(&mut self, ctx: &mut ExecutionContext) -> ExecResult<QueryResult> {
        let started = Instant::now();
        let rows = match self.execute(ctx).and_then(|stream| stream.drain(ctx)) {
            Ok(rows) => rows,
            Err(e) => {
                if matches!(e, ExecutionError::Timeout { .. }) {
                    self.send_timeout();
                }
                return Err(e);
            }
        };
        let rows_affected = rows.len();
        Ok(QueryResult {
            rows,
            rows_affected,
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Return every step to idle so the plan can be executed again.
    pub fn reset(&mut self) {
        for step in &mut self.steps {
            step.reset();
        }
    }

    /// A plan is reusable from the cache only if every step is.
    pub fn can_be_cached(&self) -> bool {
        self.steps.iter().all(|s| s.can_be_cached())
    }

    /// True if running this plan ends the enclosing script.
    pub fn contains_return(&self) -> bool {
        self.steps.iter().any(|s| s.contains_return())
    }

    /// True if the last execution performed a RETURN, including returns
    /// that conditional flow steps only discovered at run time.
    pub fn returned(&self) -> bool {
        self.steps.iter().any(|s| s.returned())
    }

    /// Propagate a timeout to the steps, last-to-first, so buffering
    /// operators stop accumulating before their producers are told.
    pub fn send_timeout(&mut self) {
        for step in self.steps.iter_mut().rev() {
            step.on_timeout();
        }
    }

    /// Human-readable execution tree.
    pub fn explain(&self) -> String {
        self.explain_at(0)
    }

    pub fn explain_at(&self, depth: usize) -> String {
        self.steps
            .iter()
            .map(|s| s.explain(depth))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
