// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! ORDER BY
//!
//! Buffering sort with two memory controls: a hard buffer cap that fails
//! the query, and an optional result cap (LIMIT pushed below the sort)
//! that compacts the buffer whenever it grows to twice the cap, keeping
//! memory proportional to the requested prefix.

use crate::exec::context::ExecutionContext;
use crate::exec::error::{ExecResult, ExecutionError};
use crate::exec::expr::Expression;
use crate::exec::row::Row;
use crate::exec::step::{Step, StepBase, TimeoutCheck, TimeoutGuard, TimeoutStrategy};
use crate::exec::stream::ExecutionStream;
use std::cmp::Ordering;
use std::time::Duration;

/// One sort key.
#[derive(Debug, Clone)]
pub struct SortItem {
    pub expr: Expression,
    pub ascending: bool,
}

impl SortItem {
    pub fn asc(expr: Expression) -> Self {
        Self {
            expr,
            ascending: true,
        }
    }

    pub fn desc(expr: Expression) -> Self {
        Self {
            expr,
            ascending: false,
        }
    }
}

#[derive(Clone)]
pub struct SortStep {
    base: StepBase,
    items: Vec<SortItem>,
    /// LIMIT pushed into the sort; buffer compacts at twice this size.
    max_results: Option<usize>,
    /// Hard cap for the unbounded sort; exceeding it aborts the query.
    /// Ignored when `max_results` bounds the buffer through compaction.
    max_buffer_size: Option<usize>,
    timeout: Option<(Duration, TimeoutStrategy)>,
    timed_out: bool,
}

impl SortStep {
    pub fn new(items: Vec<SortItem>) -> Self {
        Self {
            base: StepBase::default(),
            items,
            max_results: None,
            max_buffer_size: None,
            timeout: None,
            timed_out: false,
        }
    }

    pub fn with_max_results(mut self, n: usize) -> Self {
        self.max_results = Some(n);
        self
    }

    pub fn with_max_buffer_size(mut self, n: usize) -> Self {
        self.max_buffer_size = Some(n);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration, strategy: TimeoutStrategy) -> Self {
        self.timeout = Some((timeout, strategy));
        self
    }

    fn compare(&self, a: &[crate::storage::Value], b: &[crate::storage::Value]) -> Ordering {
        for (item, (x, y)) in self.items.iter().zip(a.iter().zip(b.iter())) {
            let ord = x.compare(y);
            let ord = if item.ascending { ord } else { ord.reverse() };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    fn sort_buffer(&self, buffer: &mut Vec<(Vec<crate::storage::Value>, Row)>) {
        buffer.sort_by(|(a, _), (b, _)| self.compare(a, b));
    }

    /// Pull the whole upstream into the keyed buffer. The caller closes
    /// the upstream whether this succeeds or fails.
    fn fill_buffer(
        &self,
        upstream: &mut ExecutionStream,
        ctx: &mut ExecutionContext,
        guard: Option<&TimeoutGuard>,
        buffer: &mut Vec<(Vec<crate::storage::Value>, Row)>,
    ) -> ExecResult<()> {
        loop {
            if self.timed_out {
                return Ok(());
            }
            if let Some(guard) = guard {
                match guard.check()? {
                    TimeoutCheck::Continue => {}
                    TimeoutCheck::StopEarly => return Ok(()),
                }
            }
            if !upstream.has_next(ctx)? {
                return Ok(());
            }
            let row = upstream.next(ctx)?;
            if self.max_results.is_none() {
                if let Some(cap) = self.max_buffer_size {
                    if buffer.len() >= cap {
                        return Err(ExecutionError::ResourceLimitExceeded {
                            operator: "Sort",
                            count: buffer.len() + 1,
                            limit: cap,
                        });
                    }
                }
            }
            let mut key = Vec::with_capacity(self.items.len());
            for item in &self.items {
                key.push(item.expr.evaluate(Some(&row), ctx)?);
            }
            buffer.push((key, row));
            if let Some(k) = self.max_results {
                if buffer.len() >= k.saturating_mul(2).max(2) {
                    self.sort_buffer(buffer);
                    buffer.truncate(k);
                }
            }
        }
    }
}

impl Step for SortStep {
    fn name(&self) -> String {
        let dirs: Vec<&str> = self
            .items
            .iter()
            .map(|i| if i.ascending { "asc" } else { "desc" })
            .collect();
        format!("Sort[{}]", dirs.join(", "))
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn reset(&mut self) {
        self.timed_out = false;
        self.base.reset();
    }

    fn on_timeout(&mut self) {
        self.timed_out = true;
    }

    fn start(
        &mut self,
        upstream: Option<ExecutionStream>,
        ctx: &mut ExecutionContext,
    ) -> ExecResult<ExecutionStream> {
        self.base.mark_started("Sort")?;
        let mut upstream = upstream.ok_or_else(|| {
            ExecutionError::IllegalState("Sort step requires a predecessor".to_string())
        })?;
        let guard = self
            .timeout
            .map(|(timeout, strategy)| TimeoutGuard::new(timeout, strategy));

        let mut buffer: Vec<(Vec<crate::storage::Value>, Row)> = Vec::new();
        let filled = self.fill_buffer(&mut upstream, ctx, guard.as_ref(), &mut buffer);
        upstream.close(ctx);
        filled?;

        self.sort_buffer(&mut buffer);
        if let Some(k) = self.max_results {
            buffer.truncate(k);
        }
        Ok(ExecutionStream::from_rows(
            buffer.into_iter().map(|(_, row)| row).collect(),
        ))
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}
