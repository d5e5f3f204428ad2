// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Root alias prefetch
//!
//! The root alias of a pattern is resolved once by a nested plan and the
//! result is memoized on the context. Later edge steps consult the same
//! cache when validating candidates for an alias that was prefetched, so
//! the nested plan runs exactly once per execution.

use crate::exec::context::ExecutionContext;
use crate::exec::error::{ExecResult, ExecutionError};
use crate::exec::pattern::PatternNode;
use crate::exec::plan::ExecutionPlan;
use crate::exec::row::Row;
use crate::exec::step::{Step, StepBase};
use crate::exec::stream::ExecutionStream;
use crate::storage::Value;

/// Runs the nested candidate plan for an alias and memoizes its rows.
#[derive(Clone)]
pub struct MatchPrefetchStep {
    base: StepBase,
    alias: String,
    plan: ExecutionPlan,
}

impl MatchPrefetchStep {
    pub fn new(alias: impl Into<String>, plan: ExecutionPlan) -> Self {
        Self {
            base: StepBase::default(),
            alias: alias.into(),
            plan,
        }
    }
}

impl Step for MatchPrefetchStep {
    fn name(&self) -> String {
        format!("MatchPrefetch[{}]", self.alias)
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    /// Memoized rows are a data snapshot, never reusable across
    /// executions.
    fn can_be_cached(&self) -> bool {
        false
    }

    fn start(
        &mut self,
        upstream: Option<ExecutionStream>,
        ctx: &mut ExecutionContext,
    ) -> ExecResult<ExecutionStream> {
        self.base.mark_started("MatchPrefetch")?;
        if upstream.is_some() {
            return Err(ExecutionError::IllegalState(
                "MatchPrefetch is a source step and takes no input".to_string(),
            ));
        }
        let mut child = ctx.child();
        let rows = self.plan.execute(&mut child)?.drain(&mut child)?;
        ctx.cache_prefetched(&self.alias, rows);
        Ok(ExecutionStream::empty())
    }

    fn reset(&mut self) {
        self.plan.reset();
        self.base.reset();
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}

/// Streams the memoized root candidates as the initial binding rows.
#[derive(Clone)]
pub struct MatchFirstStep {
    base: StepBase,
    node: PatternNode,
}

impl MatchFirstStep {
    pub fn new(node: PatternNode) -> Self {
        Self {
            base: StepBase::default(),
            node,
        }
    }

    /// Same per-candidate checks the edge steps apply to their targets.
    /// The nested plan usually enforces these already, but a hand-built
    /// plan may prefetch from a wider source than the node allows.
    fn accepts(
        &self,
        candidate: crate::storage::Rid,
        row: &Row,
        ctx: &ExecutionContext,
    ) -> ExecResult<bool> {
        if let Some(rid) = self.node.rid {
            if candidate != rid {
                return Ok(false);
            }
        }
        if let Some(bucket) = self.node.bucket {
            if candidate.bucket != bucket {
                return Ok(false);
            }
        }
        if let Some(class) = &self.node.class {
            let store = ctx.require_store()?;
            match store.record_class(candidate) {
                Some(actual) if store.is_subclass(&actual, class) => {}
                _ => return Ok(false),
            }
        }
        if let Some(filter) = &self.node.filter {
            if !filter.evaluate_bool(Some(row), ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Step for MatchFirstStep {
    fn name(&self) -> String {
        format!("MatchFirst[{}]", self.node.alias)
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
        self.base.mark_started("MatchFirst")?;
        if let Some(mut upstream) = upstream {
            // The prefetch step before us emits nothing; release it.
            upstream.close(ctx);
        }
        let cached = ctx.prefetched_rows(&self.node.alias).ok_or_else(|| {
            ExecutionError::IllegalState(format!(
                "alias '{}' was not prefetched before matching",
                self.node.alias
            ))
        })?;
        let alias = self.node.alias.clone();
        let mut bindings = Vec::with_capacity(cached.len());
        for row in cached {
            let rid = row.identity().ok_or_else(|| {
                ExecutionError::IllegalState(format!(
                    "prefetched candidate for '{}' has no identity",
                    alias
                ))
            })?;
            if !self.accepts(rid, &row, ctx)? {
                continue;
            }
            let mut binding = Row::new();
            binding.set_property(alias.clone(), Value::Link(rid));
            bindings.push(binding);
        }
        Ok(ExecutionStream::from_rows(bindings))
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}
