// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! DISTINCT
//!
//! Streaming dedup. Rows carrying a persistent identity are deduplicated
//! by identity alone, which is cheap and unbounded. Identity-less rows
//! fall back to hashing their full property map, and that set is capped
//! because a value-hash set over an unbounded stream is an OOM risk.

use crate::exec::context::ExecutionContext;
use crate::exec::error::{ExecResult, ExecutionError};
use crate::exec::row::{Row, RowKey};
use crate::exec::step::{Step, StepBase};
use crate::exec::stream::{ExecutionStream, RowSource};
use crate::storage::Rid;
use std::collections::HashSet;

pub const DEFAULT_VALUE_SET_CAP: usize = 1_000_000;

#[derive(Clone)]
pub struct DistinctStep {
    base: StepBase,
    value_set_cap: usize,
}

impl DistinctStep {
    pub fn new() -> Self {
        Self {
            base: StepBase::default(),
            value_set_cap: DEFAULT_VALUE_SET_CAP,
        }
    }

    /// Cap on the value-hash fallback set (identity dedup is unbounded).
    pub fn with_value_set_cap(mut self, cap: usize) -> Self {
        self.value_set_cap = cap;
        self
    }
}

impl Default for DistinctStep {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for DistinctStep {
    fn name(&self) -> String {
        "Distinct".to_string()
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
        _ctx: &mut ExecutionContext,
    ) -> ExecResult<ExecutionStream> {
        self.base.mark_started("Distinct")?;
        let upstream = upstream.ok_or_else(|| {
            ExecutionError::IllegalState("Distinct step requires a predecessor".to_string())
        })?;
        Ok(ExecutionStream::new(DistinctSource {
            upstream,
            seen_rids: HashSet::new(),
            seen_values: HashSet::new(),
            value_set_cap: self.value_set_cap,
        }))
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}

struct DistinctSource {
    upstream: ExecutionStream,
    seen_rids: HashSet<Rid>,
    seen_values: HashSet<RowKey>,
    value_set_cap: usize,
}

impl RowSource for DistinctSource {
    fn fetch(&mut self, ctx: &mut ExecutionContext) -> ExecResult<Option<Row>> {
        loop {
            if !self.upstream.has_next(ctx)? {
                return Ok(None);
            }
            let row = self.upstream.next(ctx)?;
            let fresh = match row.identity().filter(|rid| rid.is_persistent()) {
                Some(rid) => self.seen_rids.insert(rid),
                None => {
                    let key = row.value_key();
                    if !self.seen_values.contains(&key)
                        && self.seen_values.len() >= self.value_set_cap
                    {
                        self.upstream.close(ctx);
                        return Err(ExecutionError::ResourceLimitExceeded {
                            operator: "Distinct",
                            count: self.seen_values.len() + 1,
                            limit: self.value_set_cap,
                        });
                    }
                    self.seen_values.insert(key)
                }
            };
            if fresh {
                return Ok(Some(row));
            }
        }
    }

    fn close(&mut self, ctx: &mut ExecutionContext) {
        self.upstream.close(ctx);
    }
}
