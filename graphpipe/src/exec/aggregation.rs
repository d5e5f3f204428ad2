// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Projection and aggregation
//!
//! [`ProjectStep`] is the streaming per-row projection. [`AggregateStep`]
//! is the buffering GROUP BY operator: it drains its upstream into
//! per-group accumulator state, then emits one row per group in the
//! order the groups were first seen.

use crate::exec::context::ExecutionContext;
use crate::exec::error::{ExecResult, ExecutionError};
use crate::exec::expr::Expression;
use crate::exec::row::Row;
use crate::exec::step::{Step, StepBase, TimeoutCheck, TimeoutGuard, TimeoutStrategy};
use crate::exec::stream::ExecutionStream;
use crate::storage::Value;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// One output column of a projection.
#[derive(Debug, Clone)]
pub struct ProjectionItem {
    pub value: ProjectionValue,
    pub alias: String,
}

#[derive(Debug, Clone)]
pub enum ProjectionValue {
    Expression(Expression),
    Aggregate(AggregateFunction, Expression),
}

impl ProjectionItem {
    pub fn expression(expr: Expression, alias: impl Into<String>) -> Self {
        Self {
            value: ProjectionValue::Expression(expr),
            alias: alias.into(),
        }
    }

    pub fn aggregate(f: AggregateFunction, expr: Expression, alias: impl Into<String>) -> Self {
        Self {
            value: ProjectionValue::Aggregate(f, expr),
            alias: alias.into(),
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.value, ProjectionValue::Aggregate(..))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count { distinct: bool },
    Sum,
    Min,
    Max,
    Avg,
}

/// Per-group, per-item accumulator. Null inputs are skipped by every
/// function, so COUNT counts non-null evaluations only.
#[derive(Debug, Clone)]
enum Accumulator {
    Count {
        distinct: Option<HashSet<Value>>,
        count: i64,
    },
    Sum(Option<Value>),
    Min(Option<Value>),
    Max(Option<Value>),
    Avg { sum: f64, count: i64 },
}

impl Accumulator {
    fn new(f: AggregateFunction) -> Self {
        match f {
            AggregateFunction::Count { distinct } => Accumulator::Count {
                distinct: if distinct { Some(HashSet::new()) } else { None },
                count: 0,
            },
            AggregateFunction::Sum => Accumulator::Sum(None),
            AggregateFunction::Min => Accumulator::Min(None),
            AggregateFunction::Max => Accumulator::Max(None),
            AggregateFunction::Avg => Accumulator::Avg { sum: 0.0, count: 0 },
        }
    }

    fn feed(&mut self, value: Value) -> ExecResult<()> {
        if value.is_null() {
            return Ok(());
        }
        match self {
            Accumulator::Count { distinct, count } => match distinct {
                Some(seen) => {
                    if seen.insert(value) {
                        *count += 1;
                    }
                }
                None => *count += 1,
            },
            Accumulator::Sum(total) => {
                let next = match total.take() {
                    None => numeric(&value)?,
                    Some(acc) => add_numeric(&acc, &value)?,
                };
                *total = Some(next);
            }
            Accumulator::Min(best) => {
                let replace = match best {
                    None => true,
                    Some(b) => value.compare(b) == std::cmp::Ordering::Less,
                };
                if replace {
                    *best = Some(value);
                }
            }
            Accumulator::Max(best) => {
                let replace = match best {
                    None => true,
                    Some(b) => value.compare(b) == std::cmp::Ordering::Greater,
                };
                if replace {
                    *best = Some(value);
                }
            }
            Accumulator::Avg { sum, count } => {
                let v = value.as_f64().ok_or_else(|| {
                    ExecutionError::TypeError(format!(
                        "AVG over non-numeric value of type {}",
                        value.type_name()
                    ))
                })?;
                *sum += v;
                *count += 1;
            }
        }
        Ok(())
    }

    fn finish(self) -> Value {
        match self {
            Accumulator::Count { count, .. } => Value::Integer(count),
            Accumulator::Sum(total) => total.unwrap_or(Value::Null),
            Accumulator::Min(best) => best.unwrap_or(Value::Null),
            Accumulator::Max(best) => best.unwrap_or(Value::Null),
            Accumulator::Avg { sum, count } => {
                if count == 0 {
                    Value::Null
                } else {
                    Value::Float(sum / count as f64)
                }
            }
        }
    }
}

fn numeric(value: &Value) -> ExecResult<Value> {
    if value.is_number() {
        Ok(value.clone())
    } else {
        Err(ExecutionError::TypeError(format!(
            "SUM over non-numeric value of type {}",
            value.type_name()
        )))
    }
}

fn add_numeric(a: &Value, b: &Value) -> ExecResult<Value> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => match x.checked_add(*y) {
            Some(sum) => Ok(Value::Integer(sum)),
            None => Ok(Value::Float(*x as f64 + *y as f64)),
        },
        _ => {
            let (x, y) = (numeric(a)?, numeric(b)?);
            match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => Ok(Value::Float(x + y)),
                _ => Err(ExecutionError::TypeError("SUM over non-number".to_string())),
            }
        }
    }
}

/// Streaming projection: each input row becomes one output row shaped by
/// the projection items. Aggregate items are not allowed here.
#[derive(Clone)]
pub struct ProjectStep {
    base: StepBase,
    items: Vec<ProjectionItem>,
}

impl ProjectStep {
    pub fn new(items: Vec<ProjectionItem>) -> Self {
        Self {
            base: StepBase::default(),
            items,
        }
    }
}

impl Step for ProjectStep {
    fn name(&self) -> String {
        let aliases: Vec<&str> = self.items.iter().map(|i| i.alias.as_str()).collect();
        format!("Project[{}]", aliases.join(", "))
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
        self.base.mark_started("Project")?;
        let upstream = upstream.ok_or_else(|| {
            ExecutionError::IllegalState("Project step requires a predecessor".to_string())
        })?;
        let items = self.items.clone();
        Ok(upstream.map(move |row, ctx| {
            let mut out = Row::new();
            for item in &items {
                match &item.value {
                    ProjectionValue::Expression(expr) => {
                        out.set_property(item.alias.clone(), expr.evaluate(Some(&row), ctx)?);
                    }
                    ProjectionValue::Aggregate(..) => {
                        return Err(ExecutionError::IllegalState(format!(
                            "aggregate '{}' outside a GROUP BY pipeline",
                            item.alias
                        )))
                    }
                }
            }
            Ok(out)
        }))
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}

struct GroupState {
    /// Non-aggregate items, evaluated against the first row of the group.
    plain: Vec<Option<Value>>,
    accumulators: Vec<Option<Accumulator>>,
}

/// Buffering GROUP BY operator.
///
/// Groups are keyed by the evaluated key expressions and emitted in
/// first-seen order. When the group cap is reached, rows that would open
/// a new group are dropped without error. With no key expressions every
/// row falls into one global group, which exists even on empty input so
/// that COUNT over nothing yields zero.
#[derive(Clone)]
pub struct AggregateStep {
    base: StepBase,
    keys: Vec<Expression>,
    items: Vec<ProjectionItem>,
    group_limit: Option<usize>,
    timeout: Option<(Duration, TimeoutStrategy)>,
    timed_out: bool,
}

impl AggregateStep {
    pub fn new(keys: Vec<Expression>, items: Vec<ProjectionItem>) -> Self {
        Self {
            base: StepBase::default(),
            keys,
            items,
            group_limit: None,
            timeout: None,
            timed_out: false,
        }
    }

    /// Cap on the number of distinct groups held in memory.
    pub fn with_group_limit(mut self, limit: usize) -> Self {
        self.group_limit = Some(limit);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration, strategy: TimeoutStrategy) -> Self {
        self.timeout = Some((timeout, strategy));
        self
    }

    fn new_group(&self, row: &Row, ctx: &ExecutionContext) -> ExecResult<GroupState> {
        let mut plain = Vec::with_capacity(self.items.len());
        let mut accumulators = Vec::with_capacity(self.items.len());
        for item in &self.items {
            match &item.value {
                ProjectionValue::Expression(expr) => {
                    plain.push(Some(expr.evaluate(Some(row), ctx)?));
                    accumulators.push(None);
                }
                ProjectionValue::Aggregate(f, _) => {
                    plain.push(None);
                    accumulators.push(Some(Accumulator::new(*f)));
                }
            }
        }
        Ok(GroupState {
            plain,
            accumulators,
        })
    }

    fn feed_group(&self, group: &mut GroupState, row: &Row, ctx: &ExecutionContext) -> ExecResult<()> {
        for (item, acc) in self.items.iter().zip(group.accumulators.iter_mut()) {
            if let (ProjectionValue::Aggregate(_, expr), Some(acc)) = (&item.value, acc) {
                acc.feed(expr.evaluate(Some(row), ctx)?)?;
            }
        }
        Ok(())
    }

    /// Drain the upstream into per-group state. The caller closes the
    /// upstream whether this succeeds or fails.
    fn collect_groups(
        &self,
        upstream: &mut ExecutionStream,
        ctx: &mut ExecutionContext,
        guard: Option<&TimeoutGuard>,
        order: &mut Vec<Vec<Value>>,
        groups: &mut HashMap<Vec<Value>, GroupState>,
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
            let mut key = Vec::with_capacity(self.keys.len());
            for expr in &self.keys {
                key.push(expr.evaluate(Some(&row), ctx)?);
            }
            if let Some(group) = groups.get_mut(&key) {
                self.feed_group(group, &row, ctx)?;
                continue;
            }
            if let Some(limit) = self.group_limit {
                if groups.len() >= limit {
                    log::trace!("group cap {} reached, dropping row", limit);
                    continue;
                }
            }
            let mut group = self.new_group(&row, ctx)?;
            self.feed_group(&mut group, &row, ctx)?;
            order.push(key.clone());
            groups.insert(key, group);
        }
    }

    fn finalize(&self, group: GroupState) -> Row {
        let mut out = Row::new();
        let values = group.plain.into_iter().zip(group.accumulators);
        for (item, (plain, acc)) in self.items.iter().zip(values) {
            let value = match (plain, acc) {
                (Some(v), _) => v,
                (None, Some(acc)) => acc.finish(),
                (None, None) => Value::Null,
            };
            out.set_property(item.alias.clone(), value);
        }
        out
    }
}

impl Step for AggregateStep {
    fn name(&self) -> String {
        format!("Aggregate[{} keys, {} items]", self.keys.len(), self.items.len())
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
        self.base.mark_started("Aggregate")?;
        let mut upstream = upstream.ok_or_else(|| {
            ExecutionError::IllegalState("Aggregate step requires a predecessor".to_string())
        })?;
        let guard = self
            .timeout
            .map(|(timeout, strategy)| TimeoutGuard::new(timeout, strategy));

        let mut order: Vec<Vec<Value>> = Vec::new();
        let mut groups: HashMap<Vec<Value>, GroupState> = HashMap::new();
        let collected =
            self.collect_groups(&mut upstream, ctx, guard.as_ref(), &mut order, &mut groups);
        upstream.close(ctx);
        collected?;

        // A keyless aggregation always has exactly one group.
        if self.keys.is_empty() && groups.is_empty() {
            let empty = Row::new();
            let group = self.new_group(&empty, ctx)?;
            order.push(Vec::new());
            groups.insert(Vec::new(), group);
        }

        let mut out = Vec::with_capacity(order.len());
        for key in order {
            if let Some(guard) = &guard {
                match guard.check()? {
                    TimeoutCheck::Continue => {}
                    TimeoutCheck::StopEarly => break,
                }
            }
            if let Some(group) = groups.remove(&key) {
                out.push(self.finalize(group));
            }
        }
        Ok(ExecutionStream::from_rows(out))
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}
