// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Basic streaming operators
//!
//! Non-buffering steps: each one decorates its upstream stream and emits
//! rows as they are pulled, holding at most one row of state.

use crate::exec::context::ExecutionContext;
use crate::exec::error::{ExecResult, ExecutionError};
use crate::exec::expr::Expression;
use crate::exec::row::Row;
use crate::exec::step::{Step, StepBase};
use crate::exec::stream::{ExecutionStream, RowSource};
use crate::storage::{Record, Rid, Value};
use std::collections::VecDeque;

/// Full scan of a class (subclasses included), lazily loading one record
/// per pull.
#[derive(Clone)]
pub struct ScanClassStep {
    base: StepBase,
    class: String,
}

impl ScanClassStep {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            base: StepBase::default(),
            class: class.into(),
        }
    }
}

impl Step for ScanClassStep {
    fn name(&self) -> String {
        format!("ScanClass[{}]", self.class)
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
        self.base.mark_started("ScanClass")?;
        if upstream.is_some() {
            return Err(ExecutionError::IllegalState(
                "ScanClass is a source step and takes no input".to_string(),
            ));
        }
        let store = ctx.require_store()?;
        let records = store.scan_class(&self.class)?;
        Ok(ExecutionStream::new(ScanSource {
            records: records.into(),
        }))
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}

struct ScanSource {
    records: VecDeque<Record>,
}

impl RowSource for ScanSource {
    fn fetch(&mut self, _ctx: &mut ExecutionContext) -> ExecResult<Option<Row>> {
        Ok(self.records.pop_front().map(|r| Row::from_record(&r)))
    }
}

/// Keeps rows for which the predicate is strictly true.
#[derive(Clone)]
pub struct FilterStep {
    base: StepBase,
    predicate: Expression,
}

impl FilterStep {
    pub fn new(predicate: Expression) -> Self {
        Self {
            base: StepBase::default(),
            predicate,
        }
    }
}

impl Step for FilterStep {
    fn name(&self) -> String {
        format!("Filter[{}]", self.predicate)
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
        self.base.mark_started("Filter")?;
        let upstream = upstream.ok_or_else(|| {
            ExecutionError::IllegalState("Filter step requires a predecessor".to_string())
        })?;
        let predicate = self.predicate.clone();
        Ok(upstream.filter(move |row, ctx| predicate.evaluate_bool(Some(row), ctx)))
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}

/// Stops pulling upstream after `limit` rows.
#[derive(Clone)]
pub struct LimitStep {
    base: StepBase,
    limit: usize,
}

impl LimitStep {
    pub fn new(limit: usize) -> Self {
        Self {
            base: StepBase::default(),
            limit,
        }
    }
}

impl Step for LimitStep {
    fn name(&self) -> String {
        format!("Limit[{}]", self.limit)
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
        self.base.mark_started("Limit")?;
        let upstream = upstream.ok_or_else(|| {
            ExecutionError::IllegalState("Limit step requires a predecessor".to_string())
        })?;
        Ok(upstream.limit(self.limit))
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}

/// Discards the first `skip` rows.
#[derive(Clone)]
pub struct SkipStep {
    base: StepBase,
    skip: usize,
}

impl SkipStep {
    pub fn new(skip: usize) -> Self {
        Self {
            base: StepBase::default(),
            skip,
        }
    }
}

impl Step for SkipStep {
    fn name(&self) -> String {
        format!("Skip[{}]", self.skip)
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
        self.base.mark_started("Skip")?;
        let upstream = upstream.ok_or_else(|| {
            ExecutionError::IllegalState("Skip step requires a predecessor".to_string())
        })?;
        Ok(ExecutionStream::new(SkipSource {
            upstream,
            remaining: self.skip,
        }))
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}

struct SkipSource {
    upstream: ExecutionStream,
    remaining: usize,
}

impl RowSource for SkipSource {
    fn fetch(&mut self, ctx: &mut ExecutionContext) -> ExecResult<Option<Row>> {
        while self.remaining > 0 {
            if !self.upstream.has_next(ctx)? {
                return Ok(None);
            }
            self.upstream.next(ctx)?;
            self.remaining -= 1;
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

/// Replaces each row with the record(s) a link-valued property points to.
///
/// The source property must hold a link or a list of links; anything else
/// is a query error, not a silent skip.
#[derive(Clone)]
pub struct ExpandStep {
    base: StepBase,
    property: String,
}

impl ExpandStep {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            base: StepBase::default(),
            property: property.into(),
        }
    }

    fn links_of(&self, row: &Row) -> ExecResult<Vec<Rid>> {
        match row.get_property(&self.property) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Link(rid)) => Ok(vec![*rid]),
            Some(Value::List(items)) => {
                let mut rids = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Link(rid) => rids.push(*rid),
                        other => {
                            return Err(ExecutionError::InvalidExpandSource(format!(
                                "expand over '{}' found a {} inside the list",
                                self.property,
                                other.type_name()
                            )))
                        }
                    }
                }
                Ok(rids)
            }
            Some(other) => Err(ExecutionError::InvalidExpandSource(format!(
                "cannot expand property '{}' of type {}",
                self.property,
                other.type_name()
            ))),
        }
    }
}

impl Step for ExpandStep {
    fn name(&self) -> String {
        format!("Expand[{}]", self.property)
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
        self.base.mark_started("Expand")?;
        let upstream = upstream.ok_or_else(|| {
            ExecutionError::IllegalState("Expand step requires a predecessor".to_string())
        })?;
        let step = self.clone();
        Ok(upstream.flat_map(move |row, ctx| {
            let rids = step.links_of(&row)?;
            let store = ctx.require_store()?;
            let records: Vec<Record> = rids
                .into_iter()
                .map(|rid| store.load(rid))
                .collect::<Result<_, _>>()?;
            Ok(ExecutionStream::from_rows(
                records.iter().map(Row::from_record).collect(),
            ))
        }))
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use std::sync::Arc;

    fn ctx_with_store(store: MemoryStore) -> ExecutionContext {
        ExecutionContext::new().with_store(Arc::new(store))
    }

    #[test]
    fn test_scan_class_emits_all_records() {
        let store = MemoryStore::new();
        store.insert("Person", vec![("name", Value::from("ann"))]);
        store.insert("Person", vec![("name", Value::from("bob"))]);
        let mut ctx = ctx_with_store(store);

        let mut step = ScanClassStep::new("Person");
        let stream = step.start(None, &mut ctx).unwrap();
        let rows = stream.drain(&mut ctx).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_scan_rejects_upstream() {
        let mut ctx = ctx_with_store(MemoryStore::new());
        let mut step = ScanClassStep::new("Person");
        let err = step
            .start(Some(ExecutionStream::empty()), &mut ctx)
            .unwrap_err();
        assert!(matches!(err, ExecutionError::IllegalState(_)));
    }

    #[test]
    fn test_skip_discards_prefix() {
        let mut ctx = ExecutionContext::new();
        let rows: Vec<Row> = (0..5)
            .map(|i| {
                let mut r = Row::new();
                r.set_property("n", Value::Integer(i));
                r
            })
            .collect();
        let mut step = SkipStep::new(3);
        let stream = step
            .start(Some(ExecutionStream::from_rows(rows)), &mut ctx)
            .unwrap();
        let out = stream.drain(&mut ctx).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get_property("n"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_expand_rejects_non_link() {
        let mut ctx = ctx_with_store(MemoryStore::new());
        let mut row = Row::new();
        row.set_property("friends", Value::Integer(7));
        let mut step = ExpandStep::new("friends");
        let stream = step
            .start(Some(ExecutionStream::from_rows(vec![row])), &mut ctx)
            .unwrap();
        let err = stream.drain(&mut ctx).unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidExpandSource(_)));
    }

    #[test]
    fn test_expand_follows_links() {
        let store = MemoryStore::new();
        let target = store.insert("Person", vec![("name", Value::from("zoe"))]);
        let mut ctx = ctx_with_store(store);

        let mut row = Row::new();
        row.set_property("friend", Value::Link(target));
        let mut step = ExpandStep::new("friend");
        let stream = step
            .start(Some(ExecutionStream::from_rows(vec![row])), &mut ctx)
            .unwrap();
        let out = stream.drain(&mut ctx).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_property("name"), Some(&Value::from("zoe")));
    }
}
