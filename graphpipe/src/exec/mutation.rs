// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Mutation operators
//!
//! Steps for INSERT/UPDATE/DELETE pipelines. Mutation plans run in eager
//! mode, so these steps still stream row-by-row internally but the plan
//! drains them on start. Writes go through the context's store; commit
//! boundaries come from the transaction coordinator's batch size.

use crate::exec::context::ExecutionContext;
use crate::exec::error::{ExecResult, ExecutionError};
use crate::exec::expr::{BinaryOp, Expression};
use crate::exec::row::{Row, UpdatableRow};
use crate::exec::step::{Step, StepBase};
use crate::exec::stream::{ExecutionStream, RowSource};
use crate::storage::{Record, Rid, Value};

/// Source step emitting `count` fresh rows of a class, each with a
/// temporary identity until saved.
#[derive(Clone)]
pub struct CreateRecordsStep {
    base: StepBase,
    class: String,
    count: usize,
}

impl CreateRecordsStep {
    pub fn new(class: impl Into<String>, count: usize) -> Self {
        Self {
            base: StepBase::default(),
            class: class.into(),
            count,
        }
    }
}

impl Step for CreateRecordsStep {
    fn name(&self) -> String {
        format!("CreateRecords[{} x{}]", self.class, self.count)
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
        self.base.mark_started("CreateRecords")?;
        if upstream.is_some() {
            return Err(ExecutionError::IllegalState(
                "CreateRecords is a source step and takes no input".to_string(),
            ));
        }
        let rows = (0..self.count)
            .map(|i| {
                let mut row = Row::new();
                row.set_identity(Rid::new(-1, -(i as i64) - 1));
                row.set_metadata("$class", Value::from(self.class.as_str()));
                row
            })
            .collect();
        Ok(ExecutionStream::from_rows(rows))
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}

/// Streaming SET: evaluates each assignment against the incoming row and
/// writes the result back into it.
#[derive(Clone)]
pub struct SetPropertiesStep {
    base: StepBase,
    assignments: Vec<(String, Expression)>,
}

impl SetPropertiesStep {
    pub fn new(assignments: Vec<(String, Expression)>) -> Self {
        Self {
            base: StepBase::default(),
            assignments,
        }
    }
}

impl Step for SetPropertiesStep {
    fn name(&self) -> String {
        let names: Vec<&str> = self.assignments.iter().map(|(n, _)| n.as_str()).collect();
        format!("SetProperties[{}]", names.join(", "))
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
        self.base.mark_started("SetProperties")?;
        let upstream = upstream.ok_or_else(|| {
            ExecutionError::IllegalState("SetProperties step requires a predecessor".to_string())
        })?;
        let assignments = self.assignments.clone();
        Ok(upstream.map(move |mut row, ctx| {
            for (name, expr) in &assignments {
                let value = expr.evaluate(Some(&row), ctx)?;
                row.set_property(name.clone(), value);
            }
            Ok(row)
        }))
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}

/// Persists each incoming row and emits it with its durable identity.
///
/// The target class comes from the row's `$class` metadata (INSERT path)
/// or from the store's record of the existing identity (UPDATE path).
#[derive(Clone)]
pub struct SaveStep {
    base: StepBase,
}

impl SaveStep {
    pub fn new() -> Self {
        Self {
            base: StepBase::default(),
        }
    }
}

impl Default for SaveStep {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for SaveStep {
    fn name(&self) -> String {
        "Save".to_string()
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn can_be_cached(&self) -> bool {
        false
    }

    fn start(
        &mut self,
        upstream: Option<ExecutionStream>,
        _ctx: &mut ExecutionContext,
    ) -> ExecResult<ExecutionStream> {
        self.base.mark_started("Save")?;
        let upstream = upstream.ok_or_else(|| {
            ExecutionError::IllegalState("Save step requires a predecessor".to_string())
        })?;
        Ok(ExecutionStream::new(SaveSource {
            upstream,
            saved: 0,
        }))
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}

struct SaveSource {
    upstream: ExecutionStream,
    saved: usize,
}

impl SaveSource {
    fn class_of(row: &Row, ctx: &ExecutionContext) -> ExecResult<String> {
        if let Some(Value::String(class)) = row.get_metadata("$class") {
            return Ok(class.clone());
        }
        let rid = row.identity().ok_or_else(|| {
            ExecutionError::IllegalState("cannot save a row without identity or class".to_string())
        })?;
        ctx.require_store()?
            .record_class(rid)
            .ok_or_else(|| ExecutionError::IllegalState(format!("no class known for {}", rid)))
    }
}

impl RowSource for SaveSource {
    fn fetch(&mut self, ctx: &mut ExecutionContext) -> ExecResult<Option<Row>> {
        if !self.upstream.has_next(ctx)? {
            return Ok(None);
        }
        let mut row = self.upstream.next(ctx)?;
        let class = Self::class_of(&row, ctx)?;
        let rid = row.identity().unwrap_or_else(|| Rid::new(-1, -1));
        let mut record = Record::new(rid, class);
        for (name, value) in row.properties() {
            record.set(name, value.clone());
        }
        let store = ctx.require_store()?;
        let saved_rid = store.save(&record)?;
        row.set_identity(saved_rid);
        row.remove_metadata("$class");

        self.saved += 1;
        let txn = ctx.transaction();
        if let Some(batch) = txn.batch_size() {
            if batch > 0 && self.saved % batch == 0 {
                txn.commit()?;
                txn.begin()?;
            }
        }
        Ok(Some(row))
    }

    fn close(&mut self, ctx: &mut ExecutionContext) {
        self.upstream.close(ctx);
    }
}

/// UPDATE core: reloads each row's record, applies the assignments
/// through an [`UpdatableRow`] so previous values stay observable, and
/// saves the result.
#[derive(Clone)]
pub struct UpdateStep {
    base: StepBase,
    assignments: Vec<(String, Expression)>,
    return_before: bool,
}

impl UpdateStep {
    pub fn new(assignments: Vec<(String, Expression)>) -> Self {
        Self {
            base: StepBase::default(),
            assignments,
            return_before: false,
        }
    }

    /// Emit the pre-mutation snapshot instead of the updated row.
    pub fn returning_before(mut self) -> Self {
        self.return_before = true;
        self
    }
}

impl Step for UpdateStep {
    fn name(&self) -> String {
        "Update".to_string()
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn can_be_cached(&self) -> bool {
        false
    }

    fn start(
        &mut self,
        upstream: Option<ExecutionStream>,
        _ctx: &mut ExecutionContext,
    ) -> ExecResult<ExecutionStream> {
        self.base.mark_started("Update")?;
        let upstream = upstream.ok_or_else(|| {
            ExecutionError::IllegalState("Update step requires a predecessor".to_string())
        })?;
        let assignments = self.assignments.clone();
        let return_before = self.return_before;
        Ok(upstream.map(move |row, ctx| {
            let rid = row.identity().ok_or_else(|| {
                ExecutionError::IllegalState("cannot update a row without identity".to_string())
            })?;
            let store = ctx.require_store()?;
            let mut updatable = UpdatableRow::new(store.load(rid)?);
            for (name, expr) in &assignments {
                let value = expr.evaluate(Some(&row), ctx)?;
                updatable.set_property(name.clone(), value);
            }
            store.save(updatable.record())?;
            if return_before {
                Ok(updatable.previous_row())
            } else {
                Ok(updatable.into_row())
            }
        }))
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}

/// UPSERT source: emits the class records matching the condition, or a
/// single fresh row seeded from the condition's equality terms when
/// nothing matches. Downstream SET and Save steps then treat both cases
/// uniformly.
///
/// OR-rooted conditions are rejected up front: a created record could
/// not be made to satisfy an arbitrary disjunction.
#[derive(Clone)]
pub struct UpsertStep {
    base: StepBase,
    class: String,
    condition: Expression,
}

impl UpsertStep {
    pub fn new(class: impl Into<String>, condition: Expression) -> Self {
        Self {
            base: StepBase::default(),
            class: class.into(),
            condition,
        }
    }

    /// An OR anywhere in the condition makes the seed row ambiguous, so
    /// the whole tree is rejected, not just a top-level OR.
    fn contains_or(expr: &Expression) -> bool {
        match expr {
            Expression::Binary { op: BinaryOp::Or, .. } => true,
            Expression::Binary { left, right, .. } => {
                Self::contains_or(left) || Self::contains_or(right)
            }
            _ => false,
        }
    }

    /// Collect `property = constant` terms from the AND-tree so the
    /// fresh row already matches the condition it was created for.
    fn seed_properties(
        expr: &Expression,
        ctx: &ExecutionContext,
        row: &mut Row,
    ) -> ExecResult<()> {
        if let Expression::Binary { left, op, right } = expr {
            match op {
                BinaryOp::And => {
                    Self::seed_properties(left, ctx, row)?;
                    Self::seed_properties(right, ctx, row)?;
                }
                BinaryOp::Eq => {
                    if let Expression::Property(name) = left.as_ref() {
                        let value = right.evaluate(None, ctx)?;
                        row.set_property(name.clone(), value);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl Step for UpsertStep {
    fn name(&self) -> String {
        format!("Upsert[{} WHERE {}]", self.class, self.condition)
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn can_be_cached(&self) -> bool {
        false
    }

    fn start(
        &mut self,
        upstream: Option<ExecutionStream>,
        ctx: &mut ExecutionContext,
    ) -> ExecResult<ExecutionStream> {
        self.base.mark_started("Upsert")?;
        if upstream.is_some() {
            return Err(ExecutionError::IllegalState(
                "Upsert is a source step and takes no input".to_string(),
            ));
        }
        if Self::contains_or(&self.condition) {
            return Err(ExecutionError::UpsertOnOrCondition);
        }

        let store = ctx.require_store()?;
        let mut rows = Vec::new();
        for record in store.scan_class(&self.class)? {
            let row = Row::from_record(&record);
            if self.condition.evaluate_bool(Some(&row), ctx)? {
                rows.push(row);
            }
        }
        if rows.is_empty() {
            let mut row = Row::new();
            row.set_identity(Rid::new(-1, -1));
            row.set_metadata("$class", Value::from(self.class.as_str()));
            Self::seed_properties(&self.condition, ctx, &mut row)?;
            rows.push(row);
        }
        Ok(ExecutionStream::from_rows(rows))
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}

/// Deletes each incoming row's record and emits the row unchanged, so
/// the plan can report what was removed.
#[derive(Clone)]
pub struct DeleteStep {
    base: StepBase,
}

impl DeleteStep {
    pub fn new() -> Self {
        Self {
            base: StepBase::default(),
        }
    }
}

impl Default for DeleteStep {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for DeleteStep {
    fn name(&self) -> String {
        "Delete".to_string()
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn can_be_cached(&self) -> bool {
        false
    }

    fn start(
        &mut self,
        upstream: Option<ExecutionStream>,
        _ctx: &mut ExecutionContext,
    ) -> ExecResult<ExecutionStream> {
        self.base.mark_started("Delete")?;
        let upstream = upstream.ok_or_else(|| {
            ExecutionError::IllegalState("Delete step requires a predecessor".to_string())
        })?;
        Ok(upstream.map(move |row, ctx| {
            if let Some(rid) = row.identity().filter(|r| r.is_persistent()) {
                ctx.require_store()?.delete(rid)?;
            }
            Ok(row)
        }))
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::plan::ExecutionPlan;
    use crate::storage::memory::MemoryStore;
    use crate::storage::RecordStore;
    use std::sync::Arc;

    fn ctx_with_store() -> (ExecutionContext, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let ctx = ExecutionContext::new().with_store(store.clone());
        (ctx, store)
    }

    #[test]
    fn test_insert_pipeline_persists_records() {
        let (mut ctx, store) = ctx_with_store();
        let mut plan = ExecutionPlan::eager(vec![
            Box::new(CreateRecordsStep::new("Person", 2)),
            Box::new(SetPropertiesStep::new(vec![(
                "name".to_string(),
                Expression::literal("ann"),
            )])),
            Box::new(SaveStep::new()),
        ]);
        let rows = plan.execute(&mut ctx).unwrap().drain(&mut ctx).unwrap();
        assert_eq!(rows.len(), 2);
        for row in &rows {
            let rid = row.identity().unwrap();
            assert!(rid.is_persistent());
            let record = store.load(rid).unwrap();
            assert_eq!(record.get("name"), Some(&Value::from("ann")));
        }
    }

    #[test]
    fn test_eager_plan_runs_even_when_result_ignored() {
        let (mut ctx, store) = ctx_with_store();
        let mut plan = ExecutionPlan::eager(vec![
            Box::new(CreateRecordsStep::new("Person", 1)),
            Box::new(SaveStep::new()),
        ]);
        // Never pull from the returned stream.
        let _ = plan.execute(&mut ctx).unwrap();
        assert_eq!(store.scan_class("Person").unwrap().len(), 1);
    }

    #[test]
    fn test_update_returning_before() {
        let (mut ctx, store) = ctx_with_store();
        let rid = store.insert("Person", vec![("age", Value::Integer(30))]);

        let mut row = Row::new();
        row.set_identity(rid);
        let mut step = UpdateStep::new(vec![(
            "age".to_string(),
            Expression::literal(31i64),
        )])
        .returning_before();
        let stream = step
            .start(Some(ExecutionStream::from_rows(vec![row])), &mut ctx)
            .unwrap();
        let out = stream.drain(&mut ctx).unwrap();
        assert_eq!(out[0].get_property("age"), Some(&Value::Integer(30)));
        let record = store.load(rid).unwrap();
        assert_eq!(record.get("age"), Some(&Value::Integer(31)));
    }

    #[test]
    fn test_upsert_updates_matching_record() {
        let (mut ctx, store) = ctx_with_store();
        let rid = store.insert(
            "Person",
            vec![("name", Value::from("ann")), ("age", Value::Integer(30))],
        );

        let condition = Expression::binary(
            Expression::property("name"),
            BinaryOp::Eq,
            Expression::literal("ann"),
        );
        let mut plan = ExecutionPlan::eager(vec![
            Box::new(UpsertStep::new("Person", condition)),
            Box::new(SetPropertiesStep::new(vec![(
                "age".to_string(),
                Expression::literal(31i64),
            )])),
            Box::new(SaveStep::new()),
        ]);
        let rows = plan.execute(&mut ctx).unwrap().drain(&mut ctx).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].identity(), Some(rid));
        let record = store.load(rid).unwrap();
        assert_eq!(record.get("age"), Some(&Value::Integer(31)));
        // No second record was created.
        assert_eq!(store.scan_class("Person").unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_creates_record_seeded_from_condition() {
        let (mut ctx, store) = ctx_with_store();
        store.insert("Person", vec![("name", Value::from("ann"))]);

        let condition = Expression::binary(
            Expression::binary(
                Expression::property("name"),
                BinaryOp::Eq,
                Expression::literal("bob"),
            ),
            BinaryOp::And,
            Expression::binary(
                Expression::property("city"),
                BinaryOp::Eq,
                Expression::literal("berlin"),
            ),
        );
        let mut plan = ExecutionPlan::eager(vec![
            Box::new(UpsertStep::new("Person", condition)),
            Box::new(SaveStep::new()),
        ]);
        let rows = plan.execute(&mut ctx).unwrap().drain(&mut ctx).unwrap();
        assert_eq!(rows.len(), 1);
        let rid = rows[0].identity().unwrap();
        assert!(rid.is_persistent());
        let record = store.load(rid).unwrap();
        assert_eq!(record.get("name"), Some(&Value::from("bob")));
        assert_eq!(record.get("city"), Some(&Value::from("berlin")));
        assert_eq!(store.scan_class("Person").unwrap().len(), 2);
    }

    #[test]
    fn test_upsert_rejects_or_condition() {
        let (mut ctx, _store) = ctx_with_store();
        let condition = Expression::binary(
            Expression::binary(
                Expression::property("name"),
                BinaryOp::Eq,
                Expression::literal("ann"),
            ),
            BinaryOp::Or,
            Expression::binary(
                Expression::property("name"),
                BinaryOp::Eq,
                Expression::literal("bob"),
            ),
        );
        let mut step = UpsertStep::new("Person", condition);
        let err = step.start(None, &mut ctx).unwrap_err();
        assert!(matches!(err, ExecutionError::UpsertOnOrCondition));
    }

    #[test]
    fn test_upsert_rejects_nested_or_condition() {
        let (mut ctx, _store) = ctx_with_store();
        let either_name = Expression::binary(
            Expression::binary(
                Expression::property("name"),
                BinaryOp::Eq,
                Expression::literal("ann"),
            ),
            BinaryOp::Or,
            Expression::binary(
                Expression::property("name"),
                BinaryOp::Eq,
                Expression::literal("bob"),
            ),
        );
        let condition = Expression::binary(
            either_name,
            BinaryOp::And,
            Expression::binary(
                Expression::property("city"),
                BinaryOp::Eq,
                Expression::literal("berlin"),
            ),
        );
        let mut step = UpsertStep::new("Person", condition);
        let err = step.start(None, &mut ctx).unwrap_err();
        assert!(matches!(err, ExecutionError::UpsertOnOrCondition));
    }

    #[test]
    fn test_delete_removes_record() {
        let (mut ctx, store) = ctx_with_store();
        let rid = store.insert("Person", vec![("age", Value::Integer(30))]);

        let mut row = Row::new();
        row.set_identity(rid);
        let mut step = DeleteStep::new();
        let stream = step
            .start(Some(ExecutionStream::from_rows(vec![row])), &mut ctx)
            .unwrap();
        let out = stream.drain(&mut ctx).unwrap();
        assert_eq!(out.len(), 1);
        assert!(store.load(rid).is_err());
    }
}
