// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Pattern edge execution
//!
//! One step per pattern edge. Each incoming binding row is expanded into
//! zero or more rows, one per valid candidate for the far alias. No join
//! buffer exists anywhere: the multiplicity of the match is carried
//! entirely by the stream.

use crate::exec::context::ExecutionContext;
use crate::exec::error::{ExecResult, ExecutionError};
use crate::exec::pattern::{PatternNode, TraversalItem, Traverser, EMPTY_OPTIONALS_KEY};
use crate::exec::row::Row;
use crate::exec::step::{Step, StepBase};
use crate::exec::stream::ExecutionStream;
use crate::storage::{Rid, Value};

#[derive(Clone)]
pub struct MatchEdgeStep {
    base: StepBase,
    origin: String,
    target: PatternNode,
    items: Vec<TraversalItem>,
    reversed: bool,
}

impl MatchEdgeStep {
    pub fn new(
        origin: impl Into<String>,
        target: PatternNode,
        items: Vec<TraversalItem>,
        reversed: bool,
    ) -> Self {
        Self {
            base: StepBase::default(),
            origin: origin.into(),
            target,
            items,
            reversed,
        }
    }

    fn traverser(&self) -> ExecResult<Traverser> {
        if self.reversed {
            Traverser::reversed(&self.items)
        } else {
            Ok(Traverser::new(self.items.clone()))
        }
    }

    /// Class, bucket, rid, filter and prefetch-membership checks for one
    /// candidate.
    fn accepts(&self, candidate: Rid, ctx: &ExecutionContext) -> ExecResult<bool> {
        let store = ctx.require_store()?;
        if let Some(rid) = self.target.rid {
            if candidate != rid {
                return Ok(false);
            }
        }
        if let Some(bucket) = self.target.bucket {
            if candidate.bucket != bucket {
                return Ok(false);
            }
        }
        if let Some(class) = &self.target.class {
            match store.record_class(candidate) {
                Some(actual) if store.is_subclass(&actual, class) => {}
                _ => return Ok(false),
            }
        }
        if let Some(prefetched) = ctx.prefetched_rows(&self.target.alias) {
            if !prefetched.iter().any(|r| r.identity() == Some(candidate)) {
                return Ok(false);
            }
        }
        if let Some(filter) = &self.target.filter {
            let record = store.load(candidate)?;
            if !filter.evaluate_bool(Some(&Row::from_record(&record)), ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn mark_empty_optional(row: &mut Row, alias: &str) {
        let mut aliases = match row.remove_metadata(EMPTY_OPTIONALS_KEY) {
            Some(Value::List(items)) => items,
            _ => Vec::new(),
        };
        aliases.push(Value::from(alias));
        row.set_metadata(EMPTY_OPTIONALS_KEY, Value::List(aliases));
    }

    fn expand(&self, row: Row, ctx: &mut ExecutionContext) -> ExecResult<Vec<Row>> {
        let origin_rid = match row.get_property(&self.origin) {
            Some(Value::Link(rid)) => *rid,
            None | Some(Value::Null) => {
                // Origin matched nothing; an optional target inherits the
                // empty binding, anything else kills the row.
                if self.target.optional {
                    let mut out = row;
                    Self::mark_empty_optional(&mut out, &self.target.alias);
                    return Ok(vec![out]);
                }
                return Ok(Vec::new());
            }
            Some(other) => {
                return Err(ExecutionError::TypeError(format!(
                    "alias '{}' is bound to a {}, not a record",
                    self.origin,
                    other.type_name()
                )))
            }
        };

        let candidates = self.traverser()?.traverse(origin_rid, ctx)?;

        // Target already bound by an earlier edge: this edge only checks
        // that some candidate agrees with the existing binding, keeping
        // one output row per agreeing candidate.
        if let Some(Value::Link(bound)) = row.get_property(&self.target.alias) {
            let bound = *bound;
            let mut out = Vec::new();
            for candidate in candidates {
                if candidate == bound && self.accepts(candidate, ctx)? {
                    out.push(row.clone());
                }
            }
            return Ok(out);
        }

        let mut out = Vec::new();
        for candidate in candidates {
            if self.accepts(candidate, ctx)? {
                let mut branch = row.clone();
                branch.set_property(self.target.alias.clone(), Value::Link(candidate));
                out.push(branch);
            }
        }
        if out.is_empty() && self.target.optional {
            let mut only = row;
            Self::mark_empty_optional(&mut only, &self.target.alias);
            out.push(only);
        }
        Ok(out)
    }
}

impl Step for MatchEdgeStep {
    fn name(&self) -> String {
        let arrow = if self.reversed { "<-" } else { "->" };
        format!("MatchEdge[{} {} {}]", self.origin, arrow, self.target.alias)
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
        self.base.mark_started("MatchEdge")?;
        let upstream = upstream.ok_or_else(|| {
            ExecutionError::IllegalState("MatchEdge step requires a predecessor".to_string())
        })?;
        let step = self.clone();
        Ok(upstream.flat_map(move |row, ctx| {
            let rows = step.expand(row, ctx)?;
            Ok(ExecutionStream::from_rows(rows))
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
    use crate::storage::Direction;
    use std::sync::Arc;

    fn knows() -> Vec<TraversalItem> {
        vec![TraversalItem::Edge {
            class: Some("Knows".to_string()),
            direction: Direction::Out,
        }]
    }

    fn binding(alias: &str, rid: Rid) -> Row {
        let mut row = Row::new();
        row.set_property(alias, Value::Link(rid));
        row
    }

    fn run(step: &mut MatchEdgeStep, ctx: &mut ExecutionContext, input: Vec<Row>) -> Vec<Row> {
        let stream = step
            .start(Some(ExecutionStream::from_rows(input)), ctx)
            .unwrap();
        stream.drain(ctx).unwrap()
    }

    #[test]
    fn test_edge_branches_per_candidate() {
        let store = MemoryStore::new();
        let a = store.insert("Person", vec![]);
        let b = store.insert("Person", vec![]);
        let c = store.insert("Person", vec![]);
        store.connect("Knows", a, b);
        store.connect("Knows", a, c);
        let mut ctx = ExecutionContext::new().with_store(Arc::new(store));

        let mut step = MatchEdgeStep::new("p", PatternNode::new("f"), knows(), false);
        let out = run(&mut step, &mut ctx, vec![binding("p", a)]);
        assert_eq!(out.len(), 2);
        let bound: Vec<Option<&Value>> = out.iter().map(|r| r.get_property("f")).collect();
        assert!(bound.contains(&Some(&Value::Link(b))));
        assert!(bound.contains(&Some(&Value::Link(c))));
    }

    #[test]
    fn test_optional_edge_with_no_candidates_keeps_row() {
        let store = MemoryStore::new();
        let a = store.insert("Person", vec![]);
        let mut ctx = ExecutionContext::new().with_store(Arc::new(store));

        let mut step =
            MatchEdgeStep::new("p", PatternNode::new("f").optional(), knows(), false);
        let out = run(&mut step, &mut ctx, vec![binding("p", a)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_property("f"), None);
        assert_eq!(
            out[0].get_metadata(EMPTY_OPTIONALS_KEY),
            Some(&Value::List(vec![Value::from("f")]))
        );
    }

    #[test]
    fn test_required_edge_with_no_candidates_drops_row() {
        let store = MemoryStore::new();
        let a = store.insert("Person", vec![]);
        let mut ctx = ExecutionContext::new().with_store(Arc::new(store));

        let mut step = MatchEdgeStep::new("p", PatternNode::new("f"), knows(), false);
        let out = run(&mut step, &mut ctx, vec![binding("p", a)]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_already_bound_alias_requires_agreement() {
        let store = MemoryStore::new();
        let a = store.insert("Person", vec![]);
        let b = store.insert("Person", vec![]);
        let c = store.insert("Person", vec![]);
        store.connect("Knows", a, b);
        let mut ctx = ExecutionContext::new().with_store(Arc::new(store));

        let mut agree = binding("p", a);
        agree.set_property("f", Value::Link(b));
        let mut disagree = binding("p", a);
        disagree.set_property("f", Value::Link(c));

        let mut step = MatchEdgeStep::new("p", PatternNode::new("f"), knows(), false);
        let out = run(&mut step, &mut ctx, vec![agree, disagree]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_property("f"), Some(&Value::Link(b)));
    }

    #[test]
    fn test_class_constraint_filters_candidates() {
        let store = MemoryStore::new();
        let a = store.insert("Person", vec![]);
        let b = store.insert("Person", vec![]);
        let d = store.insert("Dog", vec![]);
        store.connect("Knows", a, b);
        store.connect("Knows", a, d);
        let mut ctx = ExecutionContext::new().with_store(Arc::new(store));

        let mut step = MatchEdgeStep::new(
            "p",
            PatternNode::new("f").with_class("Person"),
            knows(),
            false,
        );
        let out = run(&mut step, &mut ctx, vec![binding("p", a)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_property("f"), Some(&Value::Link(b)));
    }

    #[test]
    fn test_rid_constraint_pins_the_target() {
        let store = MemoryStore::new();
        let a = store.insert("Person", vec![]);
        let b = store.insert("Person", vec![]);
        let c = store.insert("Person", vec![]);
        store.connect("Knows", a, b);
        store.connect("Knows", a, c);
        let mut ctx = ExecutionContext::new().with_store(Arc::new(store));

        let mut step =
            MatchEdgeStep::new("p", PatternNode::new("f").with_rid(c), knows(), false);
        let out = run(&mut step, &mut ctx, vec![binding("p", a)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_property("f"), Some(&Value::Link(c)));
    }

    #[test]
    fn test_bucket_constraint_filters_candidates() {
        let store = MemoryStore::new();
        let a = store.insert("Person", vec![]);
        let b = store.insert("Person", vec![]);
        let d = store.insert("Dog", vec![]);
        store.connect("Knows", a, b);
        store.connect("Knows", a, d);
        let dog_bucket = d.bucket;
        let mut ctx = ExecutionContext::new().with_store(Arc::new(store));

        let mut step = MatchEdgeStep::new(
            "p",
            PatternNode::new("f").with_bucket(dog_bucket),
            knows(),
            false,
        );
        let out = run(&mut step, &mut ctx, vec![binding("p", a)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_property("f"), Some(&Value::Link(d)));
    }
}
