// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! MATCH pattern execution
//!
//! A pattern is a small graph of aliases connected by traversal edges.
//! Execution is left-deep: a root alias is prefetched and streamed, then
//! each pattern edge becomes one pipeline step that extends every
//! partial binding with candidates for the edge's far alias. A binding
//! row maps alias names to record links; optional aliases that matched
//! nothing are tracked in row metadata until the cleanup step turns them
//! into explicit nulls.

mod cleanup;
mod edge_step;
mod prefetch;
mod traverser;

pub use cleanup::RemoveEmptyOptionalsStep;
pub use edge_step::MatchEdgeStep;
pub use prefetch::{MatchFirstStep, MatchPrefetchStep};
pub use traverser::{TraversalItem, Traverser};

use crate::exec::error::{ExecResult, ExecutionError};
use crate::exec::expr::Expression;
use crate::exec::plan::ExecutionPlan;
use crate::exec::step::Step;
use crate::storage::Direction;
use std::collections::HashSet;

/// Row metadata key listing optional aliases that matched nothing.
pub const EMPTY_OPTIONALS_KEY: &str = "$emptyOptionals";

/// One alias of the pattern and its candidate constraints.
#[derive(Debug, Clone)]
pub struct PatternNode {
    pub alias: String,
    /// Candidate records must belong to this class (or a subclass).
    pub class: Option<String>,
    /// Candidate records must live in this bucket.
    pub bucket: Option<i32>,
    /// Candidate must be exactly this record.
    pub rid: Option<crate::storage::Rid>,
    /// Candidate records must satisfy this predicate.
    pub filter: Option<Expression>,
    /// Optional aliases contribute an outer-join edge: zero candidates
    /// still yield one binding, with the alias recorded as empty.
    pub optional: bool,
}

impl PatternNode {
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            class: None,
            bucket: None,
            rid: None,
            filter: None,
            optional: false,
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn with_bucket(mut self, bucket: i32) -> Self {
        self.bucket = Some(bucket);
        self
    }

    pub fn with_rid(mut self, rid: crate::storage::Rid) -> Self {
        self.rid = Some(rid);
        self
    }

    pub fn with_filter(mut self, filter: Expression) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// A traversal between two aliases, written from the `from` side.
#[derive(Debug, Clone)]
pub struct PatternEdge {
    pub from: String,
    pub to: String,
    pub items: Vec<TraversalItem>,
}

impl PatternEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>, items: Vec<TraversalItem>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            items,
        }
    }

    /// Single-hop edge traversal helper.
    pub fn over(
        from: impl Into<String>,
        to: impl Into<String>,
        edge_class: Option<&str>,
        direction: Direction,
    ) -> Self {
        Self::new(
            from,
            to,
            vec![TraversalItem::Edge {
                class: edge_class.map(str::to_string),
                direction,
            }],
        )
    }
}

/// A full pattern: aliases plus edges in the order the query wrote them.
///
/// Edge order is part of the pattern's contract; the planner executes
/// edges exactly in this order and never reorders them.
#[derive(Debug, Clone, Default)]
pub struct PatternGraph {
    pub nodes: Vec<PatternNode>,
    pub edges: Vec<PatternEdge>,
}

impl PatternGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: PatternNode) -> &mut Self {
        self.nodes.push(node);
        self
    }

    pub fn add_edge(&mut self, edge: PatternEdge) -> &mut Self {
        self.edges.push(edge);
        self
    }

    pub fn node(&self, alias: &str) -> Option<&PatternNode> {
        self.nodes.iter().find(|n| n.alias == alias)
    }

    /// Build the left-deep execution plan for this pattern.
    ///
    /// The first node is the root: its candidates are prefetched by a
    /// nested plan and streamed as the initial bindings. Every edge must
    /// have at least one endpoint bound by the time it runs; an edge
    /// traversed right-to-left runs with its items reversed.
    pub fn build_plan(&self, root_plan: ExecutionPlan) -> ExecResult<ExecutionPlan> {
        let root = self.nodes.first().ok_or_else(|| {
            ExecutionError::IllegalState("pattern has no aliases".to_string())
        })?;
        let mut steps: Vec<Box<dyn Step>> = vec![
            Box::new(MatchPrefetchStep::new(&root.alias, root_plan)),
            Box::new(MatchFirstStep::new(root.clone())),
        ];

        let mut bound: HashSet<&str> = HashSet::new();
        bound.insert(root.alias.as_str());
        for edge in &self.edges {
            let forward = bound.contains(edge.from.as_str());
            let backward = bound.contains(edge.to.as_str());
            if !forward && !backward {
                return Err(ExecutionError::IllegalState(format!(
                    "pattern edge {} -> {} is disconnected from the bound aliases",
                    edge.from, edge.to
                )));
            }
            let (origin, target, reversed) = if forward {
                (edge.from.as_str(), edge.to.as_str(), false)
            } else {
                (edge.to.as_str(), edge.from.as_str(), true)
            };
            let target_node = self
                .node(target)
                .cloned()
                .unwrap_or_else(|| PatternNode::new(target));
            steps.push(Box::new(MatchEdgeStep::new(
                origin,
                target_node,
                edge.items.clone(),
                reversed,
            )));
            bound.insert(if forward { edge.to.as_str() } else { edge.from.as_str() });
        }
        steps.push(Box::new(RemoveEmptyOptionalsStep::new(
            self.nodes
                .iter()
                .filter(|n| n.optional)
                .map(|n| n.alias.clone())
                .collect(),
        )));
        Ok(ExecutionPlan::lazy(steps))
    }
}
