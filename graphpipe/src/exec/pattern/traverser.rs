// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Candidate enumeration for pattern edges
//!
//! A traversal is a sequence of items; multi-item traversals compose by
//! feeding each hop's output identities into the next hop. Reversing a
//! traversal reverses both the item order and each item's direction, so
//! an edge can be executed from whichever endpoint is already bound.

use crate::exec::context::ExecutionContext;
use crate::exec::error::{ExecResult, ExecutionError};
use crate::storage::{Direction, Rid, Value};

/// One hop of a pattern edge.
#[derive(Debug, Clone)]
pub enum TraversalItem {
    /// Follow graph edges of a class (any class when `None`).
    Edge {
        class: Option<String>,
        direction: Direction,
    },
    /// Follow a link-valued property.
    Field(String),
}

impl TraversalItem {
    fn reversed(&self) -> ExecResult<TraversalItem> {
        match self {
            TraversalItem::Edge { class, direction } => Ok(TraversalItem::Edge {
                class: class.clone(),
                direction: direction.reversed(),
            }),
            TraversalItem::Field(name) => Err(ExecutionError::IllegalState(format!(
                "field traversal '{}' cannot be executed in reverse",
                name
            ))),
        }
    }

    fn candidates(&self, origin: Rid, ctx: &ExecutionContext) -> ExecResult<Vec<Rid>> {
        let store = ctx.require_store()?;
        match self {
            TraversalItem::Edge { class, direction } => {
                store.neighbors(origin, class.as_deref(), *direction)
            }
            TraversalItem::Field(name) => {
                let record = store.load(origin)?;
                match record.get(name) {
                    None | Some(Value::Null) => Ok(Vec::new()),
                    Some(Value::Link(rid)) => Ok(vec![*rid]),
                    Some(Value::List(items)) => {
                        Ok(items.iter().filter_map(Value::as_link).collect())
                    }
                    Some(other) => Err(ExecutionError::TypeError(format!(
                        "cannot traverse property '{}' of type {}",
                        name,
                        other.type_name()
                    ))),
                }
            }
        }
    }
}

/// An executable traversal over one or more items.
#[derive(Debug, Clone)]
pub struct Traverser {
    items: Vec<TraversalItem>,
}

impl Traverser {
    pub fn new(items: Vec<TraversalItem>) -> Self {
        Self { items }
    }

    /// The same traversal executed from the far endpoint. Fails for
    /// traversals containing hops with no inverse.
    pub fn reversed(items: &[TraversalItem]) -> ExecResult<Self> {
        let reversed = items
            .iter()
            .rev()
            .map(TraversalItem::reversed)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { items: reversed })
    }

    /// All identities reachable from `origin` through the full item
    /// sequence. Duplicates are preserved; dedup is the caller's call.
    pub fn traverse(&self, origin: Rid, ctx: &ExecutionContext) -> ExecResult<Vec<Rid>> {
        let mut frontier = vec![origin];
        for item in &self.items {
            let mut next = Vec::new();
            for rid in frontier {
                next.extend(item.candidates(rid, ctx)?);
            }
            frontier = next;
        }
        Ok(frontier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use std::sync::Arc;

    fn ctx(store: MemoryStore) -> ExecutionContext {
        ExecutionContext::new().with_store(Arc::new(store))
    }

    #[test]
    fn test_edge_traversal_forward_and_reverse() {
        let store = MemoryStore::new();
        let a = store.insert("Person", vec![]);
        let b = store.insert("Person", vec![]);
        store.connect("Knows", a, b);
        let items = vec![TraversalItem::Edge {
            class: Some("Knows".to_string()),
            direction: Direction::Out,
        }];
        let ctx = ctx(store);

        let forward = Traverser::new(items.clone());
        assert_eq!(forward.traverse(a, &ctx).unwrap(), vec![b]);

        let reverse = Traverser::reversed(&items).unwrap();
        assert_eq!(reverse.traverse(b, &ctx).unwrap(), vec![a]);
    }

    #[test]
    fn test_two_hop_traversal_composes() {
        let store = MemoryStore::new();
        let a = store.insert("Person", vec![]);
        let b = store.insert("Person", vec![]);
        let c = store.insert("Person", vec![]);
        store.connect("Knows", a, b);
        store.connect("Knows", b, c);
        let ctx = ctx(store);

        let hop = TraversalItem::Edge {
            class: Some("Knows".to_string()),
            direction: Direction::Out,
        };
        let two = Traverser::new(vec![hop.clone(), hop]);
        assert_eq!(two.traverse(a, &ctx).unwrap(), vec![c]);
    }

    #[test]
    fn test_field_traversal_and_no_reverse() {
        let store = MemoryStore::new();
        let target = store.insert("Person", vec![]);
        let origin = store.insert("Person", vec![("boss", Value::Link(target))]);
        let items = vec![TraversalItem::Field("boss".to_string())];
        let ctx = ctx(store);

        let forward = Traverser::new(items.clone());
        assert_eq!(forward.traverse(origin, &ctx).unwrap(), vec![target]);
        assert!(Traverser::reversed(&items).is_err());
    }
}
