// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Storage collaborator seam
//!
//! The execution core does not own a storage engine. It talks to one
//! through [`RecordStore`]: synchronous calls returning records or record
//! identities. The in-memory implementation in [`memory`] backs the test
//! suites.

pub mod memory;
mod value;

pub use memory::MemoryStore;
pub use value::Value;

use crate::exec::error::{ExecResult, ExecutionError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a persisted record: partition (bucket) id plus
/// position within the bucket.
///
/// Negative positions denote records that exist only inside an open
/// transaction and have not been assigned a durable position yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rid {
    pub bucket: i32,
    pub position: i64,
}

impl Rid {
    pub fn new(bucket: i32, position: i64) -> Self {
        Self { bucket, position }
    }

    /// True once the record has a durable position.
    pub fn is_persistent(&self) -> bool {
        self.position >= 0
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.bucket, self.position)
    }
}

/// A stored document: identity, class name and ordered properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub rid: Rid,
    pub class: String,
    properties: Vec<(String, Value)>,
}

impl Record {
    pub fn new(rid: Rid, class: impl Into<String>) -> Self {
        Self {
            rid,
            class: class.into(),
            properties: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Insert or overwrite a property, preserving first-insertion order.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.properties.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => *slot = value,
            None => self.properties.push((name, value)),
        }
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Direction of an edge traversal relative to the source record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Out,
    In,
    Both,
}

impl Direction {
    /// The direction a reverse traverser actually executes.
    pub fn reversed(self) -> Direction {
        match self {
            Direction::Out => Direction::In,
            Direction::In => Direction::Out,
            Direction::Both => Direction::Both,
        }
    }
}

/// Synchronous storage operations the execution core depends on.
///
/// Implementations are expected to be cheap to call repeatedly; any
/// caching or physical parallelism lives behind this trait and is
/// invisible to the pipeline.
pub trait RecordStore: Send + Sync {
    /// All records of a class, in stable storage order.
    fn scan_class(&self, class: &str) -> ExecResult<Vec<Record>>;

    fn load(&self, rid: Rid) -> ExecResult<Record>;

    /// Persist the record, assigning a durable identity if it has none.
    /// Returns the (possibly new) identity.
    fn save(&self, record: &Record) -> ExecResult<Rid>;

    fn delete(&self, rid: Rid) -> ExecResult<()>;

    /// Identities reachable from `rid` over edges of `edge_class`
    /// (all edge classes when `None`) in the given direction.
    fn neighbors(
        &self,
        rid: Rid,
        edge_class: Option<&str>,
        direction: Direction,
    ) -> ExecResult<Vec<Rid>>;

    /// Class name of a record, if it exists.
    fn record_class(&self, rid: Rid) -> Option<String>;

    /// Schema check: is `class` equal to or a subclass of `ancestor`?
    fn is_subclass(&self, class: &str, ancestor: &str) -> bool;
}

/// Convenience for collaborator failures that carry no structure.
pub fn storage_error(msg: impl Into<String>) -> ExecutionError {
    ExecutionError::StorageError(msg.into())
}
