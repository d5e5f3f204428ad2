// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory [`RecordStore`] implementation
//!
//! Backs the unit and integration test suites; also usable as an embedded
//! scratch store. Buckets are assigned per class on first use.

use crate::exec::error::{ExecResult, ExecutionError};
use crate::storage::{storage_error, Direction, Record, RecordStore, Rid};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct EdgeKey {
    from: Rid,
    to: Rid,
}

#[derive(Default)]
struct StoreInner {
    records: HashMap<Rid, Record>,
    /// class -> bucket id
    buckets: HashMap<String, i32>,
    next_bucket: i32,
    next_position: i64,
    /// (edge class, from, to)
    edges: Vec<(String, Rid, Rid)>,
    /// child class -> parent class
    superclasses: HashMap<String, String>,
}

/// Thread-safe in-memory record store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record and return its identity.
    pub fn insert(&self, class: &str, props: Vec<(&str, crate::storage::Value)>) -> Rid {
        let mut inner = self.inner.write();
        let bucket = bucket_for(&mut inner, class);
        let position = inner.next_position;
        inner.next_position += 1;
        let rid = Rid::new(bucket, position);
        let mut record = Record::new(rid, class);
        for (name, value) in props {
            record.set(name, value);
        }
        inner.records.insert(rid, record);
        rid
    }

    /// Register a directed edge between two records.
    pub fn connect(&self, edge_class: &str, from: Rid, to: Rid) {
        self.inner.write().edges.push((edge_class.to_string(), from, to));
    }

    /// Declare `class` a subclass of `parent`.
    pub fn declare_subclass(&self, class: &str, parent: &str) {
        self.inner
            .write()
            .superclasses
            .insert(class.to_string(), parent.to_string());
    }

    pub fn bucket_of(&self, class: &str) -> Option<i32> {
        self.inner.read().buckets.get(class).copied()
    }
}

fn bucket_for(inner: &mut StoreInner, class: &str) -> i32 {
    if let Some(b) = inner.buckets.get(class) {
        return *b;
    }
    let b = inner.next_bucket;
    inner.next_bucket += 1;
    inner.buckets.insert(class.to_string(), b);
    b
}

impl RecordStore for MemoryStore {
    fn scan_class(&self, class: &str) -> ExecResult<Vec<Record>> {
        let inner = self.inner.read();
        let known = inner.buckets.contains_key(class)
            || inner.superclasses.values().any(|parent| parent == class)
            || inner.superclasses.contains_key(class);
        if !known {
            return Err(ExecutionError::InvalidTarget(format!(
                "class '{}' does not exist",
                class
            )));
        }
        let mut records: Vec<Record> = inner
            .records
            .values()
            .filter(|r| r.class == class || is_subclass_of(&inner, &r.class, class))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.rid);
        Ok(records)
    }

    fn load(&self, rid: Rid) -> ExecResult<Record> {
        self.inner
            .read()
            .records
            .get(&rid)
            .cloned()
            .ok_or_else(|| storage_error(format!("record {} not found", rid)))
    }

    fn save(&self, record: &Record) -> ExecResult<Rid> {
        let mut inner = self.inner.write();
        let mut record = record.clone();
        if let Some(existing) = inner.records.get(&record.rid) {
            if existing.class != record.class {
                return Err(ExecutionError::SchemaViolation(format!(
                    "record {} belongs to class '{}', not '{}'",
                    record.rid, existing.class, record.class
                )));
            }
        }
        if !record.rid.is_persistent() {
            let bucket = bucket_for(&mut inner, &record.class);
            let position = inner.next_position;
            inner.next_position += 1;
            record.rid = Rid::new(bucket, position);
        }
        let rid = record.rid;
        inner.records.insert(rid, record);
        Ok(rid)
    }

    fn delete(&self, rid: Rid) -> ExecResult<()> {
        let mut inner = self.inner.write();
        inner
            .records
            .remove(&rid)
            .ok_or_else(|| storage_error(format!("record {} not found", rid)))?;
        inner.edges.retain(|(_, from, to)| *from != rid && *to != rid);
        Ok(())
    }

    fn neighbors(
        &self,
        rid: Rid,
        edge_class: Option<&str>,
        direction: Direction,
    ) -> ExecResult<Vec<Rid>> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        for (class, from, to) in &inner.edges {
            if let Some(wanted) = edge_class {
                if class != wanted {
                    continue;
                }
            }
            match direction {
                Direction::Out if *from == rid => out.push(*to),
                Direction::In if *to == rid => out.push(*from),
                Direction::Both => {
                    if *from == rid {
                        out.push(*to);
                    } else if *to == rid {
                        out.push(*from);
                    }
                }
                _ => {}
            }
        }
        Ok(out)
    }

    fn record_class(&self, rid: Rid) -> Option<String> {
        self.inner.read().records.get(&rid).map(|r| r.class.clone())
    }

    fn is_subclass(&self, class: &str, ancestor: &str) -> bool {
        class == ancestor || is_subclass_of(&self.inner.read(), class, ancestor)
    }
}

fn is_subclass_of(inner: &StoreInner, class: &str, ancestor: &str) -> bool {
    let mut current = class;
    while let Some(parent) = inner.superclasses.get(current) {
        if parent == ancestor {
            return true;
        }
        current = parent;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Value;

    #[test]
    fn test_insert_and_scan() {
        let store = MemoryStore::new();
        store.insert("Person", vec![("name", Value::from("Alice"))]);
        store.insert("Person", vec![("name", Value::from("Bob"))]);
        store.insert("City", vec![("name", Value::from("Oslo"))]);

        let people = store.scan_class("Person").unwrap();
        assert_eq!(people.len(), 2);
        assert_eq!(people[0].get("name"), Some(&Value::from("Alice")));
    }

    #[test]
    fn test_scan_includes_subclasses() {
        let store = MemoryStore::new();
        store.declare_subclass("Employee", "Person");
        store.insert("Person", vec![]);
        store.insert("Employee", vec![]);

        assert_eq!(store.scan_class("Person").unwrap().len(), 2);
        assert_eq!(store.scan_class("Employee").unwrap().len(), 1);
        assert!(store.is_subclass("Employee", "Person"));
        assert!(!store.is_subclass("Person", "Employee"));
    }

    #[test]
    fn test_neighbors_directions() {
        let store = MemoryStore::new();
        let a = store.insert("V", vec![]);
        let b = store.insert("V", vec![]);
        let c = store.insert("V", vec![]);
        store.connect("Knows", a, b);
        store.connect("Knows", c, a);

        assert_eq!(store.neighbors(a, Some("Knows"), Direction::Out).unwrap(), vec![b]);
        assert_eq!(store.neighbors(a, Some("Knows"), Direction::In).unwrap(), vec![c]);
        assert_eq!(
            store.neighbors(a, Some("Knows"), Direction::Both).unwrap().len(),
            2
        );
        assert!(store.neighbors(a, Some("Likes"), Direction::Both).unwrap().is_empty());
    }

    #[test]
    fn test_scan_unknown_class_is_invalid_target() {
        let store = MemoryStore::new();
        store.insert("Person", vec![]);
        assert!(matches!(
            store.scan_class("Ghost"),
            Err(ExecutionError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_save_cannot_change_class() {
        let store = MemoryStore::new();
        let rid = store.insert("Person", vec![]);
        let reclassed = Record::new(rid, "City");
        assert!(matches!(
            store.save(&reclassed),
            Err(ExecutionError::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_save_assigns_identity_to_temporary() {
        let store = MemoryStore::new();
        let record = Record::new(Rid::new(0, -1), "Person");
        let rid = store.save(&record).unwrap();
        assert!(rid.is_persistent());
        assert!(store.load(rid).is_ok());
    }
}
