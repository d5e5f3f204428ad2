// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Pipeline rows and the materialized result surface
//!
//! A [`Row`] is one unit of query data: a mutable, insertion-ordered
//! property map, optionally backed by a record identity, plus a metadata
//! map for query-local annotations (match bindings, let-variables) that is
//! never part of equality and never persisted.

use crate::storage::{Record, Rid, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Row {
    values: HashMap<String, Value>,
    /// Property insertion order
    order: Vec<String>,
    identity: Option<Rid>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    metadata: HashMap<String, Value>,
}

impl Row {
    /// A computed (projection) row with no identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// A row over a persisted record, carrying its identity.
    pub fn from_record(record: &Record) -> Self {
        let mut row = Row::new();
        for (name, value) in record.properties() {
            row.set_property(name, value.clone());
        }
        row.identity = Some(record.rid);
        row
    }

    pub fn identity(&self) -> Option<Rid> {
        self.identity
    }

    pub fn set_identity(&mut self, rid: Rid) {
        self.identity = Some(rid);
    }

    pub fn get_property(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Insert or overwrite a property; first insertion fixes its position.
    pub fn set_property(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if !self.values.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.values.insert(name, value);
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Value> {
        if let Some(value) = self.values.remove(name) {
            self.order.retain(|n| n != name);
            Some(value)
        } else {
            None
        }
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.order
            .iter()
            .filter_map(move |name| self.values.get(name).map(|v| (name.as_str(), v)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    // -- metadata: query-local, excluded from equality and output --

    pub fn set_metadata(&mut self, name: impl Into<String>, value: Value) {
        self.metadata.insert(name.into(), value);
    }

    pub fn get_metadata(&self, name: &str) -> Option<&Value> {
        self.metadata.get(name)
    }

    pub fn remove_metadata(&mut self, name: &str) -> Option<Value> {
        self.metadata.remove(name)
    }

    /// Value-equality key over ordered properties, used by DISTINCT for
    /// rows without a persistent identity.
    pub fn value_key(&self) -> RowKey {
        RowKey(
            self.order
                .iter()
                .filter_map(|name| {
                    self.values
                        .get(name)
                        .map(|v| (name.clone(), v.clone()))
                })
                .collect(),
        )
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        match (self.identity, other.identity) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.value_key() == other.value_key(),
            _ => false,
        }
    }
}

impl Eq for Row {}

/// Hashable full-row value key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowKey(Vec<(String, Value)>);

impl Hash for RowKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for (name, value) in &self.0 {
            name.hash(state);
            value.hash(state);
        }
    }
}

/// A row wrapping a live record: property writes are forwarded to the
/// record, and the pre-mutation state is retained so UPDATE ... RETURN
/// BEFORE can report previous values.
#[derive(Debug, Clone)]
pub struct UpdatableRow {
    record: Record,
    previous: Record,
}

impl UpdatableRow {
    pub fn new(record: Record) -> Self {
        let previous = record.clone();
        Self { record, previous }
    }

    pub fn identity(&self) -> Rid {
        self.record.rid
    }

    pub fn get_property(&self, name: &str) -> Option<&Value> {
        self.record.get(name)
    }

    /// Forwarded to the underlying record.
    pub fn set_property(&mut self, name: impl Into<String>, value: Value) {
        self.record.set(name, value);
    }

    /// Value the property had before any mutation through this row.
    pub fn previous_value(&self, name: &str) -> Option<&Value> {
        self.previous.get(name)
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Snapshot of the pre-mutation state as a plain row.
    pub fn previous_row(&self) -> Row {
        Row::from_record(&self.previous)
    }

    pub fn into_row(self) -> Row {
        Row::from_record(&self.record)
    }
}

/// Materialized query result handed to the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub rows_affected: usize,
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize for callers that hand results across a process or
    /// language boundary.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_order_preserved() {
        let mut row = Row::new();
        row.set_property("b", Value::Integer(1));
        row.set_property("a", Value::Integer(2));
        row.set_property("b", Value::Integer(3)); // overwrite keeps position

        let names: Vec<&str> = row.property_names().collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(row.get_property("b"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_metadata_excluded_from_equality() {
        let mut a = Row::new();
        a.set_property("x", Value::Integer(1));
        let mut b = a.clone();
        b.set_metadata("$tag", Value::Boolean(true));
        assert_eq!(a, b);
    }

    #[test]
    fn test_identity_equality_wins_over_values() {
        let mut a = Row::new();
        a.set_property("x", Value::Integer(1));
        a.set_identity(Rid::new(1, 7));
        let mut b = Row::new();
        b.set_property("x", Value::Integer(999));
        b.set_identity(Rid::new(1, 7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_query_result_json_round_trip() {
        let mut row = Row::new();
        row.set_property("name", Value::from("ann"));
        row.set_identity(Rid::new(2, 5));
        let result = QueryResult {
            rows: vec![row],
            rows_affected: 1,
            execution_time_ms: 12,
        };

        let json = result.to_json().unwrap();
        let back: QueryResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.rows_affected, 1);
        assert_eq!(back.execution_time_ms, 12);
        assert_eq!(back.rows[0].get_property("name"), Some(&Value::from("ann")));
        assert_eq!(back.rows[0].identity(), Some(Rid::new(2, 5)));
    }

    #[test]
    fn test_updatable_row_snapshot() {
        let mut record = Record::new(Rid::new(0, 3), "Person");
        record.set("name", Value::from("Alice"));

        let mut row = UpdatableRow::new(record);
        row.set_property("name", Value::from("Bob"));

        assert_eq!(row.get_property("name"), Some(&Value::from("Bob")));
        assert_eq!(row.previous_value("name"), Some(&Value::from("Alice")));
        assert_eq!(
            row.previous_row().get_property("name"),
            Some(&Value::from("Alice"))
        );
    }
}
