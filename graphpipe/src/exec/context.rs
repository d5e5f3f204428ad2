// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Execution context: scoped variables, parameters, cancellation and
//! collaborator handles
//!
//! One context exists per plan execution. Control-flow steps derive a
//! child context for each nested plan: reads fall back to the parent
//! scope, writes stay local to the child.

use crate::exec::error::{ExecResult, ExecutionError};
use crate::exec::row::Row;
use crate::storage::{RecordStore, Value};
use crate::txn::{NoTransaction, TransactionCoordinator};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One level of the variable scope chain.
#[derive(Default)]
struct Scope {
    vars: HashMap<String, Value>,
    parent: Option<Arc<RwLock<Scope>>>,
}

impl Scope {
    fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.vars.get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|p| p.read().get(name))
    }
}

/// Query-local execution context.
///
/// Clones share the same scope, interrupt flag and prefetch cache; use
/// [`ExecutionContext::child`] to get a nested scope instead.
#[derive(Clone)]
pub struct ExecutionContext {
    scope: Arc<RwLock<Scope>>,
    parameters: Arc<HashMap<String, Value>>,
    interrupted: Arc<AtomicBool>,
    /// Rows prefetched per MATCH alias (memoized sub-plan results)
    prefetched: Arc<RwLock<HashMap<String, Vec<Row>>>>,
    store: Option<Arc<dyn RecordStore>>,
    txn: Arc<dyn TransactionCoordinator>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            scope: Arc::new(RwLock::new(Scope::default())),
            parameters: Arc::new(HashMap::new()),
            interrupted: Arc::new(AtomicBool::new(false)),
            prefetched: Arc::new(RwLock::new(HashMap::new())),
            store: None,
            txn: Arc::new(NoTransaction),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_transaction(mut self, txn: Arc<dyn TransactionCoordinator>) -> Self {
        self.txn = txn;
        self
    }

    pub fn with_parameters(mut self, parameters: HashMap<String, Value>) -> Self {
        self.parameters = Arc::new(parameters);
        self
    }

    /// Child context for a nested plan: fresh local scope whose reads
    /// fall back to this context's scope. Interrupt flag, parameters and
    /// collaborators are shared.
    pub fn child(&self) -> ExecutionContext {
        let scope = Arc::new(RwLock::new(Scope {
            vars: HashMap::new(),
            parent: Some(self.scope.clone()),
        }));
        ExecutionContext {
            scope,
            parameters: self.parameters.clone(),
            interrupted: self.interrupted.clone(),
            prefetched: self.prefetched.clone(),
            store: self.store.clone(),
            txn: self.txn.clone(),
        }
    }

    pub fn get_variable(&self, name: &str) -> Option<Value> {
        self.scope.read().get(name)
    }

    /// Write into the local scope (never the parent).
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.scope.write().vars.insert(name.into(), value);
    }

    pub fn get_parameter(&self, name: &str) -> Option<Value> {
        self.parameters.get(name).cloned()
    }

    // -- cooperative cancellation --

    /// Handle the caller can flip from another thread to cancel.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Relaxed)
    }

    // -- MATCH prefetch cache --

    pub fn cache_prefetched(&self, alias: &str, rows: Vec<Row>) {
        log::debug!("prefetch cache fill: alias={} rows={}", alias, rows.len());
        self.prefetched.write().insert(alias.to_string(), rows);
    }

    pub fn prefetched_rows(&self, alias: &str) -> Option<Vec<Row>> {
        self.prefetched.read().get(alias).cloned()
    }

    // -- collaborators --

    pub fn store(&self) -> Option<Arc<dyn RecordStore>> {
        self.store.clone()
    }

    /// Storage handle, failing if the context was built without one.
    pub fn require_store(&self) -> ExecResult<Arc<dyn RecordStore>> {
        self.store.clone().ok_or_else(|| {
            ExecutionError::IllegalState("no storage attached to the execution context".to_string())
        })
    }

    pub fn transaction(&self) -> Arc<dyn TransactionCoordinator> {
        self.txn.clone()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
