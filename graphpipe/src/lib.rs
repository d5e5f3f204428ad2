// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! GraphPipe - pull-based query execution for graph-document data
//!
//! GraphPipe is the execution core of a graph-document database: given a
//! planned pipeline of steps it runs queries, aggregations, graph
//! pattern matches, mutations and control-flow scripts over a pluggable
//! record store.
//!
//! # Features
//!
//! - **Pull-based pipelines**: rows flow only when the caller asks,
//!   with well-defined stream and step lifecycles
//! - **Buffering operators**: GROUP BY, ORDER BY and DISTINCT with
//!   explicit memory caps and timeout strategies
//! - **Pattern matching**: MATCH over aliases, edges and optional
//!   bindings without join buffers
//! - **Control flow**: IF/FOREACH/WHILE/RETRY scripts with early RETURN
//! - **Pluggable collaborators**: storage and transactions sit behind
//!   traits; an in-memory store ships for embedding and tests
//!
//! # Usage
//!
//! ```no_run
//! use graphpipe::exec::context::ExecutionContext;
//! use graphpipe::exec::plan::ExecutionPlan;
//! use graphpipe::exec::steps::ScanClassStep;
//! use graphpipe::storage::memory::MemoryStore;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let mut ctx = ExecutionContext::new().with_store(store);
//! let mut plan = ExecutionPlan::lazy(vec![Box::new(ScanClassStep::new("Person"))]);
//! let rows = plan.execute(&mut ctx)?.drain(&mut ctx)?;
//! # Ok::<(), graphpipe::exec::error::ExecutionError>(())
//! ```

pub mod exec;
pub mod storage;
pub mod txn;

// The types nearly every caller touches.
pub use exec::context::ExecutionContext;
pub use exec::error::{ExecResult, ExecutionError};
pub use exec::plan::{ExecutionPlan, PlanMode};
pub use exec::row::{QueryResult, Row};
pub use exec::step::Step;
pub use exec::stream::ExecutionStream;
pub use storage::{Record, RecordStore, Rid, Value};

/// GraphPipe version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
