// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query execution pipeline
//!
//! Execution is pull-based: a plan wires steps into a chain of streams
//! and the caller drives everything by pulling rows off the last one.
//! All of it runs on the calling thread; cancellation is cooperative
//! through the context's interrupt flag.

pub mod aggregation;
pub mod context;
pub mod distinct;
pub mod error;
pub mod expr;
pub mod flow;
pub mod mutation;
pub mod order_by;
pub mod pattern;
pub mod plan;
pub mod row;
pub mod step;
pub mod steps;
pub mod stream;
