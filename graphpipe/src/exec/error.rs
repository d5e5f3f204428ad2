// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Execution error types

use thiserror::Error;

pub type ExecResult<T> = Result<T, ExecutionError>;

/// Errors raised by the execution pipeline.
///
/// The core never logs or translates these; they propagate unchanged to
/// the caller, who owns presentation.
#[derive(Error, Debug)]
pub enum ExecutionError {
    // -- execution-time user errors: terminal, not retried --
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    #[error("Invalid EXPAND source: {0}")]
    InvalidExpandSource(String),

    #[error("UPSERT is not allowed with an OR condition")]
    UpsertOnOrCondition,

    // -- resource-limit errors: terminal, caller must reformulate --
    #[error("Resource limit exceeded in {operator}: {count} elements, limit {limit}")]
    ResourceLimitExceeded {
        operator: &'static str,
        count: usize,
        limit: usize,
    },

    // -- timeout: per-step, propagated upstream before raising --
    #[error("Query timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    // -- retryable transaction conflict: caught only by RETRY --
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    // -- cooperative cancellation --
    #[error("Query execution was interrupted")]
    Interrupted,

    // -- invalid pipeline usage: programming errors, fatal --
    #[error("Illegal pipeline state: {0}")]
    IllegalState(String),

    #[error("Expression evaluation error: {0}")]
    ExpressionError(String),

    // -- collaborator passthrough --
    #[error("Storage error: {0}")]
    StorageError(String),
}

impl ExecutionError {
    /// True for the conflict signal RETRY is allowed to catch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutionError::ConcurrentModification(_))
    }
}
