// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction collaborator seam
//!
//! Commit/rollback atomicity belongs to the storage engine; the execution
//! core only needs to ask for transaction boundaries (mutation batching)
//! and to request a rollback when a RETRY block catches a conflict.

use crate::exec::error::ExecResult;

/// Transaction boundary operations used by mutation plans and RETRY.
pub trait TransactionCoordinator: Send + Sync {
    fn begin(&self) -> ExecResult<()>;

    fn commit(&self) -> ExecResult<()>;

    fn rollback(&self) -> ExecResult<()>;

    fn is_active(&self) -> bool;

    /// Commit-every-N batching for mutation plans; `None` disables
    /// intermediate commits.
    fn batch_size(&self) -> Option<usize> {
        None
    }
}

/// Null object used when the caller runs outside a transaction.
#[derive(Debug, Default, Clone)]
pub struct NoTransaction;

impl TransactionCoordinator for NoTransaction {
    fn begin(&self) -> ExecResult<()> {
        Ok(())
    }

    fn commit(&self) -> ExecResult<()> {
        Ok(())
    }

    fn rollback(&self) -> ExecResult<()> {
        Ok(())
    }

    fn is_active(&self) -> bool {
        false
    }
}
