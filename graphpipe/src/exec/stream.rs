// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Lazy, single-pass execution streams
//!
//! Every operator consumes and produces an [`ExecutionStream`]: a
//! non-restartable pull cursor over rows. Operators implement the
//! [`RowSource`] trait; the stream wrapper enforces the pull contract
//! (peeking `has_next`, `next` only after a true `has_next`, idempotent
//! `close` that propagates upstream exactly once) in a single place.

use crate::exec::context::ExecutionContext;
use crate::exec::error::{ExecResult, ExecutionError};
use crate::exec::row::Row;
use std::fmt;

/// What operators implement: produce the next row, or `None` when
/// exhausted, and release resources on close.
pub trait RowSource {
    fn fetch(&mut self, ctx: &mut ExecutionContext) -> ExecResult<Option<Row>>;

    fn close(&mut self, ctx: &mut ExecutionContext) {
        let _ = ctx;
    }
}

/// Single-pass pull cursor over rows.
///
/// `has_next` is a side-effect-free peek from the caller's point of view:
/// it may pull from the source into a one-row lookahead slot, but calling
/// it repeatedly yields the same answer. `next` without a preceding true
/// `has_next` is an [`ExecutionError::IllegalState`].
pub struct ExecutionStream {
    source: Box<dyn RowSource>,
    lookahead: Option<Row>,
    closed: bool,
}

impl ExecutionStream {
    pub fn new(source: impl RowSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            lookahead: None,
            closed: false,
        }
    }

    pub fn empty() -> Self {
        Self::from_rows(Vec::new())
    }

    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self::new(VecSource {
            rows: rows.into_iter(),
        })
    }

    pub fn has_next(&mut self, ctx: &mut ExecutionContext) -> ExecResult<bool> {
        if self.closed {
            return Err(ExecutionError::IllegalState(
                "has_next called on a closed stream".to_string(),
            ));
        }
        if self.lookahead.is_none() {
            self.lookahead = self.source.fetch(ctx)?;
        }
        Ok(self.lookahead.is_some())
    }

    pub fn next(&mut self, ctx: &mut ExecutionContext) -> ExecResult<Row> {
        let _ = ctx;
        self.lookahead.take().ok_or_else(|| {
            ExecutionError::IllegalState(
                "next called without a preceding successful has_next".to_string(),
            )
        })
    }

    /// Idempotent; propagates to the wrapped source exactly once.
    pub fn close(&mut self, ctx: &mut ExecutionContext) {
        if !self.closed {
            self.closed = true;
            self.lookahead = None;
            self.source.close(ctx);
        }
    }

    /// Pull everything, then close.
    pub fn drain(mut self, ctx: &mut ExecutionContext) -> ExecResult<Vec<Row>> {
        let mut rows = Vec::new();
        loop {
            match self.has_next(ctx) {
                Ok(true) => rows.push(self.next(ctx)?),
                Ok(false) => break,
                Err(e) => {
                    self.close(ctx);
                    return Err(e);
                }
            }
        }
        self.close(ctx);
        Ok(rows)
    }

    // -- combinators --

    /// 1:1 transform.
    pub fn map(
        self,
        f: impl FnMut(Row, &mut ExecutionContext) -> ExecResult<Row> + 'static,
    ) -> ExecutionStream {
        ExecutionStream::new(MapSource {
            upstream: self,
            f: Box::new(f),
        })
    }

    /// 1:1, may drop rows.
    pub fn filter(
        self,
        predicate: impl FnMut(&Row, &mut ExecutionContext) -> ExecResult<bool> + 'static,
    ) -> ExecutionStream {
        ExecutionStream::new(FilterSource {
            upstream: self,
            predicate: Box::new(predicate),
        })
    }

    /// 1:N expansion; closing propagates to the current sub-stream and
    /// the upstream.
    pub fn flat_map(
        self,
        f: impl FnMut(Row, &mut ExecutionContext) -> ExecResult<ExecutionStream> + 'static,
    ) -> ExecutionStream {
        ExecutionStream::new(FlatMapSource {
            upstream: self,
            f: Box::new(f),
            current: None,
        })
    }

    /// Stops after `n` rows regardless of upstream state; still closes
    /// the upstream when closed.
    pub fn limit(self, n: usize) -> ExecutionStream {
        ExecutionStream::new(LimitSource {
            upstream: self,
            remaining: n,
        })
    }

    /// Checks the context's cooperative interrupt flag on every pull and
    /// fails fast instead of completing the current batch.
    pub fn interruptable(self) -> ExecutionStream {
        ExecutionStream::new(InterruptableSource { upstream: self })
    }
}

impl fmt::Debug for ExecutionStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionStream")
            .field("closed", &self.closed)
            .field("lookahead", &self.lookahead.is_some())
            .finish_non_exhaustive()
    }
}

struct VecSource {
    rows: std::vec::IntoIter<Row>,
}

impl RowSource for VecSource {
    fn fetch(&mut self, _ctx: &mut ExecutionContext) -> ExecResult<Option<Row>> {
        Ok(self.rows.next())
    }
}

struct MapSource {
    upstream: ExecutionStream,
    #[allow(clippy::type_complexity)]
    f: Box<dyn FnMut(Row, &mut ExecutionContext) -> ExecResult<Row>>,
}

impl RowSource for MapSource {
    fn fetch(&mut self, ctx: &mut ExecutionContext) -> ExecResult<Option<Row>> {
        if !self.upstream.has_next(ctx)? {
            return Ok(None);
        }
        let row = self.upstream.next(ctx)?;
        Ok(Some((self.f)(row, ctx)?))
    }

    fn close(&mut self, ctx: &mut ExecutionContext) {
        self.upstream.close(ctx);
    }
}

struct FilterSource {
    upstream: ExecutionStream,
    #[allow(clippy::type_complexity)]
    predicate: Box<dyn FnMut(&Row, &mut ExecutionContext) -> ExecResult<bool>>,
}

impl RowSource for FilterSource {
    fn fetch(&mut self, ctx: &mut ExecutionContext) -> ExecResult<Option<Row>> {
        while self.upstream.has_next(ctx)? {
            let row = self.upstream.next(ctx)?;
            if (self.predicate)(&row, ctx)? {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn close(&mut self, ctx: &mut ExecutionContext) {
        self.upstream.close(ctx);
    }
}

struct FlatMapSource {
    upstream: ExecutionStream,
    #[allow(clippy::type_complexity)]
    f: Box<dyn FnMut(Row, &mut ExecutionContext) -> ExecResult<ExecutionStream>>,
    current: Option<ExecutionStream>,
}

impl RowSource for FlatMapSource {
    fn fetch(&mut self, ctx: &mut ExecutionContext) -> ExecResult<Option<Row>> {
        loop {
            if let Some(sub) = self.current.as_mut() {
                if sub.has_next(ctx)? {
                    return Ok(Some(sub.next(ctx)?));
                }
                if let Some(mut exhausted) = self.current.take() {
                    exhausted.close(ctx);
                }
            }
            if !self.upstream.has_next(ctx)? {
                return Ok(None);
            }
            let row = self.upstream.next(ctx)?;
            self.current = Some((self.f)(row, ctx)?);
        }
    }

    fn close(&mut self, ctx: &mut ExecutionContext) {
        if let Some(mut sub) = self.current.take() {
            sub.close(ctx);
        }
        self.upstream.close(ctx);
    }
}

struct LimitSource {
    upstream: ExecutionStream,
    remaining: usize,
}

impl RowSource for LimitSource {
    fn fetch(&mut self, ctx: &mut ExecutionContext) -> ExecResult<Option<Row>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        if !self.upstream.has_next(ctx)? {
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(self.upstream.next(ctx)?))
    }

    fn close(&mut self, ctx: &mut ExecutionContext) {
        self.upstream.close(ctx);
    }
}

struct InterruptableSource {
    upstream: ExecutionStream,
}

impl RowSource for InterruptableSource {
    fn fetch(&mut self, ctx: &mut ExecutionContext) -> ExecResult<Option<Row>> {
        if ctx.is_interrupted() {
            return Err(ExecutionError::Interrupted);
        }
        if !self.upstream.has_next(ctx)? {
            return Ok(None);
        }
        Ok(Some(self.upstream.next(ctx)?))
    }

    fn close(&mut self, ctx: &mut ExecutionContext) {
        self.upstream.close(ctx);
    }
}
