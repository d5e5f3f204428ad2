// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Script control flow
//!
//! A script is a sequence of plans executed in order on one context.
//! RETURN ends the script early and its rows become the script result.
//! IF and WHILE run their bodies on the caller's context so variable
//! writes remain visible; FOREACH gives each iteration a child context
//! holding the loop variable, keeping it invisible after the loop.

use crate::exec::context::ExecutionContext;
use crate::exec::error::{ExecResult, ExecutionError};
use crate::exec::expr::Expression;
use crate::exec::plan::ExecutionPlan;
use crate::exec::row::Row;
use crate::exec::step::{Step, StepBase};
use crate::exec::stream::ExecutionStream;
use crate::storage::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Run a nested plan to completion. A timeout raised while draining is
/// forwarded to the plan's steps before it propagates, so buffering
/// operators inside the plan stop accumulating.
fn run_nested(plan: &mut ExecutionPlan, ctx: &mut ExecutionContext) -> ExecResult<Vec<Row>> {
    let result = plan.execute(ctx).and_then(|stream| stream.drain(ctx));
    if let Err(ExecutionError::Timeout { .. }) = &result {
        plan.send_timeout();
    }
    result
}

/// RETURN <expr>: source step emitting a single one-column row.
#[derive(Clone)]
pub struct ReturnStep {
    base: StepBase,
    expr: Expression,
}

impl ReturnStep {
    pub fn new(expr: Expression) -> Self {
        Self {
            base: StepBase::default(),
            expr,
        }
    }
}

impl Step for ReturnStep {
    fn name(&self) -> String {
        format!("Return[{}]", self.expr)
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn contains_return(&self) -> bool {
        true
    }

    fn start(
        &mut self,
        upstream: Option<ExecutionStream>,
        ctx: &mut ExecutionContext,
    ) -> ExecResult<ExecutionStream> {
        self.base.mark_started("Return")?;
        if let Some(mut upstream) = upstream {
            upstream.close(ctx);
        }
        let mut row = Row::new();
        row.set_property("value", self.expr.evaluate(None, ctx)?);
        Ok(ExecutionStream::from_rows(vec![row]))
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}

/// LET <name> = <expr>: writes a context variable, emits nothing.
#[derive(Clone)]
pub struct LetStep {
    base: StepBase,
    name: String,
    expr: Expression,
}

impl LetStep {
    pub fn new(name: impl Into<String>, expr: Expression) -> Self {
        Self {
            base: StepBase::default(),
            name: name.into(),
            expr,
        }
    }
}

impl Step for LetStep {
    fn name(&self) -> String {
        format!("Let[{}]", self.name)
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn can_be_cached(&self) -> bool {
        false
    }

    fn start(
        &mut self,
        upstream: Option<ExecutionStream>,
        ctx: &mut ExecutionContext,
    ) -> ExecResult<ExecutionStream> {
        self.base.mark_started("Let")?;
        if let Some(mut upstream) = upstream {
            upstream.close(ctx);
        }
        let value = self.expr.evaluate(None, ctx)?;
        ctx.set_variable(self.name.clone(), value);
        Ok(ExecutionStream::empty())
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}

/// IF <cond> { ... } ELSE { ... }
///
/// Whether the taken branch performed a RETURN is only known at run
/// time, so the step records it on a flag the enclosing script reads
/// after draining the step's output.
pub struct IfStep {
    base: StepBase,
    condition: Expression,
    then_plan: ExecutionPlan,
    else_plan: Option<ExecutionPlan>,
    returned: Arc<AtomicBool>,
}

// A cloned flow step starts idle with a cleared return flag; sharing the
// flag with the original would let one copy's RETURN leak into another.
impl Clone for IfStep {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            condition: self.condition.clone(),
            then_plan: self.then_plan.clone(),
            else_plan: self.else_plan.clone(),
            returned: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl IfStep {
    pub fn new(
        condition: Expression,
        then_plan: ExecutionPlan,
        else_plan: Option<ExecutionPlan>,
    ) -> Self {
        Self {
            base: StepBase::default(),
            condition,
            then_plan,
            else_plan,
            returned: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Step for IfStep {
    /// Did the executed branch end with a RETURN?
    fn returned(&self) -> bool {
        self.returned.load(Ordering::SeqCst)
    }

    fn name(&self) -> String {
        format!("If[{}]", self.condition)
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn can_be_cached(&self) -> bool {
        false
    }

    fn reset(&mut self) {
        self.then_plan.reset();
        if let Some(else_plan) = &mut self.else_plan {
            else_plan.reset();
        }
        self.returned.store(false, Ordering::SeqCst);
        self.base.reset();
    }

    fn start(
        &mut self,
        upstream: Option<ExecutionStream>,
        ctx: &mut ExecutionContext,
    ) -> ExecResult<ExecutionStream> {
        self.base.mark_started("If")?;
        if let Some(mut upstream) = upstream {
            upstream.close(ctx);
        }
        let branch = if self.condition.evaluate_bool(None, ctx)? {
            Some(&mut self.then_plan)
        } else {
            self.else_plan.as_mut()
        };
        match branch {
            Some(plan) => {
                let rows = run_nested(plan, ctx)?;
                self.returned.store(plan.returned(), Ordering::SeqCst);
                Ok(ExecutionStream::from_rows(rows))
            }
            None => Ok(ExecutionStream::empty()),
        }
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}

/// FOREACH <var> IN <expr> { ... }
///
/// Each iteration runs a fresh copy of the body on a child context, so
/// the loop variable and body-local variables never leak out.
pub struct ForEachStep {
    base: StepBase,
    variable: String,
    source: Expression,
    body: ExecutionPlan,
    returned: Arc<AtomicBool>,
}

impl Clone for ForEachStep {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            variable: self.variable.clone(),
            source: self.source.clone(),
            body: self.body.clone(),
            returned: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl ForEachStep {
    pub fn new(variable: impl Into<String>, source: Expression, body: ExecutionPlan) -> Self {
        Self {
            base: StepBase::default(),
            variable: variable.into(),
            source,
            body,
            returned: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Step for ForEachStep {
    fn returned(&self) -> bool {
        self.returned.load(Ordering::SeqCst)
    }

    fn name(&self) -> String {
        format!("ForEach[{}]", self.variable)
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn can_be_cached(&self) -> bool {
        false
    }

    fn reset(&mut self) {
        self.returned.store(false, Ordering::SeqCst);
        self.base.reset();
    }

    fn start(
        &mut self,
        upstream: Option<ExecutionStream>,
        ctx: &mut ExecutionContext,
    ) -> ExecResult<ExecutionStream> {
        self.base.mark_started("ForEach")?;
        if let Some(mut upstream) = upstream {
            upstream.close(ctx);
        }
        let items = match self.source.evaluate(None, ctx)? {
            Value::List(items) => items,
            Value::Null => Vec::new(),
            other => {
                return Err(ExecutionError::TypeError(format!(
                    "FOREACH source must be a list, got {}",
                    other.type_name()
                )))
            }
        };
        for item in items {
            if ctx.is_interrupted() {
                return Err(ExecutionError::Interrupted);
            }
            let mut child = ctx.child();
            child.set_variable(self.variable.clone(), item);
            let mut body = self.body.clone();
            let rows = run_nested(&mut body, &mut child)?;
            if body.returned() {
                self.returned.store(true, Ordering::SeqCst);
                return Ok(ExecutionStream::from_rows(rows));
            }
        }
        Ok(ExecutionStream::empty())
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}

/// WHILE <cond> { ... }
///
/// The body runs on the caller's context so that variable writes can
/// eventually falsify the condition. Interruption is checked once per
/// iteration.
pub struct WhileStep {
    base: StepBase,
    condition: Expression,
    body: ExecutionPlan,
    returned: Arc<AtomicBool>,
}

impl Clone for WhileStep {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            condition: self.condition.clone(),
            body: self.body.clone(),
            returned: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl WhileStep {
    pub fn new(condition: Expression, body: ExecutionPlan) -> Self {
        Self {
            base: StepBase::default(),
            condition,
            body,
            returned: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Step for WhileStep {
    fn returned(&self) -> bool {
        self.returned.load(Ordering::SeqCst)
    }

    fn name(&self) -> String {
        format!("While[{}]", self.condition)
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn can_be_cached(&self) -> bool {
        false
    }

    fn reset(&mut self) {
        self.returned.store(false, Ordering::SeqCst);
        self.base.reset();
    }

    fn start(
        &mut self,
        upstream: Option<ExecutionStream>,
        ctx: &mut ExecutionContext,
    ) -> ExecResult<ExecutionStream> {
        self.base.mark_started("While")?;
        if let Some(mut upstream) = upstream {
            upstream.close(ctx);
        }
        while self.condition.evaluate_bool(None, ctx)? {
            if ctx.is_interrupted() {
                return Err(ExecutionError::Interrupted);
            }
            let mut body = self.body.clone();
            let rows = run_nested(&mut body, ctx)?;
            if body.returned() {
                self.returned.store(true, Ordering::SeqCst);
                return Ok(ExecutionStream::from_rows(rows));
            }
        }
        Ok(ExecutionStream::empty())
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}

/// RETRY <n> { ... } [ELSE { ... }]
///
/// Reruns the body when it fails with a write conflict, whether the
/// conflict surfaces on start or while the body's stream is drained,
/// rolling the transaction back between attempts. Any other error
/// propagates immediately. After the last failed attempt the ELSE body
/// runs if present, otherwise the conflict surfaces to the caller.
#[derive(Clone)]
pub struct RetryStep {
    base: StepBase,
    body: ExecutionPlan,
    retries: usize,
    else_plan: Option<ExecutionPlan>,
}

impl RetryStep {
    pub fn new(body: ExecutionPlan, retries: usize) -> Self {
        Self {
            base: StepBase::default(),
            body,
            retries,
            else_plan: None,
        }
    }

    pub fn with_else(mut self, else_plan: ExecutionPlan) -> Self {
        self.else_plan = Some(else_plan);
        self
    }
}

impl Step for RetryStep {
    fn name(&self) -> String {
        format!("Retry[{}]", self.retries)
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn can_be_cached(&self) -> bool {
        false
    }

    fn start(
        &mut self,
        upstream: Option<ExecutionStream>,
        ctx: &mut ExecutionContext,
    ) -> ExecResult<ExecutionStream> {
        self.base.mark_started("Retry")?;
        if let Some(mut upstream) = upstream {
            upstream.close(ctx);
        }
        let attempts = self.retries.max(1);
        for attempt in 0..attempts {
            if ctx.is_interrupted() {
                return Err(ExecutionError::Interrupted);
            }
            let mut body = self.body.clone();
            match run_nested(&mut body, ctx) {
                Ok(rows) => return Ok(ExecutionStream::from_rows(rows)),
                Err(e) if e.is_retryable() => {
                    log::debug!("retry attempt {} failed with conflict: {}", attempt + 1, e);
                    ctx.transaction().rollback()?;
                }
                Err(e) => return Err(e),
            }
        }
        match &mut self.else_plan {
            Some(else_plan) => {
                let mut else_plan = else_plan.clone();
                let rows = run_nested(&mut else_plan, ctx)?;
                Ok(ExecutionStream::from_rows(rows))
            }
            None => Err(ExecutionError::ConcurrentModification(format!(
                "still conflicting after {} attempts",
                attempts
            ))),
        }
    }

    fn boxed_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }
}

/// An ordered list of statement plans executed as one script.
#[derive(Clone, Default)]
pub struct ScriptPlan {
    statements: Vec<ExecutionPlan>,
}

impl ScriptPlan {
    pub fn new(statements: Vec<ExecutionPlan>) -> Self {
        Self { statements }
    }

    /// Run the statements in order. A statement that performs a RETURN
    /// (statically, or at run time inside IF/FOREACH/WHILE) ends the
    /// script with its rows; otherwise the last statement's rows are the
    /// script result.
    pub fn execute(&mut self, ctx: &mut ExecutionContext) -> ExecResult<Vec<Row>> {
        let mut last = Vec::new();
        for plan in &mut self.statements {
            let rows = run_nested(plan, ctx)?;
            if plan.returned() {
                return Ok(rows);
            }
            last = rows;
        }
        Ok(last)
    }
}
