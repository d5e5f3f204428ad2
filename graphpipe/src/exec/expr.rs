// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Operator parameter expressions
//!
//! The SQL parser lives outside this crate; planners hand operators
//! already-built expression trees. This is deliberately a small language:
//! property access, variables, parameters, literals and the binary
//! operators conditions need.

use crate::exec::context::ExecutionContext;
use crate::exec::error::{ExecResult, ExecutionError};
use crate::exec::row::Row;
use crate::storage::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    /// Property of the current row
    Property(String),
    /// Context variable (scope chain lookup)
    Variable(String),
    /// Named query parameter
    Parameter(String),
    Binary {
        left: Box<Expression>,
        op: BinaryOp,
        right: Box<Expression>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
}

impl Expression {
    pub fn literal(value: impl Into<Value>) -> Expression {
        Expression::Literal(value.into())
    }

    pub fn property(name: impl Into<String>) -> Expression {
        Expression::Property(name.into())
    }

    pub fn variable(name: impl Into<String>) -> Expression {
        Expression::Variable(name.into())
    }

    pub fn binary(left: Expression, op: BinaryOp, right: Expression) -> Expression {
        Expression::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Evaluate against an optional current row and the context.
    pub fn evaluate(&self, row: Option<&Row>, ctx: &ExecutionContext) -> ExecResult<Value> {
        match self {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Property(name) => Ok(row
                .and_then(|r| r.get_property(name))
                .cloned()
                .unwrap_or(Value::Null)),
            Expression::Variable(name) => Ok(ctx.get_variable(name).unwrap_or(Value::Null)),
            Expression::Parameter(name) => ctx.get_parameter(name).ok_or_else(|| {
                ExecutionError::ExpressionError(format!("unbound parameter '{}'", name))
            }),
            Expression::Binary { left, op, right } => {
                let l = left.evaluate(row, ctx)?;
                // Short-circuit logic operators
                match op {
                    BinaryOp::And => {
                        return if !truthy(&l, "AND")? {
                            Ok(Value::Boolean(false))
                        } else {
                            let r = right.evaluate(row, ctx)?;
                            Ok(Value::Boolean(truthy(&r, "AND")?))
                        };
                    }
                    BinaryOp::Or => {
                        return if truthy(&l, "OR")? {
                            Ok(Value::Boolean(true))
                        } else {
                            let r = right.evaluate(row, ctx)?;
                            Ok(Value::Boolean(truthy(&r, "OR")?))
                        };
                    }
                    _ => {}
                }
                let r = right.evaluate(row, ctx)?;
                apply_binary(*op, &l, &r)
            }
        }
    }

    /// Evaluate as a condition; non-boolean results are a type error.
    pub fn evaluate_bool(&self, row: Option<&Row>, ctx: &ExecutionContext) -> ExecResult<bool> {
        let value = self.evaluate(row, ctx)?;
        truthy(&value, "condition")
    }
}

fn truthy(value: &Value, what: &str) -> ExecResult<bool> {
    value.as_bool().ok_or_else(|| {
        ExecutionError::TypeError(format!("{} expects a boolean, got {}", what, value))
    })
}

fn apply_binary(op: BinaryOp, l: &Value, r: &Value) -> ExecResult<Value> {
    use std::cmp::Ordering;
    match op {
        BinaryOp::Eq => Ok(Value::Boolean(values_equal(l, r))),
        BinaryOp::Ne => Ok(Value::Boolean(!values_equal(l, r))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            // Comparisons on null are false, matching SQL semantics
            if l.is_null() || r.is_null() {
                return Ok(Value::Boolean(false));
            }
            let ord = l.compare(r);
            let result = match op {
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::Le => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                BinaryOp::Ge => ord != Ordering::Less,
                _ => unreachable!(),
            };
            Ok(Value::Boolean(result))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => arithmetic(op, l, r),
        BinaryOp::And | BinaryOp::Or => unreachable!("handled before evaluation of rhs"),
    }
}

/// Equality with cross-type numeric comparison; null equals nothing.
fn values_equal(l: &Value, r: &Value) -> bool {
    if l.is_null() || r.is_null() {
        return false;
    }
    if l.is_number() && r.is_number() {
        return l.compare(r) == std::cmp::Ordering::Equal;
    }
    l == r
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> ExecResult<Value> {
    match (l, r) {
        (Value::Integer(a), Value::Integer(b)) => {
            let result = match op {
                BinaryOp::Add => a.checked_add(*b),
                BinaryOp::Sub => a.checked_sub(*b),
                BinaryOp::Mul => a.checked_mul(*b),
                _ => unreachable!(),
            };
            result.map(Value::Integer).ok_or_else(|| {
                ExecutionError::ExpressionError("integer overflow".to_string())
            })
        }
        _ if l.is_number() && r.is_number() => {
            let (a, b) = match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => unreachable!("is_number guarantees a float view"),
            };
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                _ => unreachable!(),
            };
            Ok(Value::Float(result))
        }
        (Value::String(a), Value::String(b)) if op == BinaryOp::Add => {
            Ok(Value::String(format!("{}{}", a, b)))
        }
        _ => Err(ExecutionError::TypeError(format!(
            "cannot apply {:?} to {} and {}",
            op, l, r
        ))),
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(v) => write!(f, "{}", v),
            Expression::Property(p) => write!(f, "{}", p),
            Expression::Variable(v) => write!(f, "${}", v),
            Expression::Parameter(p) => write!(f, ":{}", p),
            Expression::Binary { left, op, right } => {
                let sym = match op {
                    BinaryOp::Eq => "=",
                    BinaryOp::Ne => "<>",
                    BinaryOp::Lt => "<",
                    BinaryOp::Le => "<=",
                    BinaryOp::Gt => ">",
                    BinaryOp::Ge => ">=",
                    BinaryOp::And => "AND",
                    BinaryOp::Or => "OR",
                    BinaryOp::Add => "+",
                    BinaryOp::Sub => "-",
                    BinaryOp::Mul => "*",
                };
                write!(f, "({} {} {})", left, sym, right)
            }
        }
    }
}
