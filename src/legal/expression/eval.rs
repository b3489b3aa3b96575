//! Expression evaluation
//!
//! Evaluation is pure: it reads the metadata through a [`Context`] and never mutates it.
//! Paths that resolve to nothing evaluate to [`Value::Null`] and are collected in
//! [`Evaluation::missing`] so the caller can decide whether to keep the original token.

use super::ast::{BinaryOp, Expr, UnaryOp};
use crate::legal::helpers::{self, HelperError};
use crate::legal::value::{path_to_string, Mapping, PathSegment, Value};
use std::cmp::Ordering;
use thiserror::Error;

/// Errors that abort the evaluation of a single expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("unknown helper '{0}'")]
    UnknownHelper(String),
    #[error("helper '{name}' failed: {message}")]
    HelperFailed { name: String, message: String },
    #[error("invalid operands for '{op}': {message}")]
    InvalidOperand { op: String, message: String },
}

/// One loop iteration scope.
#[derive(Debug, Clone)]
struct Frame {
    item: Value,
    index: usize,
    len: usize,
}

/// Variable scope for evaluation: the document metadata plus any enclosing loop iterations.
#[derive(Debug, Clone)]
pub struct Context<'a> {
    root: &'a Mapping,
    frames: Vec<Frame>,
}

impl<'a> Context<'a> {
    pub fn new(root: &'a Mapping) -> Self {
        Self {
            root,
            frames: Vec::new(),
        }
    }

    /// Enter a loop iteration with `item` bound to `this`.
    pub fn push(&mut self, item: Value, index: usize, len: usize) {
        self.frames.push(Frame { item, index, len });
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// True while rendering inside a loop or section iteration.
    pub fn in_iteration(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Resolve a path, innermost scope first.
    pub fn resolve(&self, path: &[PathSegment]) -> Option<Value> {
        let (head, rest) = path.split_first()?;
        let key = match head {
            PathSegment::Key(key) => key.as_str(),
            PathSegment::Index(_) => return None,
        };

        if let Some(frame) = self.frames.last() {
            match key {
                "this" | "." => return descend(&frame.item, rest),
                "@index" if rest.is_empty() => return Some(Value::Number(frame.index as f64)),
                "@first" if rest.is_empty() => return Some(Value::Bool(frame.index == 0)),
                "@last" if rest.is_empty() => {
                    return Some(Value::Bool(frame.index + 1 == frame.len))
                }
                _ => {}
            }
        }

        for frame in self.frames.iter().rev() {
            if let Value::Mapping(map) = &frame.item {
                if let Some(found) = map.get(key) {
                    return descend(found, rest);
                }
            }
        }

        self.root.get(key).and_then(|found| descend(found, rest))
    }
}

fn descend(value: &Value, rest: &[PathSegment]) -> Option<Value> {
    if rest.is_empty() {
        Some(value.clone())
    } else {
        value.lookup_owned(rest)
    }
}

/// Result of evaluating one expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub value: Value,
    /// Paths that resolved to nothing, in the order they were visited.
    pub missing: Vec<String>,
}

impl Evaluation {
    pub fn is_resolved(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Evaluate an expression against a context.
pub fn evaluate(expr: &Expr, ctx: &Context) -> Result<Evaluation, EvalError> {
    let mut missing = Vec::new();
    let value = eval(expr, ctx, &mut missing)?;
    Ok(Evaluation { value, missing })
}

fn eval(expr: &Expr, ctx: &Context, missing: &mut Vec<String>) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path(path) => match ctx.resolve(path) {
            Some(value) => Ok(value),
            None => {
                missing.push(path_to_string(path));
                Ok(Value::Null)
            }
        },
        Expr::Unary(op, inner) => {
            let value = eval(inner, ctx, missing)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                UnaryOp::Neg => match value {
                    Value::Null => Ok(Value::Null),
                    other => numeric("-", &other).map(|n| Value::Number(-n)),
                },
            }
        }
        Expr::Binary(lhs, BinaryOp::Or, rhs) => {
            let left = eval(lhs, ctx, missing)?;
            if left.is_truthy() {
                Ok(left)
            } else {
                eval(rhs, ctx, missing)
            }
        }
        Expr::Binary(lhs, BinaryOp::And, rhs) => {
            let left = eval(lhs, ctx, missing)?;
            if left.is_truthy() {
                eval(rhs, ctx, missing)
            } else {
                Ok(left)
            }
        }
        Expr::Binary(lhs, op, rhs) => {
            let left = eval(lhs, ctx, missing)?;
            let right = eval(rhs, ctx, missing)?;
            binary(*op, left, right)
        }
        Expr::Ternary(cond, then, otherwise) => {
            if eval(cond, ctx, missing)?.is_truthy() {
                eval(then, ctx, missing)
            } else {
                eval(otherwise, ctx, missing)
            }
        }
        Expr::Call(name, args) => {
            let helper =
                helpers::lookup(name).ok_or_else(|| EvalError::UnknownHelper(name.clone()))?;
            let values = args
                .iter()
                .map(|arg| eval(arg, ctx, missing))
                .collect::<Result<Vec<_>, _>>()?;
            helper(&values).map_err(|HelperError(message)| EvalError::HelperFailed {
                name: name.clone(),
                message,
            })
        }
        Expr::Array(items) => items
            .iter()
            .map(|item| eval(item, ctx, missing))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Sequence),
    }
}

fn numeric(op: &str, value: &Value) -> Result<f64, EvalError> {
    value.as_f64().ok_or_else(|| EvalError::InvalidOperand {
        op: op.to_string(),
        message: format!("'{}' is not a number", value.render()),
    })
}

/// Equality: numeric when one side is a number and the other coerces, structural otherwise.
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), other) | (other, Value::Number(a)) => match other.as_f64() {
            Some(b) => *a == b,
            None => false,
        },
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => match (left.as_f64(), right.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => Some(a.cmp(b)),
        },
        (Value::Null, _) | (_, Value::Null) => None,
        _ => left.as_f64()?.partial_cmp(&right.as_f64()?),
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    let symbol = op.to_string();
    match op {
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(&left, &right))),
        BinaryOp::NotEq => Ok(Value::Bool(!loose_eq(&left, &right))),
        BinaryOp::Lt => Ok(Value::Bool(compare(&left, &right) == Some(Ordering::Less))),
        BinaryOp::LtEq => Ok(Value::Bool(matches!(
            compare(&left, &right),
            Some(Ordering::Less | Ordering::Equal)
        ))),
        BinaryOp::Gt => Ok(Value::Bool(compare(&left, &right) == Some(Ordering::Greater))),
        BinaryOp::GtEq => Ok(Value::Bool(matches!(
            compare(&left, &right),
            Some(Ordering::Greater | Ordering::Equal)
        ))),
        BinaryOp::Add if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) => {
            Ok(Value::String(format!("{}{}", left.render(), right.render())))
        }
        _ if matches!(left, Value::Null) || matches!(right, Value::Null) => Ok(Value::Null),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let a = numeric(&symbol, &left)?;
            let b = numeric(&symbol, &right)?;
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                _ if b == 0.0 => {
                    return Err(EvalError::InvalidOperand {
                        op: symbol,
                        message: "division by zero".to_string(),
                    })
                }
                BinaryOp::Div => a / b,
                _ => a % b,
            };
            Ok(Value::Number(result))
        }
        BinaryOp::Or => Ok(if left.is_truthy() { left } else { right }),
        BinaryOp::And => Ok(if left.is_truthy() { right } else { left }),
    }
}
