// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Tree-walking interpreter over `serde_json::Value`.
//!
//! Values borrowed from the environment stay borrowed until an operator
//! needs to produce a new one, so navigating `signal.hook.name` copies only
//! the leaf.

use std::borrow::Cow;
use std::cmp::Ordering;

use serde_json::{Number, Value};
use tracing::info;

use crate::error::RuntimeError;
use crate::expr::parser::{BinaryOp, Expr, LogicalOp, UnaryOp};
use crate::types::Metadata;

pub(crate) fn evaluate<'a>(expr: &'a Expr, env: &'a Metadata) -> Result<Cow<'a, Value>, RuntimeError> {
    match expr {
        Expr::Literal(value) => Ok(Cow::Borrowed(value)),
        Expr::Ident(name) => Ok(env.get(name).map_or(Cow::Owned(Value::Null), Cow::Borrowed)),
        Expr::Array(items) => {
            let values = items
                .iter()
                .map(|item| evaluate(item, env).map(Cow::into_owned))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Cow::Owned(Value::Array(values)))
        }
        Expr::Member(base, key) => member(evaluate(base, env)?, key),
        Expr::Index(base, index) => {
            let base = evaluate(base, env)?;
            let index = evaluate(index, env)?;
            match &*index {
                Value::String(key) => member(base, key),
                Value::Number(number) if number.is_i64() || number.is_u64() => {
                    element(base, number.as_i64().unwrap_or(i64::MAX))
                }
                other => Err(mismatch("[]", other)),
            }
        }
        Expr::Call(function, args) => call(function, args, env),
        Expr::Unary(op, operand) => unary(*op, &*evaluate(operand, env)?).map(Cow::Owned),
        Expr::Logical(op, left, right) => {
            let symbol = match op {
                LogicalOp::And => "&&",
                LogicalOp::Or => "||",
            };
            let left = boolean(symbol, &*evaluate(left, env)?)?;
            let decided = match op {
                LogicalOp::And => !left,
                LogicalOp::Or => left,
            };
            if decided {
                return Ok(Cow::Owned(Value::Bool(left)));
            }
            let right = boolean(symbol, &*evaluate(right, env)?)?;
            Ok(Cow::Owned(Value::Bool(right)))
        }
        Expr::Binary(op, left, right) => {
            let left = evaluate(left, env)?;
            let right = evaluate(right, env)?;
            binary(*op, &left, &right).map(Cow::Owned)
        }
        Expr::Conditional(condition, then, otherwise) => {
            if boolean("?:", &*evaluate(condition, env)?)? {
                evaluate(then, env)
            } else {
                evaluate(otherwise, env)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

fn member<'a>(base: Cow<'a, Value>, key: &str) -> Result<Cow<'a, Value>, RuntimeError> {
    match base {
        Cow::Borrowed(Value::Object(map)) => {
            Ok(map.get(key).map_or(Cow::Owned(Value::Null), Cow::Borrowed))
        }
        Cow::Owned(Value::Object(mut map)) => {
            Ok(Cow::Owned(map.remove(key).unwrap_or(Value::Null)))
        }
        base if base.is_null() => Ok(Cow::Owned(Value::Null)),
        base => Err(mismatch(".", &base)),
    }
}

fn element(base: Cow<'_, Value>, index: i64) -> Result<Cow<'_, Value>, RuntimeError> {
    let len = match &*base {
        Value::Array(items) => items.len(),
        Value::Null => return Ok(Cow::Owned(Value::Null)),
        other => return Err(mismatch("[]", other)),
    };
    let position = if index < 0 {
        i64::try_from(len).ok().and_then(|len| len.checked_add(index))
    } else {
        Some(index)
    }
    .and_then(|position| usize::try_from(position).ok())
    .filter(|&position| position < len)
    .ok_or(RuntimeError::IndexOutOfRange { index, len })?;

    match base {
        Cow::Borrowed(Value::Array(items)) => Ok(Cow::Borrowed(&items[position])),
        Cow::Owned(Value::Array(mut items)) => Ok(Cow::Owned(items.swap_remove(position))),
        _ => Ok(Cow::Owned(Value::Null)),
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

fn unary(op: UnaryOp, operand: &Value) -> Result<Value, RuntimeError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!boolean("!", operand)?)),
        UnaryOp::Neg => match operand {
            Value::Number(number) => match number.as_i64() {
                Some(int) => int
                    .checked_neg()
                    .map(Value::from)
                    .ok_or(RuntimeError::Overflow("-")),
                None => float(-number.as_f64().unwrap_or(f64::NAN)),
            },
            other => Err(mismatch("-", other)),
        },
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = order(left, right)
                .ok_or_else(|| mismatch_pair(op.symbol(), left, right))?;
            let holds = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Value::Bool(holds))
        }
        BinaryOp::In => match right {
            Value::Array(items) => Ok(Value::Bool(items.iter().any(|item| loose_eq(left, item)))),
            Value::Object(map) => match left {
                Value::String(key) => Ok(Value::Bool(map.contains_key(key))),
                other => Err(mismatch("in", other)),
            },
            other => Err(mismatch("in", other)),
        },
        BinaryOp::Contains | BinaryOp::StartsWith | BinaryOp::EndsWith => {
            let (Value::String(haystack), Value::String(needle)) = (left, right) else {
                return Err(mismatch_pair(op.symbol(), left, right));
            };
            let holds = match op {
                BinaryOp::Contains => haystack.contains(needle.as_str()),
                BinaryOp::StartsWith => haystack.starts_with(needle.as_str()),
                _ => haystack.ends_with(needle.as_str()),
            };
            Ok(Value::Bool(holds))
        }
        BinaryOp::Add => match (left, right) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            (Value::Number(a), Value::Number(b)) => arithmetic(op, a, b),
            _ => Err(mismatch_pair("+", left, right)),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => match (left, right) {
            (Value::Number(a), Value::Number(b)) => arithmetic(op, a, b),
            _ => Err(mismatch_pair(op.symbol(), left, right)),
        },
    }
}

fn arithmetic(op: BinaryOp, a: &Number, b: &Number) -> Result<Value, RuntimeError> {
    if let (Some(a), Some(b), false) = (a.as_i64(), b.as_i64(), op == BinaryOp::Div) {
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            _ if b == 0 => return Err(RuntimeError::DivisionByZero),
            _ => a.checked_rem(b),
        };
        return result
            .map(Value::from)
            .ok_or(RuntimeError::Overflow(op.symbol()));
    }

    let a = a.as_f64().unwrap_or(f64::NAN);
    let b = b.as_f64().unwrap_or(f64::NAN);
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        _ if b == 0.0 => return Err(RuntimeError::DivisionByZero),
        BinaryOp::Div => a / b,
        _ => a % b,
    };
    float(result)
}

fn float(value: f64) -> Result<Value, RuntimeError> {
    Number::from_f64(value)
        .filter(|_| value.is_finite())
        .map(Value::Number)
        .ok_or(RuntimeError::NotFinite)
}

/// Equality that treats `1` and `1.0` as the same number.
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        _ => left == right,
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn boolean(op: &'static str, value: &Value) -> Result<bool, RuntimeError> {
    value.as_bool().ok_or_else(|| mismatch(op, value))
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

/// Names and arities of the built-in functions; `None` means variadic.
pub(crate) const FUNCTIONS: &[(&str, Option<usize>)] = &[("print", None), ("len", Some(1))];

fn call<'a>(function: &str, args: &'a [Expr], env: &'a Metadata) -> Result<Cow<'a, Value>, RuntimeError> {
    let mut values = args
        .iter()
        .map(|arg| evaluate(arg, env).map(Cow::into_owned))
        .collect::<Result<Vec<_>, _>>()?;

    match function {
        "print" => {
            let rendered = values
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            info!(target: "sigact::policy", output = %rendered, "print");
            Ok(Cow::Owned(values.pop().unwrap_or(Value::Null)))
        }
        "len" => {
            let len = match values.first() {
                Some(Value::String(text)) => text.chars().count(),
                Some(Value::Array(items)) => items.len(),
                Some(Value::Object(map)) => map.len(),
                Some(other) => return Err(mismatch("len", other)),
                None => return Err(mismatch("len", &Value::Null)),
            };
            Ok(Cow::Owned(Value::from(len)))
        }
        // Unknown names are rejected when the program is compiled.
        _ => Ok(Cow::Owned(Value::Null)),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

fn mismatch(op: &'static str, value: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        op,
        found: type_name(value).into(),
    }
}

fn mismatch_pair(op: &'static str, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        op,
        found: format!("{} and {}", type_name(left), type_name(right)),
    }
}
