//! Runtime value type.
//!
//! Scripts are dynamically typed.  Numbers keep their integer-ness until an
//! operation forces a fraction; text compares case-insensitively, which is
//! what script authors expect from `if {name} is "steve"`.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::{ExecError, ExecResult};

/// A runtime value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Unset variable, skipped optional, or an effect's result.
    #[default]
    None,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    /// Host-defined object, identified by type name and a stable id.
    Object { type_name: Arc<str>, id: String },
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("<none>"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => {
                if x.fract() == 0.0 && x.abs() < 1e15 {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{x}")
                }
            }
            Value::Text(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Object { id, .. } => f.write_str(id),
        }
    }
}

/// Loose equality: numbers compare numerically, text ignores case.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Text(a), Value::Text(b)) => a.to_lowercase() == b.to_lowercase(),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (
                Value::Object { type_name: ta, id: ia },
                Value::Object { type_name: tb, id: ib },
            ) => ta == tb && ia == ib,
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl Value {
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Numeric view of `Int` and `Float`; other variants are not numbers.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Integer view; floats qualify only when they have no fraction.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(x) if x.fract() == 0.0 && x.abs() < 9.0e15 => Some(*x as i64),
            _ => None,
        }
    }

    /// Truthiness used where a condition expects a boolean.
    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Object { .. } => true,
        }
    }

    /// Built-in type name, as known to the type registry.
    pub fn type_name(&self) -> &str {
        match self {
            Value::None => "object",
            Value::Int(_) => "integer",
            Value::Float(_) => "number",
            Value::Text(_) => "text",
            Value::Bool(_) => "boolean",
            Value::Object { type_name, .. } => type_name,
        }
    }

    /// Ordering for comparisons: numbers numerically, text case-insensitively.
    pub fn compare(&self, rhs: &Value) -> Option<Ordering> {
        match (self, rhs) {
            (Value::Text(a), Value::Text(b)) => Some(a.to_lowercase().cmp(&b.to_lowercase())),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (a, b) => a.as_number()?.partial_cmp(&b.as_number()?),
        }
    }

    // ── Arithmetic helpers ────────────────────────────────────────────────────

    fn operands(&self, rhs: &Value, op: &str) -> ExecResult<(f64, f64)> {
        let a = self.as_number().ok_or_else(|| not_a_number(self, op))?;
        let b = rhs.as_number().ok_or_else(|| not_a_number(rhs, op))?;
        Ok((a, b))
    }

    pub fn arith_add(&self, rhs: &Value) -> ExecResult<Value> {
        if let (Value::Int(a), Value::Int(b)) = (self, rhs) {
            if let Some(n) = a.checked_add(*b) {
                return Ok(Value::Int(n));
            }
        }
        let (a, b) = self.operands(rhs, "+")?;
        Ok(Value::Float(a + b))
    }

    pub fn arith_sub(&self, rhs: &Value) -> ExecResult<Value> {
        if let (Value::Int(a), Value::Int(b)) = (self, rhs) {
            if let Some(n) = a.checked_sub(*b) {
                return Ok(Value::Int(n));
            }
        }
        let (a, b) = self.operands(rhs, "-")?;
        Ok(Value::Float(a - b))
    }

    pub fn arith_mul(&self, rhs: &Value) -> ExecResult<Value> {
        if let (Value::Int(a), Value::Int(b)) = (self, rhs) {
            if let Some(n) = a.checked_mul(*b) {
                return Ok(Value::Int(n));
            }
        }
        let (a, b) = self.operands(rhs, "*")?;
        Ok(Value::Float(a * b))
    }

    /// Division stays integral when it divides evenly.
    pub fn arith_div(&self, rhs: &Value) -> ExecResult<Value> {
        let (a, b) = self.operands(rhs, "/")?;
        if b == 0.0 {
            return Err(ExecError::msg("division by zero"));
        }
        if let (Value::Int(x), Value::Int(y)) = (self, rhs) {
            if x.checked_rem(*y) == Some(0) {
                if let Some(q) = x.checked_div(*y) {
                    return Ok(Value::Int(q));
                }
            }
        }
        Ok(Value::Float(a / b))
    }
}

fn not_a_number(v: &Value, op: &str) -> ExecError {
    ExecError::msg(format!("'{v}' is not a number (in '{op}')"))
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
