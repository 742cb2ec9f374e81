//! Runtime values and their arithmetic.

use std::fmt;

use chrono::{DateTime, Duration, FixedOffset, Utc};

use crate::ast::{BinaryOp, CompareOp};
use crate::error::DslError;

const MICROS_PER_MINUTE: f64 = 60_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Time,
    Duration,
    Number,
    Text,
    Bool,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Time => "time",
            Self::Duration => "duration",
            Self::Number => "number",
            Self::Text => "string",
            Self::Bool => "boolean",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Time(DateTime<Utc>),
    Duration(Duration),
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Value {
    pub fn kind(&self) -> ValueType {
        match self {
            Self::Time(_) => ValueType::Time,
            Self::Duration(_) => ValueType::Duration,
            Self::Number(_) => ValueType::Number,
            Self::Text(_) => ValueType::Text,
            Self::Bool(_) => ValueType::Bool,
        }
    }

    /// Render for a breakdown step; times are shown in `offset`.
    pub fn render(&self, offset: FixedOffset) -> String {
        match self {
            Self::Time(t) => t.with_timezone(&offset).format("%H:%M:%S").to_string(),
            Self::Duration(d) => format!("{:.2} min", duration_minutes(*d)),
            Self::Number(n) => format!("{n}"),
            Self::Text(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

/// Convert fractional minutes to a duration at microsecond resolution.
pub fn minutes(m: f64) -> Result<Duration, DslError> {
    let micros = m * MICROS_PER_MINUTE;
    if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
        return Err(DslError::Overflow(format!("{m} minutes")));
    }
    Ok(Duration::microseconds(micros.round() as i64))
}

pub fn duration_minutes(d: Duration) -> f64 {
    d.num_microseconds()
        .map_or_else(|| d.num_milliseconds() as f64 / 60_000.0, |us| us as f64 / MICROS_PER_MINUTE)
}

fn scale(d: Duration, factor: f64) -> Result<Duration, DslError> {
    minutes(duration_minutes(d) * factor)
}

fn type_error(op: &str, lhs: &Value, rhs: &Value) -> DslError {
    DslError::Type(format!("cannot apply '{op}' to {} and {}", lhs.kind(), rhs.kind()))
}

pub(crate) fn shift(t: DateTime<Utc>, d: Duration) -> Result<DateTime<Utc>, DslError> {
    t.checked_add_signed(d)
        .ok_or_else(|| DslError::Overflow("instant out of range".into()))
}

fn number(n: f64) -> Result<Value, DslError> {
    if n.is_finite() {
        Ok(Value::Number(n))
    } else {
        Err(DslError::Overflow(format!("{n}")))
    }
}

/// Apply an arithmetic operator.
pub fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, DslError> {
    use Value::{Duration as Dur, Number as Num, Time};
    let sym = op.symbol();
    match (op, lhs, rhs) {
        (BinaryOp::Add, Time(t), Dur(d)) | (BinaryOp::Add, Dur(d), Time(t)) => {
            Ok(Time(shift(*t, *d)?))
        }
        (BinaryOp::Sub, Time(t), Dur(d)) => Ok(Time(shift(*t, -*d)?)),
        (BinaryOp::Sub, Time(a), Time(b)) => Ok(Dur(a.signed_duration_since(*b))),
        (BinaryOp::Add, Dur(a), Dur(b)) => a
            .checked_add(b)
            .map(Dur)
            .ok_or_else(|| DslError::Overflow("duration sum".into())),
        (BinaryOp::Sub, Dur(a), Dur(b)) => a
            .checked_sub(b)
            .map(Dur)
            .ok_or_else(|| DslError::Overflow("duration difference".into())),
        (BinaryOp::Mul, Dur(d), Num(n)) | (BinaryOp::Mul, Num(n), Dur(d)) => Ok(Dur(scale(*d, *n)?)),
        (BinaryOp::Div, Dur(_), Num(n)) | (BinaryOp::Div, Num(_), Num(n)) if *n == 0.0 => {
            Err(DslError::DivisionByZero)
        }
        (BinaryOp::Div, Dur(d), Num(n)) => Ok(Dur(scale(*d, 1.0 / *n)?)),
        (BinaryOp::Add, Num(a), Num(b)) => number(a + b),
        (BinaryOp::Sub, Num(a), Num(b)) => number(a - b),
        (BinaryOp::Mul, Num(a), Num(b)) => number(a * b),
        (BinaryOp::Div, Num(a), Num(b)) => number(a / b),
        _ => Err(type_error(sym, lhs, rhs)),
    }
}

/// Apply a comparison operator.
pub fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> Result<bool, DslError> {
    use std::cmp::Ordering;
    let ordering = match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::Duration(a), Value::Duration(b)) => Some(a.cmp(b)),
        (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
        (Value::Text(a), Value::Text(b)) => {
            return match op {
                CompareOp::Eq => Ok(a == b),
                CompareOp::Ne => Ok(a != b),
                _ => Err(DslError::Type(format!(
                    "strings only support == and !=, got '{}'",
                    op.symbol()
                ))),
            };
        }
        (Value::Bool(a), Value::Bool(b)) if matches!(op, CompareOp::Eq | CompareOp::Ne) => {
            return Ok((a == b) == (op == CompareOp::Eq));
        }
        _ => return Err(type_error(op.symbol(), lhs, rhs)),
    };
    let Some(ord) = ordering else {
        return Ok(op == CompareOp::Ne);
    };
    Ok(match op {
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::Ge => ord != Ordering::Less,
        CompareOp::Le => ord != Ordering::Greater,
        CompareOp::Eq => ord == Ordering::Equal,
        CompareOp::Ne => ord != Ordering::Equal,
    })
}
