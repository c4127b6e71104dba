/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The closed set of element kinds a variable may hold.
//!
//! Every variable stores values of exactly one [`ValueKind`]. Values
//! of the same kind are totally ordered (floats by
//! [`f64::total_cmp`], with `-0.0 == 0.0`); comparing values of
//! different kinds is an error rather than an arbitrary answer.

use std::cmp::Ordering;
use std::fmt;

use chrono::DateTime;
use chrono::NaiveDateTime;
use enum_as_inner::EnumAsInner;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;

/// The kind of a [`Value`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Int,
    Float,
    DateTime,
    Text,
}

impl ValueKind {
    /// The value new cells of this kind start with, unless a variable
    /// declares its own default.
    pub fn default_value(self) -> Value {
        match self {
            ValueKind::Int => Value::Int(0),
            ValueKind::Float => Value::Float(0.0),
            ValueKind::DateTime => Value::DateTime(NaiveDateTime::default()),
            ValueKind::Text => Value::Text(String::new()),
        }
    }

    /// Whether values of this kind lie on a numeric axis, so that
    /// distances between them (and therefore linear interpolation) are
    /// defined.
    pub fn is_numeric(self) -> bool {
        !matches!(self, ValueKind::Text)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::DateTime => "datetime",
            ValueKind::Text => "text",
        };
        write!(f, "{}", name)
    }
}

/// A single element of a variable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum Value {
    Int(i64),
    Float(f64),
    DateTime(NaiveDateTime),
    Text(String),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::DateTime(_) => ValueKind::DateTime,
            Value::Text(_) => ValueKind::Text,
        }
    }

    /// Fails with [`Error::KindMismatch`] unless this value is of kind
    /// `expected`.
    pub fn expect_kind(&self, expected: ValueKind) -> Result<(), Error> {
        if self.kind() != expected {
            return Err(Error::KindMismatch {
                expected,
                got: self.kind(),
            });
        }
        Ok(())
    }

    /// Total order between two values of the same kind.
    pub fn try_cmp(&self, other: &Value) -> Result<Ordering, Error> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            // Signed zeros compare equal; otherwise the IEEE total order.
            (Value::Float(a), Value::Float(b)) if a == b => Ok(Ordering::Equal),
            (Value::Float(a), Value::Float(b)) => Ok(a.total_cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Ok(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Ok(a.cmp(b)),
            _ => Err(Error::KindMismatch {
                expected: self.kind(),
                got: other.kind(),
            }),
        }
    }

    /// Fails with [`Error::InvalidValue`] if this value has no place on
    /// a sorted argument axis. Only a float NaN fails.
    pub fn check_orderable(&self) -> Result<(), Error> {
        match self {
            Value::Float(v) if v.is_nan() => Err(Error::InvalidValue {
                reason: "NaN cannot be an argument value".to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// The position of this value on a numeric axis: the number itself,
    /// or milliseconds since the Unix epoch for date/times. Text has no
    /// such position.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::DateTime(v) => Some(v.and_utc().timestamp_millis() as f64),
            Value::Text(_) => None,
        }
    }

    /// The value of kind `kind` at numeric position `x`; the inverse
    /// of [`Value::to_f64`]. Integers and date/times are rounded to the
    /// nearest representable value.
    pub fn from_f64(kind: ValueKind, x: f64) -> Result<Value, Error> {
        if !x.is_finite() && matches!(kind, ValueKind::Int | ValueKind::DateTime) {
            return Err(Error::InvalidValue {
                reason: format!("{x} has no {kind} value"),
            });
        }
        match kind {
            ValueKind::Int => Ok(Value::Int(x.round() as i64)),
            ValueKind::Float => Ok(Value::Float(x)),
            ValueKind::DateTime => DateTime::from_timestamp_millis(x.round() as i64)
                .map(|dt| Value::DateTime(dt.naive_utc()))
                .ok_or_else(|| Error::unsupported(format!("{x} ms is not a representable date/time"))),
            ValueKind::Text => Err(Error::unsupported("text values have no numeric position")),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.try_cmp(other).ok()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "\"{}\"", v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}
