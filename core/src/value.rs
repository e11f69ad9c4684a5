//! Value types for rulebank attributes.
//!
//! Values are the scalars stored in row attributes. Aggregations operate on
//! `Int` and `Float` only, and never mix the two: the declared kind of the
//! derived attribute decides which arithmetic is used.

use crate::{EntityKey, ValueError};
use std::fmt;

/// Declared kind of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    String,
    Ref,
}

impl ValueKind {
    /// Returns true for kinds that aggregations can sum.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueKind::Int | ValueKind::Float)
    }

    /// The additive identity for numeric kinds.
    pub fn zero(&self) -> Option<Value> {
        match self {
            ValueKind::Int => Some(Value::Int(0)),
            ValueKind::Float => Some(Value::Float(0.0)),
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Bool => "Bool",
            ValueKind::Int => "Int",
            ValueKind::Float => "Float",
            ValueKind::String => "String",
            ValueKind::Ref => "Ref",
        };
        f.write_str(name)
    }
}

/// A value that can be stored in an attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null/missing value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Reference to another entity (foreign key).
    Ref(EntityKey),
}

impl Value {
    /// Returns true if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get as boolean if this is a Bool value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer if this is an Int value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as float. Int values widen.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as string reference if this is a String value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as entity key if this is a Ref value.
    pub fn as_ref_key(&self) -> Option<EntityKey> {
        match self {
            Value::Ref(key) => Some(*key),
            _ => None,
        }
    }

    /// The kind of this value, or None for Null.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueKind::Bool),
            Value::Int(_) => Some(ValueKind::Int),
            Value::Float(_) => Some(ValueKind::Float),
            Value::String(_) => Some(ValueKind::String),
            Value::Ref(_) => Some(ValueKind::Ref),
        }
    }

    /// Returns the type name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Ref(_) => "Ref",
        }
    }

    /// Null is accepted for every kind.
    pub fn conforms_to(&self, kind: ValueKind) -> bool {
        self.kind().map_or(true, |k| k == kind)
    }

    /// Add `other` to `self`, both in `kind` arithmetic.
    ///
    /// Null operands count as zero. Int addition is checked.
    pub fn checked_add(&self, other: &Value, kind: ValueKind) -> Result<Value, ValueError> {
        match kind {
            ValueKind::Int => {
                let a = self.numeric_int()?;
                let b = other.numeric_int()?;
                a.checked_add(b)
                    .map(Value::Int)
                    .ok_or(ValueError::Overflow { left: a, right: b })
            }
            ValueKind::Float => {
                let a = self.numeric_float()?;
                let b = other.numeric_float()?;
                Ok(Value::Float(a + b))
            }
            other_kind => Err(ValueError::NotNumeric {
                kind: other_kind.to_string(),
            }),
        }
    }

    /// Subtract `other` from `self`, both in `kind` arithmetic.
    pub fn checked_sub(&self, other: &Value, kind: ValueKind) -> Result<Value, ValueError> {
        self.checked_add(&other.negate(kind)?, kind)
    }

    /// Additive inverse in `kind` arithmetic.
    pub fn negate(&self, kind: ValueKind) -> Result<Value, ValueError> {
        match kind {
            ValueKind::Int => {
                let a = self.numeric_int()?;
                a.checked_neg()
                    .map(Value::Int)
                    .ok_or(ValueError::Overflow { left: 0, right: a })
            }
            ValueKind::Float => Ok(Value::Float(-self.numeric_float()?)),
            other_kind => Err(ValueError::NotNumeric {
                kind: other_kind.to_string(),
            }),
        }
    }

    fn numeric_int(&self) -> Result<i64, ValueError> {
        match self {
            Value::Null => Ok(0),
            Value::Int(i) => Ok(*i),
            other => Err(ValueError::Mismatch {
                expected: ValueKind::Int.to_string(),
                actual: other.type_name().to_string(),
            }),
        }
    }

    fn numeric_float(&self) -> Result<f64, ValueError> {
        match self {
            Value::Null => Ok(0.0),
            Value::Float(f) => Ok(*f),
            other => Err(ValueError::Mismatch {
                expected: ValueKind::Float.to_string(),
                actual: other.type_name().to_string(),
            }),
        }
    }

    /// Render without quoting, for user-facing messages.
    pub fn to_plain_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Ref(key) => write!(f, "{}", key),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<EntityKey> for Value {
    fn from(key: EntityKey) -> Self {
        Value::Ref(key)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
