//! Path-bound scalar values exchanged with the datastore.

use std::fmt;

use crate::error::{GatewayError, Result};

/// Rendering of a record that carries no value.
pub const UNKNOWN_VALUE: &str = "N/A";

/// The kind of value a record holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    StringValue,
    IntValue,
    Unknown,
}

impl ValueKind {
    /// Get the string representation used in logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::StringValue => "string",
            ValueKind::IntValue => "int",
            ValueKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Value carried by a record. The variant is the record's kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RecordValue {
    #[default]
    Unknown,
    Str(String),
    Int(i64),
}

impl From<String> for RecordValue {
    fn from(v: String) -> Self {
        RecordValue::Str(v)
    }
}

impl From<&str> for RecordValue {
    fn from(v: &str) -> Self {
        RecordValue::Str(v.to_string())
    }
}

impl From<i64> for RecordValue {
    fn from(v: i64) -> Self {
        RecordValue::Int(v)
    }
}

impl From<i32> for RecordValue {
    fn from(v: i32) -> Self {
        RecordValue::Int(i64::from(v))
    }
}

/// A store-dialect path bound to a tagged scalar value.
///
/// Because the kind is the variant of [`RecordValue`], a record can never
/// claim one kind while holding another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueRecord {
    path: String,
    value: RecordValue,
}

impl ValueRecord {
    /// Create a path-only record of unknown kind.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            value: RecordValue::Unknown,
        }
    }

    /// Create a record with a value.
    pub fn with_value(path: impl Into<String>, value: impl Into<RecordValue>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    pub fn value(&self) -> &RecordValue {
        &self.value
    }

    /// Set the value, and with it the kind.
    pub fn set_value(&mut self, value: impl Into<RecordValue>) {
        self.value = value.into();
    }

    pub fn data_type(&self) -> ValueKind {
        match self.value {
            RecordValue::Unknown => ValueKind::Unknown,
            RecordValue::Str(_) => ValueKind::StringValue,
            RecordValue::Int(_) => ValueKind::IntValue,
        }
    }

    /// Render the value as a string.
    ///
    /// Records without a value render as [`UNKNOWN_VALUE`] rather than failing.
    pub fn get_str(&self) -> String {
        match &self.value {
            RecordValue::Unknown => UNKNOWN_VALUE.to_string(),
            RecordValue::Str(s) => s.clone(),
            RecordValue::Int(i) => i.to_string(),
        }
    }

    /// Get the integer value. Fails unless the record holds an integer.
    pub fn get_int(&self) -> Result<i64> {
        match self.value {
            RecordValue::Int(i) => Ok(i),
            _ => Err(GatewayError::KindMismatch {
                expected: ValueKind::IntValue.as_str(),
                found: self.data_type().as_str(),
            }),
        }
    }

    /// Reset to an empty path with no value.
    pub fn clean(&mut self) {
        self.path.clear();
        self.value = RecordValue::Unknown;
    }
}

impl fmt::Display for ValueRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.path, self.get_str())
    }
}
