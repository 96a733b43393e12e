//! Column value model shared by schema metadata and the row store.

use std::fmt;

use chrono::{DateTime, Duration, FixedOffset};
use rust_decimal::Decimal;

/// A single column value.
///
/// The first five non-null variants map directly onto `SQLite` storage
/// classes. `Timestamp`, `Decimal`, and `Duration` do not; they are the
/// types the conversion policy in [`crate::convert`] exists for.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Bool(bool),
    /// A point in time carrying a fixed UTC offset.
    Timestamp(DateTime<FixedOffset>),
    /// An arbitrary-precision decimal.
    Decimal(Decimal),
    /// A signed span of elapsed time.
    Duration(Duration),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The declared type of this value, or `None` for `Null`.
    pub const fn value_type(&self) -> Option<ValueType> {
        match self {
            Self::Null => None,
            Self::Integer(_) => Some(ValueType::Integer),
            Self::Real(_) => Some(ValueType::Real),
            Self::Text(_) => Some(ValueType::Text),
            Self::Blob(_) => Some(ValueType::Blob),
            Self::Bool(_) => Some(ValueType::Bool),
            Self::Timestamp(_) => Some(ValueType::Timestamp),
            Self::Decimal(_) => Some(ValueType::Decimal),
            Self::Duration(_) => Some(ValueType::Duration),
        }
    }

    /// Human-readable type label, used in error messages.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
            Self::Bool(_) => "bool",
            Self::Timestamp(_) => "timestamp",
            Self::Decimal(_) => "decimal",
            Self::Duration(_) => "duration",
        }
    }
}

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Integer,
    Real,
    Text,
    Blob,
    Bool,
    Timestamp,
    Decimal,
    Duration,
}

impl ValueType {
    /// Whether `SQLite` can store, compare, and order this type natively.
    ///
    /// Booleans count as native: they occupy an INTEGER column.
    pub const fn is_native(self) -> bool {
        matches!(
            self,
            Self::Integer | Self::Real | Self::Text | Self::Blob | Self::Bool
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Text => "text",
            Self::Blob => "blob",
            Self::Bool => "bool",
            Self::Timestamp => "timestamp",
            Self::Decimal => "decimal",
            Self::Duration => "duration",
        };
        f.write_str(name)
    }
}
