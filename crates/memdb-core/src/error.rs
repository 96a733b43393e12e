//! Port-level error types.
//!
//! These are the errors the storage adapter maps its driver failures
//! into; no driver types leak through them.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::value::ValueType;

/// Errors raised while encoding or decoding a value conversion.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The timestamp does not fit the packed 64-bit encoding.
    #[error("timestamp cannot be packed into 64 bits")]
    TimestampOutOfRange,

    /// The duration exceeds what a 64-bit microsecond count can hold.
    #[error("duration out of range for a 64-bit microsecond encoding")]
    DurationOutOfRange,

    /// The decimal has no finite f64 representation.
    #[error("decimal {0} has no finite f64 representation")]
    UnrepresentableDecimal(Decimal),

    /// The value's type does not match the conversion it was given to.
    #[error("cannot convert a {actual} value with a {expected} conversion")]
    TypeMismatch {
        expected: ValueType,
        actual: &'static str,
    },

    /// A stored value could not be parsed back into its declared type.
    #[error("stored {ty} value is malformed: {detail}")]
    Malformed { ty: ValueType, detail: String },
}

/// Errors raised by the row store once a context is in use.
///
/// These surface from queries and flushes performed against an already
/// created context and are never wrapped into a creation failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// The column's type cannot be ordered or compared without a value
    /// conversion. This is the failure conversions exist to avoid.
    #[error("column {column} has type {ty}, which cannot be ordered or compared without a value conversion")]
    UnsupportedValueType { column: String, ty: ValueType },

    #[error("unknown table {0}")]
    UnknownTable(String),

    #[error("unknown column {0}")]
    UnknownColumn(String),

    /// A row was supplied with the wrong number of values for its table.
    #[error("table {table} has {expected} columns but {actual} values were supplied")]
    WrongValueCount {
        table: String,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// A fetched row could not be decoded into domain values.
    #[error("failed to decode row: {0}")]
    Decode(String),
}
