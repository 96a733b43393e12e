//! Value conversion policy for types `SQLite` cannot represent natively.
//!
//! `SQLite` has no storage class for timestamps with offsets,
//! arbitrary-precision decimals, or durations. Each conversion here maps
//! one of those to a storage-representable type and back:
//!
//! - timestamp -> INTEGER: packed `unix_millis << 12 | (offset_minutes + 2048)`.
//!   The offset survives the round trip to the minute; the instant is
//!   truncated to millisecond precision. Integer ordering follows the
//!   instant at millisecond granularity.
//! - decimal -> REAL: lossy beyond the f64 mantissa. Relative order is
//!   preserved for values that differ by more than rounding error.
//! - duration -> INTEGER: whole microseconds, lossless.
//!
//! [`conversion_for`] is the policy lookup the schema customizer applies;
//! it is a pure function of the declared column type. Nullability is a
//! column flag rather than a distinct type, so nullable columns hit the
//! same rules.

use chrono::{DateTime, Duration, FixedOffset, TimeZone};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

use crate::error::ConversionError;
use crate::value::{Value, ValueType};

/// Bit width of the offset field in the packed timestamp encoding.
const OFFSET_BITS: u32 = 12;
const OFFSET_BIAS: i64 = 2048;
const OFFSET_MASK: i64 = 0xFFF;

/// A (source type -> storage type) mapping with its encode/decode pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// Timestamp packed into an i64, offset preserved to the minute.
    TimestampToInteger,
    /// Timestamp as RFC 3339 text; fully lossless. Never attached by the
    /// policy, available for explicit per-column configuration.
    TimestampToText,
    /// Decimal as f64; documented lossy beyond the f64 mantissa.
    DecimalToReal,
    /// Duration as whole microseconds.
    DurationToInteger,
}

/// Policy lookup: the conversion to attach for a declared column type,
/// or `None` when `SQLite` handles the type natively.
pub const fn conversion_for(ty: ValueType) -> Option<Conversion> {
    match ty {
        ValueType::Timestamp => Some(Conversion::TimestampToInteger),
        ValueType::Decimal => Some(Conversion::DecimalToReal),
        ValueType::Duration => Some(Conversion::DurationToInteger),
        _ => None,
    }
}

impl Conversion {
    /// The declared type this conversion applies to.
    pub const fn source_type(self) -> ValueType {
        match self {
            Self::TimestampToInteger | Self::TimestampToText => ValueType::Timestamp,
            Self::DecimalToReal => ValueType::Decimal,
            Self::DurationToInteger => ValueType::Duration,
        }
    }

    /// The storage-representable type the column occupies.
    pub const fn store_as(self) -> ValueType {
        match self {
            Self::TimestampToInteger | Self::DurationToInteger => ValueType::Integer,
            Self::TimestampToText => ValueType::Text,
            Self::DecimalToReal => ValueType::Real,
        }
    }

    /// Encode a domain value into its storage representation.
    ///
    /// `Null` passes through unchanged.
    pub fn encode(self, value: Value) -> Result<Value, ConversionError> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (Self::TimestampToInteger, Value::Timestamp(ts)) => {
                pack_timestamp(&ts).map(Value::Integer)
            }
            (Self::TimestampToText, Value::Timestamp(ts)) => Ok(Value::Text(ts.to_rfc3339())),
            (Self::DecimalToReal, Value::Decimal(d)) => d
                .to_f64()
                .filter(|f| f.is_finite())
                .map(Value::Real)
                .ok_or(ConversionError::UnrepresentableDecimal(d)),
            (Self::DurationToInteger, Value::Duration(d)) => d
                .num_microseconds()
                .map(Value::Integer)
                .ok_or(ConversionError::DurationOutOfRange),
            (conversion, value) => Err(ConversionError::TypeMismatch {
                expected: conversion.source_type(),
                actual: value.type_name(),
            }),
        }
    }

    /// Decode a storage value back into its domain representation.
    pub fn decode(self, stored: Value) -> Result<Value, ConversionError> {
        match (self, stored) {
            (_, Value::Null) => Ok(Value::Null),
            (Self::TimestampToInteger, Value::Integer(packed)) => {
                unpack_timestamp(packed).map(Value::Timestamp)
            }
            (Self::TimestampToText, Value::Text(s)) => DateTime::parse_from_rfc3339(&s)
                .map(Value::Timestamp)
                .map_err(|e| ConversionError::Malformed {
                    ty: ValueType::Timestamp,
                    detail: e.to_string(),
                }),
            (Self::DecimalToReal, Value::Real(f)) => Decimal::from_f64(f)
                .map(Value::Decimal)
                .ok_or(ConversionError::Malformed {
                    ty: ValueType::Decimal,
                    detail: format!("{f} is not a representable decimal"),
                }),
            (Self::DurationToInteger, Value::Integer(micros)) => {
                Ok(Value::Duration(Duration::microseconds(micros)))
            }
            (conversion, stored) => Err(ConversionError::TypeMismatch {
                expected: conversion.store_as(),
                actual: stored.type_name(),
            }),
        }
    }
}

fn pack_timestamp(ts: &DateTime<FixedOffset>) -> Result<i64, ConversionError> {
    let millis = ts.timestamp_millis();
    let offset_minutes = i64::from(ts.offset().local_minus_utc()) / 60;
    let shifted = millis
        .checked_mul(1 << OFFSET_BITS)
        .ok_or(ConversionError::TimestampOutOfRange)?;
    Ok(shifted | (offset_minutes + OFFSET_BIAS))
}

fn unpack_timestamp(packed: i64) -> Result<DateTime<FixedOffset>, ConversionError> {
    let millis = packed >> OFFSET_BITS;
    let offset_minutes = (packed & OFFSET_MASK) - OFFSET_BIAS;
    let offset_seconds =
        i32::try_from(offset_minutes * 60).map_err(|_| ConversionError::TimestampOutOfRange)?;
    let offset =
        FixedOffset::east_opt(offset_seconds).ok_or(ConversionError::TimestampOutOfRange)?;
    offset
        .timestamp_millis_opt(millis)
        .single()
        .ok_or(ConversionError::TimestampOutOfRange)
}
