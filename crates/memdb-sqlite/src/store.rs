//! Row storage against the shared in-memory connection.
//!
//! Values pass through each column's conversion on the way in and back
//! out on the way off the wire. Non-native types without a conversion
//! fall back to TEXT storage: they can be written and read back, but
//! ordering on such a column is refused, mirroring the engine's own
//! refusal to compare types it cannot represent.

use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Executor, Row as _, Sqlite, SqlitePool};

use memdb_core::{ColumnDef, ConversionError, StoreError, TableDef, Value, ValueType};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Sort direction for [`fetch_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    const fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One fetched row, decoded back into domain values.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    values: Vec<(String, Value)>,
}

impl StoredRow {
    pub fn value(&self, column: &str) -> Result<&Value, StoreError> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
            .ok_or_else(|| StoreError::UnknownColumn(column.to_string()))
    }

    pub fn integer(&self, column: &str) -> Result<i64, StoreError> {
        match self.value(column)? {
            Value::Integer(v) => Ok(*v),
            other => Err(type_mismatch(column, "integer", other)),
        }
    }

    pub fn text(&self, column: &str) -> Result<&str, StoreError> {
        match self.value(column)? {
            Value::Text(v) => Ok(v),
            other => Err(type_mismatch(column, "text", other)),
        }
    }

    pub fn timestamp(&self, column: &str) -> Result<DateTime<FixedOffset>, StoreError> {
        match self.value(column)? {
            Value::Timestamp(v) => Ok(*v),
            other => Err(type_mismatch(column, "timestamp", other)),
        }
    }

    pub fn decimal(&self, column: &str) -> Result<Decimal, StoreError> {
        match self.value(column)? {
            Value::Decimal(v) => Ok(*v),
            other => Err(type_mismatch(column, "decimal", other)),
        }
    }

    pub fn duration(&self, column: &str) -> Result<Duration, StoreError> {
        match self.value(column)? {
            Value::Duration(v) => Ok(*v),
            other => Err(type_mismatch(column, "duration", other)),
        }
    }
}

fn type_mismatch(column: &str, requested: &str, value: &Value) -> StoreError {
    StoreError::Decode(format!(
        "column {column} holds a {} value, not {requested}",
        value.type_name()
    ))
}

/// Insert one row, values in declared column order. Returns the rowid
/// the engine assigned.
///
/// Takes any executor so callers can write inside an open transaction
/// as well as straight through the pool.
pub async fn insert<'e, E>(executor: E, table: &TableDef, row: &[Value]) -> Result<i64, StoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    if row.len() != table.columns.len() {
        return Err(StoreError::WrongValueCount {
            table: table.name.clone(),
            expected: table.columns.len(),
            actual: row.len(),
        });
    }

    let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    let placeholders: Vec<&str> = table.columns.iter().map(|_| "?").collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.name,
        names.join(", "),
        placeholders.join(", ")
    );

    let mut query = sqlx::query(&sql);
    for (column, value) in table.columns.iter().zip(row) {
        let stored = encode_for_column(column, value.clone())?;
        query = bind_value(query, column, stored)?;
    }

    let result = query
        .execute(executor)
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?;
    Ok(result.last_insert_rowid())
}

/// Fetch every row of the table, optionally ordered by one column.
///
/// Ordering by a non-native column that carries no conversion fails with
/// [`StoreError::UnsupportedValueType`] before any SQL runs.
pub async fn fetch_all(
    pool: &SqlitePool,
    table: &TableDef,
    order: Option<(&str, Order)>,
) -> Result<Vec<StoredRow>, StoreError> {
    let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    let mut sql = format!("SELECT {} FROM {}", names.join(", "), table.name);

    if let Some((column_name, order)) = order {
        let column = table
            .column_def(column_name)
            .ok_or_else(|| StoreError::UnknownColumn(column_name.to_string()))?;
        if column.conversion.is_none() && !column.ty.is_native() {
            return Err(StoreError::UnsupportedValueType {
                column: column.name.clone(),
                ty: column.ty,
            });
        }
        sql.push_str(&format!(" ORDER BY {} {}", column.name, order.sql()));
    }

    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?;
    rows.iter().map(|row| decode_row(table, row)).collect()
}

/// Count the table's rows.
pub async fn count(pool: &SqlitePool, table: &TableDef) -> Result<i64, StoreError> {
    let sql = format!("SELECT COUNT(*) FROM {}", table.name);
    let row = sqlx::query(&sql)
        .fetch_one(pool)
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?;
    row.try_get(0).map_err(|e| StoreError::Storage(e.to_string()))
}

fn encode_for_column(column: &ColumnDef, value: Value) -> Result<Value, StoreError> {
    match column.conversion {
        Some(conversion) => Ok(conversion.encode(value)?),
        None if column.ty.is_native() => Ok(value),
        None => fallback_encode(value),
    }
}

/// TEXT fallback for non-native values stored without a conversion.
fn fallback_encode(value: Value) -> Result<Value, StoreError> {
    match value {
        Value::Timestamp(ts) => Ok(Value::Text(ts.to_rfc3339())),
        Value::Decimal(d) => Ok(Value::Text(d.to_string())),
        Value::Duration(d) => d
            .num_microseconds()
            .map(|micros| Value::Text(micros.to_string()))
            .ok_or_else(|| ConversionError::DurationOutOfRange.into()),
        other => Ok(other),
    }
}

fn bind_value<'q>(
    query: SqliteQuery<'q>,
    column: &ColumnDef,
    value: Value,
) -> Result<SqliteQuery<'q>, StoreError> {
    Ok(match value {
        Value::Null => query.bind(None::<i64>),
        Value::Integer(v) => query.bind(v),
        Value::Real(v) => query.bind(v),
        Value::Text(v) => query.bind(v),
        Value::Blob(v) => query.bind(v),
        Value::Bool(v) => query.bind(v),
        // Encoding always runs first, so a non-native value reaching the
        // bind step means the column cannot represent it.
        Value::Timestamp(_) | Value::Decimal(_) | Value::Duration(_) => {
            return Err(StoreError::UnsupportedValueType {
                column: column.name.clone(),
                ty: column.ty,
            });
        }
    })
}

fn decode_row(table: &TableDef, row: &SqliteRow) -> Result<StoredRow, StoreError> {
    let mut values = Vec::with_capacity(table.columns.len());
    for (index, column) in table.columns.iter().enumerate() {
        let raw = read_raw(row, index, column)?;
        let value = decode_for_column(column, raw)?;
        values.push((column.name.clone(), value));
    }
    Ok(StoredRow { values })
}

fn read_raw(row: &SqliteRow, index: usize, column: &ColumnDef) -> Result<Value, StoreError> {
    let raw = match column.storage_type() {
        ValueType::Integer | ValueType::Bool => row
            .try_get::<Option<i64>, _>(index)
            .map(|v| v.map_or(Value::Null, Value::Integer)),
        ValueType::Real => row
            .try_get::<Option<f64>, _>(index)
            .map(|v| v.map_or(Value::Null, Value::Real)),
        ValueType::Blob => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .map(|v| v.map_or(Value::Null, Value::Blob)),
        _ => row
            .try_get::<Option<String>, _>(index)
            .map(|v| v.map_or(Value::Null, Value::Text)),
    };
    raw.map_err(|e| StoreError::Storage(e.to_string()))
}

fn decode_for_column(column: &ColumnDef, raw: Value) -> Result<Value, StoreError> {
    if raw.is_null() {
        return Ok(Value::Null);
    }
    match column.conversion {
        Some(conversion) => Ok(conversion.decode(raw)?),
        None => match (column.ty, raw) {
            (ValueType::Bool, Value::Integer(v)) => Ok(Value::Bool(v != 0)),
            (ValueType::Timestamp, Value::Text(s)) => DateTime::parse_from_rfc3339(&s)
                .map(Value::Timestamp)
                .map_err(|e| StoreError::Decode(format!("bad fallback timestamp: {e}"))),
            (ValueType::Decimal, Value::Text(s)) => Decimal::from_str(&s)
                .map(Value::Decimal)
                .map_err(|e| StoreError::Decode(format!("bad fallback decimal: {e}"))),
            (ValueType::Duration, Value::Text(s)) => s
                .parse::<i64>()
                .map(|micros| Value::Duration(Duration::microseconds(micros)))
                .map_err(|e| StoreError::Decode(format!("bad fallback duration: {e}"))),
            (_, raw) => Ok(raw),
        },
    }
}
