//! Schema realization: turning a [`SchemaModel`] into `SQLite` tables.

use sqlx::SqlitePool;
use tracing::trace;

use memdb_core::{ColumnDef, SchemaModel, StoreError, TableDef, ValueType};

/// Create every table the model declares.
///
/// Uses `CREATE TABLE IF NOT EXISTS`, so realizing the same model twice
/// on one connection is a no-op rather than an error. Invoked on every
/// context creation.
pub async fn create_schema(pool: &SqlitePool, model: &SchemaModel) -> Result<(), StoreError> {
    for table in &model.tables {
        let ddl = table_ddl(table);
        trace!(table = %table.name, "ensuring table exists");
        sqlx::query(&ddl)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;
    }
    Ok(())
}

fn table_ddl(table: &TableDef) -> String {
    let columns: Vec<String> = table.columns.iter().map(column_ddl).collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        table.name,
        columns.join(", ")
    )
}

fn column_ddl(column: &ColumnDef) -> String {
    let mut ddl = format!("{} {}", column.name, affinity(column.storage_type()));
    if column.primary_key {
        ddl.push_str(" PRIMARY KEY");
    } else if !column.nullable {
        ddl.push_str(" NOT NULL");
    }
    ddl
}

const fn affinity(storage: ValueType) -> &'static str {
    match storage {
        ValueType::Integer | ValueType::Bool => "INTEGER",
        ValueType::Real => "REAL",
        ValueType::Blob => "BLOB",
        // storage_type() never yields the non-native types; TEXT covers
        // both declared text and the fallback representation.
        ValueType::Text | ValueType::Timestamp | ValueType::Decimal | ValueType::Duration => "TEXT",
    }
}
