//! Post-model-build pass attaching the `SQLite` value conversions.

use tracing::debug;

use crate::convert::conversion_for;
use crate::schema::SchemaModel;

/// Attach the policy's conversion to every column whose declared type has
/// a rule and no explicitly configured conversion.
///
/// Runs after the context's own model definition. Touches nothing but the
/// conversion slot: keys, nullability, and column order are left alone.
/// Safe to skip entirely (conversions disabled); the provider runs it at
/// most once per context construction.
pub fn apply_sqlite_conversions(model: &mut SchemaModel) {
    let mut attached = 0usize;
    for table in &mut model.tables {
        for column in &mut table.columns {
            // Explicit configuration wins.
            if column.conversion.is_some() {
                continue;
            }
            if let Some(conversion) = conversion_for(column.ty) {
                column.conversion = Some(conversion);
                attached += 1;
            }
        }
    }
    debug!(attached, "applied sqlite value conversions");
}
