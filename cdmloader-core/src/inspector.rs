//! Destination schema introspection.

use crate::adapters::Destination;
use crate::error::{LoaderError, Result};
use crate::models::{ColumnSchema, SchemaColumn, TypeClass};
use tracing::{debug, warn};

/// Classifies a catalog data-type string.
///
/// The lowercased string is matched by substring, first match wins:
/// `date`, then `int`, then `char` or `text`. Everything else is `Other`.
/// `interval` and `point` therefore land in `Integer`, `timestamp` in
/// `Other`.
pub fn classify_type(data_type: &str) -> TypeClass {
    let lowered = data_type.to_lowercase();
    if lowered.contains("date") {
        TypeClass::Date
    } else if lowered.contains("int") {
        TypeClass::Integer
    } else if lowered.contains("char") || lowered.contains("text") {
        TypeClass::Text
    } else {
        TypeClass::Other
    }
}

/// Reads the expected columns of `schema_name.table_name`.
///
/// Column names are lowercased; if two catalog columns collide after
/// lowercasing, the first one wins.
///
/// # Errors
/// Returns `SchemaNotFound` when the catalog has no columns for the table
/// and `Catalog` when the catalog query itself fails.
pub async fn get_table_schema(
    destination: &mut dyn Destination,
    schema_name: &str,
    table_name: &str,
) -> Result<ColumnSchema> {
    let catalog = destination
        .catalog_columns(schema_name, table_name)
        .await?;

    if catalog.is_empty() {
        return Err(LoaderError::schema_not_found(schema_name, table_name));
    }

    let mut schema = ColumnSchema::new();
    for column in catalog {
        let name = column.name.to_lowercase();
        let type_class = classify_type(&column.data_type);
        let inserted = schema.insert(SchemaColumn {
            name: name.clone(),
            catalog_name: column.name,
            type_class,
            data_type: column.data_type,
            native_type: column.native_type,
        });
        if !inserted {
            warn!(
                "Column '{}' of {}.{} appears more than once ignoring case; keeping the first",
                name, schema_name, table_name
            );
        }
    }

    debug!(
        "{}.{} has {} columns",
        schema_name,
        table_name,
        schema.len()
    );
    Ok(schema)
}
