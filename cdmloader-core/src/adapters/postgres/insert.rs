//! Multi-row INSERT construction for PostgreSQL.
//!
//! Values are bound with the Rust type matching their type class. Columns
//! of class `other` (numeric, timestamp, ...) receive their text through an
//! explicit `CAST($n AS <udt_name>)`, since PostgreSQL has no assignment cast
//! from `text` to most non-text types.

use crate::adapters::helpers::column_list;
use crate::models::{CellValue, SchemaColumn, TypeClass};
use crate::validation::is_safe_type_name;
use chrono::NaiveDate;
use sqlx::postgres::Postgres;
use sqlx::query_builder::{QueryBuilder, Separated};

/// A cell in the Rust type it is bound with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum BoundValue {
    Text(Option<String>),
    Integer(Option<i64>),
    Date(Option<NaiveDate>),
}

impl BoundValue {
    /// Invalid cells become a NULL typed after the column.
    pub(super) fn from_cell(cell: &CellValue, class: TypeClass) -> Self {
        match cell {
            CellValue::Text(s) => BoundValue::Text(Some(s.clone())),
            CellValue::Integer(i) => BoundValue::Integer(Some(*i)),
            CellValue::Date(d) => BoundValue::Date(Some(*d)),
            CellValue::Null | CellValue::Invalid { .. } => match class {
                TypeClass::Date => BoundValue::Date(None),
                TypeClass::Integer => BoundValue::Integer(None),
                TypeClass::Text | TypeClass::Other => BoundValue::Text(None),
            },
        }
    }

    fn bind_unseparated(self, b: &mut Separated<'_, '_, Postgres, &'static str>) {
        match self {
            BoundValue::Text(v) => b.push_bind_unseparated(v),
            BoundValue::Integer(v) => b.push_bind_unseparated(v),
            BoundValue::Date(v) => b.push_bind_unseparated(v),
        };
    }
}

/// Target type for an explicit cast, if the column needs one.
pub(super) fn cast_target(column: &SchemaColumn) -> Option<&str> {
    (column.type_class == TypeClass::Other && is_safe_type_name(&column.native_type))
        .then_some(column.native_type.as_str())
}

/// Builds one INSERT statement for `rows`.
pub(super) fn build_insert<'a>(
    qualified_table: &str,
    columns: &[&SchemaColumn],
    rows: &[Vec<CellValue>],
) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(format!(
        "INSERT INTO {} ({}) ",
        qualified_table,
        column_list(columns.iter().map(|c| c.catalog_name.as_str()))
    ));

    builder.push_values(rows, |mut b, row| {
        for (column, cell) in columns.iter().zip(row) {
            let value = BoundValue::from_cell(cell, column.type_class);
            match cast_target(column) {
                Some(target) => {
                    b.push("CAST(");
                    value.bind_unseparated(&mut b);
                    b.push_unseparated(format!(" AS {})", target));
                }
                None => {
                    b.push("");
                    value.bind_unseparated(&mut b);
                }
            }
        }
    });

    builder
}
