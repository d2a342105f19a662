//! Text-to-typed-value coercion driven by the destination schema.
//!
//! Coercion never drops a row. A value that does not parse becomes
//! [`CellValue::Invalid`], is counted per column, and is inserted as NULL.

use crate::models::{
    CellValue, CoercedColumn, CoercedRecordBatch, ColumnSchema, RawRecordBatch, TypeClass,
};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::warn;

/// Parses `YYYY-MM-DD` or the compact `YYYYMMDD` form.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }

    // %Y is greedy in chrono, so the compact form is split by hand.
    if trimmed.len() == 8 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let year = trimmed[0..4].parse().ok()?;
        let month = trimmed[4..6].parse().ok()?;
        let day = trimmed[6..8].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}

/// Parses a whole number, ignoring surrounding whitespace.
pub fn parse_integer(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

/// Converts one raw cell for a column of `class`.
///
/// `None` (the null marker) stays `Null` regardless of class. Text and
/// other classes pass through unchanged.
pub fn coerce_value(raw: Option<String>, class: TypeClass) -> CellValue {
    let Some(raw) = raw else {
        return CellValue::Null;
    };

    match class {
        TypeClass::Date => match parse_date(&raw) {
            Some(date) => CellValue::Date(date),
            None => CellValue::Invalid {
                raw,
                expected: class,
            },
        },
        TypeClass::Integer => match parse_integer(&raw) {
            Some(value) => CellValue::Integer(value),
            None => CellValue::Invalid {
                raw,
                expected: class,
            },
        },
        TypeClass::Text | TypeClass::Other => CellValue::Text(raw),
    }
}

/// Converts a raw batch according to `schema`.
///
/// Columns missing from the schema are flagged unmapped and carried as text;
/// reporting them is left to the caller.
/// Each column with failed values is logged once with its count and first
/// offending value.
pub fn coerce(batch: RawRecordBatch, schema: &ColumnSchema) -> CoercedRecordBatch {
    let columns: Vec<CoercedColumn> = batch
        .columns
        .into_iter()
        .map(|name| {
            let mapping = schema.get(&name).cloned();
            CoercedColumn { name, mapping }
        })
        .collect();

    let classes: Vec<TypeClass> = columns.iter().map(CoercedColumn::type_class).collect();
    let mut failed_values: BTreeMap<String, usize> = BTreeMap::new();
    let mut first_failure: BTreeMap<String, String> = BTreeMap::new();

    let rows = batch
        .rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .zip(classes.iter().zip(columns.iter()))
                .map(|(raw, (class, column))| {
                    let value = coerce_value(raw, *class);
                    if let CellValue::Invalid { raw, .. } = &value {
                        *failed_values.entry(column.name.clone()).or_default() += 1;
                        first_failure
                            .entry(column.name.clone())
                            .or_insert_with(|| raw.clone());
                    }
                    value
                })
                .collect()
        })
        .collect();

    for (column, count) in &failed_values {
        let class = columns
            .iter()
            .find(|c| &c.name == column)
            .map_or(TypeClass::Text, CoercedColumn::type_class);
        warn!(
            "{} values in column '{}' could not be parsed as {} (first: {:?}); inserting NULL",
            count,
            column,
            class,
            first_failure.get(column).map_or("", String::as_str)
        );
    }

    CoercedRecordBatch {
        columns,
        rows,
        failed_values,
    }
}
