//! Tests for the load pipeline models.

use super::*;

fn schema_column(name: &str, type_class: TypeClass) -> SchemaColumn {
    SchemaColumn {
        name: name.to_string(),
        catalog_name: name.to_string(),
        type_class,
        data_type: type_class.to_string(),
        native_type: type_class.to_string(),
    }
}

#[test]
fn test_table_spec_default_filename() {
    let spec = TableSpec::new("concept_relationship", 5);
    assert_eq!(spec.table_name, "concept_relationship");
    assert_eq!(spec.source_filename, "CONCEPT_RELATIONSHIP.csv");
    assert_eq!(spec.ordinal, 5);
}

#[test]
fn test_table_spec_lowercases_table_name() {
    let spec = TableSpec::new("Concept", 0);
    assert_eq!(spec.table_name, "concept");
    assert_eq!(spec.source_filename, "CONCEPT.csv");
}

#[test]
fn test_table_spec_custom_filename() {
    let spec = TableSpec::new("concept_class", 2).with_source_filename("concept_class.tsv");
    assert_eq!(spec.source_filename, "concept_class.tsv");
}

#[test]
fn test_column_schema_rejects_duplicates() {
    let mut schema = ColumnSchema::new();
    assert!(schema.insert(schema_column("concept_id", TypeClass::Integer)));
    assert!(!schema.insert(schema_column("concept_id", TypeClass::Text)));
    assert_eq!(schema.len(), 1);
    assert_eq!(schema.type_class("concept_id"), Some(TypeClass::Integer));
    assert_eq!(schema.type_class("missing"), None);
}

#[test]
fn test_cell_value_to_text() {
    let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
    assert_eq!(CellValue::Date(date).to_text().as_deref(), Some("2024-07-01"));
    assert_eq!(CellValue::Integer(42).to_text().as_deref(), Some("42"));
    assert_eq!(CellValue::Null.to_text(), None);

    let invalid = CellValue::Invalid {
        raw: "N/A".to_string(),
        expected: TypeClass::Integer,
    };
    assert!(invalid.is_invalid());
    assert_eq!(invalid.to_text().as_deref(), Some("N/A"));
}

#[test]
fn test_into_mapped_drops_unmapped_cells() {
    let batch = CoercedRecordBatch {
        columns: vec![
            CoercedColumn {
                name: "concept_id".to_string(),
                mapping: Some(schema_column("concept_id", TypeClass::Integer)),
            },
            CoercedColumn {
                name: "note".to_string(),
                mapping: None,
            },
            CoercedColumn {
                name: "concept_name".to_string(),
                mapping: Some(schema_column("concept_name", TypeClass::Text)),
            },
        ],
        rows: vec![vec![
            CellValue::Integer(1),
            CellValue::Text("extra".to_string()),
            CellValue::Text("Aspirin".to_string()),
        ]],
        failed_values: BTreeMap::new(),
    };

    assert_eq!(batch.unmapped_columns(), vec!["note".to_string()]);
    assert_eq!(batch.mapped_column_count(), 2);

    let mapped = batch.into_mapped();
    assert_eq!(mapped.columns.len(), 2);
    assert_eq!(
        mapped.rows[0],
        vec![CellValue::Integer(1), CellValue::Text("Aspirin".to_string())]
    );
    assert!(mapped.unmapped_columns().is_empty());
}

#[test]
fn test_raw_batch_column_index() {
    let mut batch = RawRecordBatch::new(vec!["a".to_string(), "b".to_string()]);
    batch.push_row(vec![Some("1".to_string()), None]);
    assert_eq!(batch.row_count(), 1);
    assert_eq!(batch.column_index("b"), Some(1));
    assert_eq!(batch.column_index("c"), None);
}
