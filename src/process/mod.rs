// src/process/mod.rs
//! Loading one export file and reshaping it into an uploadable batch.
pub mod convert;
pub mod csv_loader;
pub mod date_parser;
pub mod describe;

use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, StringArray},
    datatypes::{Field, Schema},
    record_batch::RecordBatch,
};
use std::sync::Arc;

pub use csv_loader::load_csv;
pub use describe::describe_columns;

/// Name of the derived participant column, also the partition key.
pub const PID_COLUMN: &str = "pid";

/// Put `arr` into `batch` under `name`: replaces an existing column in
/// place (its type may change), otherwise appends it as the last column.
pub fn with_column(batch: &RecordBatch, name: &str, arr: ArrayRef) -> Result<RecordBatch> {
    let schema = batch.schema();
    let field = Arc::new(Field::new(name, arr.data_type().clone(), true));

    let mut fields: Vec<Arc<Field>> = schema.fields().iter().cloned().collect();
    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();

    match schema.index_of(name) {
        Ok(i) => {
            fields[i] = field;
            columns[i] = arr;
        }
        Err(_) => {
            fields.push(field);
            columns.push(arr);
        }
    }

    let new_schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
    RecordBatch::try_new(new_schema, columns)
        .with_context(|| format!("setting column {} on batch", name))
}

/// Stamp every row with the participant ID taken from the filename.
pub fn tag_participant(batch: &RecordBatch, participant_id: &str) -> Result<RecordBatch> {
    let pid: StringArray = std::iter::repeat(Some(participant_id))
        .take(batch.num_rows())
        .collect();
    with_column(batch, PID_COLUMN, Arc::new(pid) as ArrayRef)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::{array::{Array, Int64Array}, datatypes::DataType};

    fn sample_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("steps", DataType::Int64, true),
            Field::new("day", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef,
                Arc::new(StringArray::from(vec!["a", "b", "c"])) as ArrayRef,
            ],
        )
        .unwrap()
    }

    #[test]
    fn tag_appends_pid_column() {
        let out = tag_participant(&sample_batch(), "001").unwrap();
        assert_eq!(out.num_columns(), 3);
        assert_eq!(out.schema().field(2).name(), PID_COLUMN);

        let pid = out
            .column(2)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(pid.len(), 3);
        assert!(pid.iter().all(|v| v == Some("001")));
    }

    #[test]
    fn tag_overwrites_existing_pid() {
        let b = with_column(
            &sample_batch(),
            "pid",
            Arc::new(Int64Array::from(vec![9, 9, 9])) as ArrayRef,
        )
        .unwrap();
        let out = tag_participant(&b, "042").unwrap();
        assert_eq!(out.num_columns(), 3);
        assert_eq!(out.column(2).data_type(), &DataType::Utf8);
    }

    #[test]
    fn tag_empty_batch() {
        let empty = RecordBatch::new_empty(sample_batch().schema());
        let out = tag_participant(&empty, "001").unwrap();
        assert_eq!(out.num_rows(), 0);
        assert_eq!(out.num_columns(), 3);
    }

    #[test]
    fn with_column_replaces_in_place() {
        let out = with_column(
            &sample_batch(),
            "steps",
            Arc::new(StringArray::from(vec!["x", "y", "z"])) as ArrayRef,
        )
        .unwrap();
        assert_eq!(out.num_columns(), 2);
        assert_eq!(out.schema().field(0).name(), "steps");
        assert_eq!(out.column(0).data_type(), &DataType::Utf8);
    }

    #[test]
    fn with_column_rejects_wrong_length() {
        let res = with_column(
            &sample_batch(),
            "extra",
            Arc::new(Int64Array::from(vec![1])) as ArrayRef,
        );
        assert!(res.is_err());
    }
}
