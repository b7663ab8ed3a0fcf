use arrow::record_batch::RecordBatch;
use tracing::debug;

use crate::typer::{sample, CellValue};

/// Log every column's name, Arrow type and first value at debug level.
pub fn describe_columns(table: &str, batch: &RecordBatch) {
    let schema = batch.schema();
    for field in schema.fields() {
        let example = sample(batch, field.name()).unwrap_or(CellValue::Null);
        debug!(
            table,
            column = %field.name(),
            dtype = %field.data_type(),
            sample_type = example.type_name(),
            sample = ?example,
            "column"
        );
    }
}
