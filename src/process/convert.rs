use anyhow::{Context, Result};
use arrow::{
    array::{Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use std::sync::Arc;

/// Narrowest type every non-null value in a text column fits.
pub fn infer_arrow_dtype(values: &StringArray) -> DataType {
    let mut present = values.iter().flatten().map(str::trim).peekable();
    if present.peek().is_none() {
        return DataType::Utf8;
    }

    let (mut int, mut float, mut boolean) = (true, true, true);
    for s in present {
        int = int && s.parse::<i64>().is_ok();
        float = float && s.parse::<f64>().is_ok();
        boolean = boolean && parse_bool(s).is_some();
        if !(int || float || boolean) {
            return DataType::Utf8;
        }
    }

    if int {
        DataType::Int64
    } else if float {
        DataType::Float64
    } else {
        DataType::Boolean
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "True" | "true" | "TRUE" => Some(true),
        "False" | "false" | "FALSE" => Some(false),
        _ => None,
    }
}

/// Coerce text columns into the type their values fit.
pub fn infer_column_types(batch: &RecordBatch) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut out = Vec::with_capacity(batch.num_columns());

    for (arr, fld) in batch.columns().iter().zip(batch.schema().fields()) {
        if arr.data_type() != &DataType::Utf8 {
            fields.push(fld.as_ref().clone());
            out.push(arr.clone());
            continue;
        }

        let sarr = arr.as_string::<i32>();
        let col: ArrayRef = match infer_arrow_dtype(sarr) {
            DataType::Int64 => Arc::new(
                sarr.iter()
                    .map(|v| v.and_then(|s| s.trim().parse::<i64>().ok()))
                    .collect::<Int64Array>(),
            ),
            DataType::Float64 => Arc::new(
                sarr.iter()
                    .map(|v| v.and_then(|s| s.trim().parse::<f64>().ok()))
                    .collect::<Float64Array>(),
            ),
            DataType::Boolean => Arc::new(
                sarr.iter()
                    .map(|v| v.and_then(|s| parse_bool(s.trim())))
                    .collect::<BooleanArray>(),
            ),
            _ => arr.clone(),
        };
        fields.push(Field::new(fld.name(), col.data_type().clone(), true));
        out.push(col);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), out).context("applying inferred types")
}
