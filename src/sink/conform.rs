// src/sink/conform.rs
//! Bring a batch in line with the column types a table is already registered
//! with. Types are inferred per file, so the same column can arrive as
//! `Int64` from one export and as all-null `Utf8` from the next.
use anyhow::{bail, Context, Result};
use arrow::{
    array::{new_null_array, Array, ArrayRef, AsArray, Int64Array, TimestampMillisecondArray},
    compute::{can_cast_types, cast, cast_with_options, CastOptions},
    datatypes::{DataType, Field, Float64Type, Schema, TimeUnit},
    record_batch::{RecordBatch, RecordBatchOptions},
};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, warn};

use super::catalog::CatalogColumn;
use crate::process::date_parser::parse_datetime_millis;

/// Types a catalog entry can name that we know how to convert into.
fn registered_type(name: &str) -> Option<DataType> {
    [
        DataType::Utf8,
        DataType::Int64,
        DataType::Float64,
        DataType::Boolean,
        DataType::Timestamp(TimeUnit::Millisecond, None),
    ]
    .into_iter()
    .find(|dt| dt.to_string() == name)
}

/// A column converted to its registered type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub column: String,
    pub from: String,
    pub to: String,
    /// Non-null values that did not survive the conversion.
    pub nulled: usize,
}

/// Convert `arr` to `target`.
///
/// All-null columns take the target type outright and anything becomes text.
/// Otherwise values are converted one by one; a value that does not fit
/// becomes null and is counted in the second return value.
pub fn conform_column(arr: &ArrayRef, target: &DataType) -> Result<(ArrayRef, usize)> {
    if arr.data_type() == target {
        return Ok((arr.clone(), 0));
    }
    if arr.null_count() == arr.len() {
        return Ok((new_null_array(target, arr.len()), 0));
    }

    let out: ArrayRef = match (arr.data_type(), target) {
        (_, DataType::Utf8) => cast(arr.as_ref(), target)
            .with_context(|| format!("casting {} to text", arr.data_type()))?,
        (DataType::Utf8, DataType::Timestamp(TimeUnit::Millisecond, None)) => Arc::new(
            arr.as_string::<i32>()
                .iter()
                .map(|v| v.and_then(parse_datetime_millis))
                .collect::<TimestampMillisecondArray>(),
        ),
        // a plain cast would truncate fractions
        (DataType::Float64, DataType::Int64) => Arc::new(
            arr.as_primitive::<Float64Type>()
                .iter()
                .map(|v| v.filter(|f| f.fract() == 0.0 && f.is_finite()).map(|f| f as i64))
                .collect::<Int64Array>(),
        ),
        (from, to) if can_cast_types(from, to) => {
            let options = CastOptions {
                safe: true,
                ..Default::default()
            };
            cast_with_options(arr.as_ref(), to, &options)
                .with_context(|| format!("casting {} to {}", from, to))?
        }
        (from, to) => bail!("cannot convert {} to {}", from, to),
    };

    let nulled = out.null_count().saturating_sub(arr.null_count());
    Ok((out, nulled))
}

/// Convert every column of `batch` that is registered with a different type.
///
/// Columns the catalog doesn't know, and columns registered with a type we
/// can't convert into, pass through untouched; the catalog check rejects the
/// latter.
pub fn conform_batch(
    batch: &RecordBatch,
    registered: &[CatalogColumn],
) -> Result<(RecordBatch, Vec<Conversion>)> {
    let wanted: HashMap<&str, &str> = registered
        .iter()
        .map(|c| (c.name.as_str(), c.ty.as_str()))
        .collect();

    let schema = batch.schema();
    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut columns = Vec::with_capacity(batch.num_columns());
    let mut conversions = Vec::new();

    for (field, arr) in schema.fields().iter().zip(batch.columns()) {
        let target = wanted
            .get(field.name().as_str())
            .and_then(|ty| registered_type(ty))
            .filter(|dt| dt != field.data_type());
        let Some(target) = target else {
            fields.push(field.as_ref().clone());
            columns.push(arr.clone());
            continue;
        };

        let (converted, nulled) = conform_column(arr, &target)
            .with_context(|| format!("converting column {}", field.name()))?;
        if nulled > 0 {
            warn!(
                column = %field.name(),
                from = %field.data_type(),
                to = %target,
                nulled,
                "values did not fit the registered column type and were dropped"
            );
        } else {
            debug!(column = %field.name(), from = %field.data_type(), to = %target, "converted column to registered type");
        }
        conversions.push(Conversion {
            column: field.name().clone(),
            from: field.data_type().to_string(),
            to: target.to_string(),
            nulled,
        });
        fields.push(Field::new(field.name(), target, true));
        columns.push(converted);
    }

    let out = RecordBatch::try_new_with_options(
        Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone())),
        columns,
        &RecordBatchOptions::new().with_row_count(Some(batch.num_rows())),
    )
    .context("rebuilding batch with registered types")?;
    Ok((out, conversions))
}
