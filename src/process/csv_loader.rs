// src/process/csv_loader.rs
use anyhow::{Context, Result};
use arrow::{
    compute::concat_batches,
    csv::{reader::Format, ReaderBuilder},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    fs::File,
    io::{Seek, SeekFrom},
    path::Path,
    sync::Arc,
};
use tracing::{debug, instrument};

use crate::process::convert::infer_column_types;

const BATCH_SIZE: usize = 8192;

/// Cells read as missing: empty, plus the usual spreadsheet/pandas NA markers.
static NA_VALUES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:|#N/A|#N/A N/A|#NA|-1\.#IND|-1\.#QNAN|-NaN|-nan|1\.#IND|1\.#QNAN|<NA>|N/A|NA|NULL|NaN|None|n/a|nan|null)$",
    )
    .expect("NA pattern should compile")
});

/// Read the whole CSV at `path` into one batch.
///
/// Every column is read as text first (empty and NA cells become nulls), then
/// columns that are entirely integer, float or boolean are coerced. Date-like
/// text is left alone for the typer. Rows shorter than the header are padded
/// with nulls; longer rows are an error.
#[instrument(level = "debug", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<RecordBatch> {
    let path = path.as_ref();
    let mut file =
        File::open(path).with_context(|| format!("opening CSV {}", path.display()))?;

    // Header only: we want the names, not arrow's guesses at types.
    let format = Format::default().with_header(true);
    let (header, _) = format
        .infer_schema(&mut file, Some(0))
        .with_context(|| format!("reading CSV header of {}", path.display()))?;
    file.seek(SeekFrom::Start(0))
        .with_context(|| format!("rewinding {}", path.display()))?;

    let fields: Vec<Field> = header
        .fields()
        .iter()
        .map(|f| Field::new(f.name(), DataType::Utf8, true))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let reader = ReaderBuilder::new(schema.clone())
        .with_format(format.with_null_regex(NA_VALUES.clone()))
        .with_truncated_rows(true)
        .with_batch_size(BATCH_SIZE)
        .build(file)
        .context("creating CSV reader")?;

    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("parsing CSV rows of {}", path.display()))?;
    let raw = concat_batches(&schema, &batches).context("concatenating CSV batches")?;
    debug!(
        rows = raw.num_rows(),
        columns = raw.num_columns(),
        "loaded CSV"
    );

    infer_column_types(&raw)
}
