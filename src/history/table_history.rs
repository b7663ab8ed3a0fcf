use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, AsArray},
    datatypes::{DataType, Schema as ArrowSchema},
    record_batch::RecordBatch,
};
use chrono::{NaiveDate, Utc};
use glob::glob;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use std::{
    collections::HashSet,
    fs::{self, File},
    io::BufWriter,
    marker::PhantomData,
    path::PathBuf,
    sync::Arc,
};
use tracing::debug;

/// A record type that can be stored in a [`TableHistory`].
///
/// Each record becomes a one-row Parquet file; the key column is read back on
/// open so later runs know what is already there.
pub trait HistoryRow: Sized {
    /// Day the record is filed under (`date=YYYYMMDD`).
    fn partition_date(&self) -> NaiveDate;
    fn schema() -> ArrowSchema;
    /// Columns in schema order, one element each.
    fn to_arrays(&self) -> Vec<ArrayRef>;
    fn unique_key(&self) -> String;
    /// Index of the Utf8 key column.
    const KEY_COLUMN: usize;
    fn extract_key(batch: &RecordBatch, row: usize) -> Option<String> {
        let col = batch.column(Self::KEY_COLUMN);
        if col.data_type() != &DataType::Utf8 {
            return None;
        }
        Some(col.as_string::<i32>().value(row).to_string())
    }
}

/// Hive-partitioned history table: one tiny Parquet file per row under
/// `{base}/{table}/date=YYYYMMDD/`.
pub struct TableHistory<R: HistoryRow> {
    base_dir: PathBuf,
    table: String,
    schema: Arc<ArrowSchema>,
    seen: HashSet<String>,
    _marker: PhantomData<R>,
}

impl<R: HistoryRow> TableHistory<R> {
    /// Create the table directory and scan existing rows into `seen`.
    pub fn new(base_dir: impl Into<PathBuf>, table: &str) -> Result<Self> {
        let base_dir = base_dir.into();
        let table_dir = base_dir.join(table);
        fs::create_dir_all(&table_dir)
            .with_context(|| format!("could not create `{}`", table_dir.display()))?;

        let schema = Arc::new(R::schema());
        let mut seen = HashSet::new();

        for entry in glob(&format!("{}/*/*.parquet", table_dir.display()))? {
            let path = entry?;
            let file = File::open(&path)
                .with_context(|| format!("failed to open `{}`", path.display()))?;
            let reader = ParquetRecordBatchReaderBuilder::try_new(file)
                .with_context(|| format!("reading `{}`", path.display()))?
                .with_batch_size(1024)
                .build()?;
            for batch in reader {
                let batch = batch?;
                for i in 0..batch.num_rows() {
                    if let Some(key) = R::extract_key(&batch, i) {
                        seen.insert(key);
                    }
                }
            }
        }
        debug!(table, rows = seen.len(), "loaded history");

        Ok(Self {
            base_dir,
            table: table.to_string(),
            schema,
            seen,
            _marker: PhantomData,
        })
    }

    /// Record `row`. Returns false (and writes nothing) if its key is known.
    pub fn add(&mut self, row: &R) -> Result<bool> {
        let key = row.unique_key();
        if self.seen.contains(&key) {
            return Ok(false);
        }

        let partition = format!("date={}", row.partition_date().format("%Y%m%d"));
        let dir = self.base_dir.join(&self.table).join(partition);
        fs::create_dir_all(&dir)?;

        let ts = Utc::now().timestamp_micros();
        let fname = format!("{}---{}.parquet", file_safe(&key), ts);
        let tmp = dir.join(format!("{}.tmp", fname));
        let final_path = dir.join(&fname);

        let file = File::create(&tmp)?;
        let mut writer = ArrowWriter::try_new(BufWriter::new(file), self.schema.clone(), None)?;
        let batch = RecordBatch::try_new(self.schema.clone(), row.to_arrays())
            .context("building history record batch")?;
        writer.write(&batch)?;
        writer.close()?;
        fs::rename(&tmp, &final_path)?;

        self.seen.insert(key);
        Ok(true)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

fn file_safe(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}

// ----- Tests -----
#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::ingested::IngestedRow;
    use tempfile::tempdir;

    fn row(file: &str) -> IngestedRow {
        IngestedRow {
            database: "study".into(),
            table: "sleep".into(),
            participant_id: "001".into(),
            source_file: file.into(),
            rows: 10,
            ingested_at: Utc::now(),
        }
    }

    fn count_files(base: &std::path::Path) -> usize {
        glob(&format!("{}/ingested/*/*.parquet", base.display()))
            .unwrap()
            .filter_map(Result::ok)
            .count()
    }

    #[test]
    fn test_add_and_contains() {
        let tmp = tempdir().unwrap();
        let mut hist = TableHistory::<IngestedRow>::new_ingested(tmp.path()).unwrap();

        let r = row("a_b_001_sleep.csv");
        assert!(!hist.contains(&r.unique_key()));
        assert!(hist.add(&r).unwrap());
        assert!(hist.contains(&r.unique_key()));
        assert_eq!(count_files(tmp.path()), 1);
    }

    #[test]
    fn test_deduplication() {
        let tmp = tempdir().unwrap();
        let mut hist = TableHistory::<IngestedRow>::new_ingested(tmp.path()).unwrap();

        let r = row("a_b_001_sleep.csv");
        assert!(hist.add(&r).unwrap());
        assert!(!hist.add(&r).unwrap());
        assert_eq!(count_files(tmp.path()), 1);
        assert_eq!(hist.len(), 1);
    }

    #[test]
    fn test_persistence_across_restarts() {
        let tmp = tempdir().unwrap();
        let key = {
            let mut hist = TableHistory::<IngestedRow>::new_ingested(tmp.path()).unwrap();
            let r = row("x_y_001_sleep.csv");
            hist.add(&r).unwrap();
            r.unique_key()
        };

        let hist2 = TableHistory::<IngestedRow>::new_ingested(tmp.path()).unwrap();
        assert!(hist2.contains(&key));
        assert!(!hist2.contains(&row("other.csv").unique_key()));
    }

    #[test]
    fn test_file_safe() {
        assert_eq!(file_safe("study.sleep/001/a b.csv"), "study.sleep_001_a_b.csv");
    }
}
