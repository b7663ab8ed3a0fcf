// src/sink/mod.rs
//! Where finished batches go.
pub mod catalog;
pub mod conform;
pub mod dataset;

use anyhow::Result;
use arrow::record_batch::RecordBatch;
use tracing::info;

pub use self::catalog::{Catalog, CatalogColumn, CatalogTable};
pub use self::dataset::ParquetDatasetSink;

/// One table write: the batch plus everything the catalog needs to know.
#[derive(Debug, Clone)]
pub struct DatasetWrite {
    pub batch: RecordBatch,
    /// Table storage location, e.g. `s3://bucket/data/sleep/`.
    pub path: String,
    pub database: String,
    pub table: String,
    pub partition_cols: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub rows: usize,
    /// Data objects written, relative to the sink.
    pub objects: Vec<String>,
    /// True when this write registered the table.
    pub created_table: bool,
}

/// A dataset store with a table catalog. Writes create the table when it is
/// absent and append to it otherwise.
pub trait Sink {
    fn write_dataset(&mut self, write: DatasetWrite) -> Result<WriteOutcome>;
}

/// `{root}/{table}/` with exactly one `/` between the two.
pub fn table_path(root: &str, table: &str) -> String {
    format!("{}/{}/", root.trim_end_matches('/'), table)
}

/// Logs what would be written and writes nothing.
#[derive(Debug, Default)]
pub struct DryRunSink {
    pub writes: usize,
}

impl Sink for DryRunSink {
    fn write_dataset(&mut self, write: DatasetWrite) -> Result<WriteOutcome> {
        self.writes += 1;
        info!(
            table = %write.table,
            database = %write.database,
            path = %write.path,
            partition_cols = ?write.partition_cols,
            rows = write.batch.num_rows(),
            "dry run: skipping dataset write"
        );
        Ok(WriteOutcome {
            rows: write.batch.num_rows(),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_path_joins_with_one_slash() {
        assert_eq!(
            table_path("s3://bucket/data", "sleep"),
            "s3://bucket/data/sleep/"
        );
        assert_eq!(
            table_path("s3://bucket/data/", "sleep"),
            "s3://bucket/data/sleep/"
        );
        assert_eq!(
            table_path("s3://bucket/data//", "sleep_periods"),
            "s3://bucket/data/sleep_periods/"
        );
    }
}
