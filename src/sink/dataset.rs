// src/sink/dataset.rs
use anyhow::{bail, Context, Result};
use arrow::{
    array::{Array, ArrayRef, UInt32Array},
    compute::take,
    datatypes::{Field, Schema},
    record_batch::{RecordBatch, RecordBatchOptions},
    util::display::array_value_to_string,
};
use chrono::Utc;
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::BufWriter,
    path::{Component, Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, instrument};

use super::{
    catalog::{Catalog, CatalogColumn, CATALOG_FILE},
    conform::conform_batch,
    DatasetWrite, Sink, WriteOutcome,
};

const NULL_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// Hive-partitioned Parquet dataset on the local filesystem, with a JSON
/// catalog at `{root}/_catalog.json`.
///
/// A storage location `s3://bucket/data/sleep/` lands under
/// `{root}/bucket/data/sleep/`, one directory per partition value
/// (`pid=001/`) and one part file per write. Partition columns live in the
/// directory names only.
pub struct ParquetDatasetSink {
    root: PathBuf,
    catalog: Catalog,
    seq: u64,
}

impl ParquetDatasetSink {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("creating sink root {}", root.display()))?;
        let catalog = Catalog::open(root.join(CATALOG_FILE))?;
        Ok(Self {
            root,
            catalog,
            seq: 0,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Local directory for a storage location; the URL scheme is dropped.
    pub fn local_dir(&self, location: &str) -> Result<PathBuf> {
        let rest = location
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(location);

        let mut dir = self.root.clone();
        for part in rest.split('/').filter(|p| !p.is_empty()) {
            let mut comps = Path::new(part).components();
            match (comps.next(), comps.next()) {
                (Some(Component::Normal(c)), None) => dir.push(c),
                _ => bail!("unsupported path segment {:?} in {}", part, location),
            }
        }
        if dir == self.root {
            bail!("storage location {:?} has no path", location);
        }
        Ok(dir)
    }
}

impl Sink for ParquetDatasetSink {
    #[instrument(level = "debug", skip(self, write), fields(table = %write.table, path = %write.path))]
    fn write_dataset(&mut self, write: DatasetWrite) -> Result<WriteOutcome> {
        let conformed = match self.catalog.get(&write.database, &write.table) {
            Some(entry) => conform_batch(&write.batch, &entry.columns)?.0,
            None => write.batch.clone(),
        };
        let batch = &conformed;
        let schema = batch.schema();

        let part_idx = write
            .partition_cols
            .iter()
            .map(|c| {
                schema
                    .index_of(c)
                    .with_context(|| format!("partition column {} not in batch", c))
            })
            .collect::<Result<Vec<_>>>()?;
        let data_idx: Vec<usize> = (0..schema.fields().len())
            .filter(|i| !part_idx.contains(i))
            .collect();

        let data_fields: Vec<Field> = data_idx
            .iter()
            .map(|&i| schema.field(i).clone())
            .collect();
        let columns: Vec<CatalogColumn> = data_fields
            .iter()
            .map(|f| CatalogColumn {
                name: f.name().clone(),
                ty: f.data_type().to_string(),
            })
            .collect();

        let (entry, created) = self.catalog.plan(
            &write.database,
            &write.table,
            &write.path,
            &write.partition_cols,
            &columns,
        )?;

        let table_dir = self.local_dir(&write.path)?;
        let data_schema = Arc::new(Schema::new(data_fields));
        let mut objects = Vec::new();

        for (values, rows) in partition_rows(batch, &part_idx)? {
            let mut dir = table_dir.clone();
            for (key, value) in write.partition_cols.iter().zip(&values) {
                dir.push(format!("{}={}", key, value));
            }
            fs::create_dir_all(&dir)
                .with_context(|| format!("creating partition directory {}", dir.display()))?;

            let indices = UInt32Array::from(rows);
            let cols = data_idx
                .iter()
                .map(|&i| take(batch.column(i).as_ref(), &indices, None))
                .collect::<Result<Vec<ArrayRef>, _>>()
                .context("selecting partition rows")?;
            let part = RecordBatch::try_new_with_options(
                data_schema.clone(),
                cols,
                &RecordBatchOptions::new().with_row_count(Some(indices.len())),
            )
            .context("building partition batch")?;

            self.seq += 1;
            let file_name = format!(
                "part-{}-{:05}.parquet",
                Utc::now().timestamp_micros(),
                self.seq
            );
            let path = dir.join(&file_name);
            let bytes = write_parquet_file(&part, &path)?;
            debug!(path = %path.display(), rows = part.num_rows(), bytes, "wrote part file");

            let rel = path.strip_prefix(&self.root).unwrap_or(&path);
            objects.push(rel.display().to_string());
        }

        self.catalog.commit(entry)?;
        info!(
            database = %write.database,
            table = %write.table,
            created,
            rows = batch.num_rows(),
            files = objects.len(),
            "dataset write complete"
        );

        Ok(WriteOutcome {
            rows: batch.num_rows(),
            objects,
            created_table: created,
        })
    }
}

/// Group row indices by the rendered values of the partition columns.
fn partition_rows(batch: &RecordBatch, part_idx: &[usize]) -> Result<BTreeMap<Vec<String>, Vec<u32>>> {
    let mut groups: BTreeMap<Vec<String>, Vec<u32>> = BTreeMap::new();
    for row in 0..batch.num_rows() {
        let mut key = Vec::with_capacity(part_idx.len());
        for &i in part_idx {
            let arr = batch.column(i);
            let value = if arr.is_null(row) {
                NULL_PARTITION.to_string()
            } else {
                escape_partition_value(
                    &array_value_to_string(arr.as_ref(), row)
                        .context("rendering partition value")?,
                )
            };
            key.push(value);
        }
        let row = u32::try_from(row).context("batch too large to partition")?;
        groups.entry(key).or_default().push(row);
    }
    Ok(groups)
}

/// Keep a partition value to one path segment.
fn escape_partition_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' | '/' | '\\' | '=' | ':' => out.push_str(&format!("%{:02X}", c as u32)),
            _ => out.push(c),
        }
    }
    if out.is_empty() {
        return NULL_PARTITION.to_string();
    }
    if out == "." || out == ".." {
        return out.replace('.', "%2E");
    }
    out
}

/// Write `batch` to `path` via a temp file and rename. Returns bytes written.
fn write_parquet_file(batch: &RecordBatch, path: &Path) -> Result<u64> {
    let tmp = path.with_extension("parquet.tmp");
    let file =
        File::create(&tmp).with_context(|| format!("creating file {}", tmp.display()))?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(BufWriter::new(file), batch.schema(), Some(props))
        .context("creating parquet writer")?;
    writer.write(batch).context("writing batch to parquet")?;
    writer.close().context("closing parquet writer")?;

    fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))?;
    let metadata = fs::metadata(path).context("getting file metadata")?;
    Ok(metadata.len())
}
