use anyhow::Result;
use arrow::{
    array::{ArrayRef, StringArray, TimestampMicrosecondArray, UInt64Array},
    datatypes::{DataType as ArrowDataType, Field, Schema as ArrowSchema, TimeUnit},
};
use chrono::{DateTime, NaiveDate, Utc};
use std::{path::PathBuf, sync::Arc};

use crate::history::table_history::{HistoryRow, TableHistory};

/// One successfully ingested export file.
pub struct IngestedRow {
    pub database: String,
    pub table: String,
    pub participant_id: String,
    pub source_file: String,
    pub rows: u64,
    pub ingested_at: DateTime<Utc>,
}

impl IngestedRow {
    /// `database.table/pid/filename`
    pub fn key_for(database: &str, table: &str, participant_id: &str, source_file: &str) -> String {
        format!("{}.{}/{}/{}", database, table, participant_id, source_file)
    }
}

impl HistoryRow for IngestedRow {
    const KEY_COLUMN: usize = 0;

    fn partition_date(&self) -> NaiveDate {
        self.ingested_at.date_naive()
    }

    fn schema() -> ArrowSchema {
        ArrowSchema::new(vec![
            Field::new("key", ArrowDataType::Utf8, false),
            Field::new("database", ArrowDataType::Utf8, false),
            Field::new("table", ArrowDataType::Utf8, false),
            Field::new("pid", ArrowDataType::Utf8, false),
            Field::new("source_file", ArrowDataType::Utf8, false),
            Field::new("rows", ArrowDataType::UInt64, false),
            Field::new(
                "ingested_at",
                ArrowDataType::Timestamp(TimeUnit::Microsecond, None),
                false,
            ),
        ])
    }

    fn to_arrays(&self) -> Vec<ArrayRef> {
        vec![
            Arc::new(StringArray::from(vec![self.unique_key()])),
            Arc::new(StringArray::from(vec![self.database.clone()])),
            Arc::new(StringArray::from(vec![self.table.clone()])),
            Arc::new(StringArray::from(vec![self.participant_id.clone()])),
            Arc::new(StringArray::from(vec![self.source_file.clone()])),
            Arc::new(UInt64Array::from(vec![self.rows])),
            Arc::new(TimestampMicrosecondArray::from(vec![self
                .ingested_at
                .timestamp_micros()])),
        ]
    }

    fn unique_key(&self) -> String {
        Self::key_for(
            &self.database,
            &self.table,
            &self.participant_id,
            &self.source_file,
        )
    }
}

impl TableHistory<IngestedRow> {
    pub fn new_ingested(base: impl Into<PathBuf>) -> Result<Self> {
        TableHistory::new(base, "ingested")
    }
}
