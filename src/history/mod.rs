// src/history/mod.rs
//! Optional record of which files have already been ingested.
pub mod ingested;
pub mod table_history;

pub use ingested::IngestedRow;
pub use table_history::{HistoryRow, TableHistory};

pub type IngestHistory = TableHistory<IngestedRow>;
