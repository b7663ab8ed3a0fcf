// src/ingest.rs
//! Walks the participant export tree and feeds each eligible file to a sink.
use anyhow::{Context, Result};
use chrono::Utc;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    config::Config,
    history::{IngestHistory, IngestedRow},
    naming::{classify_directory, classify_file, normalize_table_name, DirectoryStatus, FileMatch},
    process::{describe_columns, load_csv, tag_participant, PID_COLUMN},
    sink::{table_path, DatasetWrite, Sink, WriteOutcome},
    typer,
};

/// Tallies for one run. Failures are counted here and nowhere else; the run
/// itself still succeeds.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub directories_active: usize,
    pub directories_withdrawn: usize,
    pub directories_invalid: usize,
    pub files_ingested: usize,
    pub files_unmatched: usize,
    pub files_not_whitelisted: usize,
    pub files_already_ingested: usize,
    pub files_failed: usize,
    pub rows_written: usize,
}

/// Ingest every whitelisted export under `root`.
///
/// Only failing to list `root` itself is an error; everything below that is
/// logged, counted and skipped. Without a `history`, re-running over the same
/// tree appends the same rows again.
pub fn run<S: Sink>(
    root: &Path,
    config: &Config,
    sink: &mut S,
    history: Option<&mut IngestHistory>,
) -> Result<RunSummary> {
    let mut ingest = Ingest {
        config,
        sink,
        history,
        summary: RunSummary::default(),
    };
    ingest.walk_root(root)?;

    let s = &ingest.summary;
    info!(
        ingested = s.files_ingested,
        failed = s.files_failed,
        unmatched = s.files_unmatched,
        not_whitelisted = s.files_not_whitelisted,
        already_ingested = s.files_already_ingested,
        rows = s.rows_written,
        "run complete"
    );
    Ok(ingest.summary)
}

struct Ingest<'a, S: Sink> {
    config: &'a Config,
    sink: &'a mut S,
    history: Option<&'a mut IngestHistory>,
    summary: RunSummary,
}

/// One export file that passed the name and whitelist checks.
struct Candidate {
    path: PathBuf,
    file_name: String,
    participant_id: String,
    table: String,
}

impl<S: Sink> Ingest<'_, S> {
    #[instrument(level = "info", skip(self, root), fields(root = %root.display()))]
    fn walk_root(&mut self, root: &Path) -> Result<()> {
        let entries =
            fs::read_dir(root).with_context(|| format!("listing {}", root.display()))?;

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "could not read directory entry");
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();

            // Only a warning: the name check below still runs on files.
            if !path.is_dir() {
                warn!(entry = %name, "not a directory");
            }

            let status = classify_directory(&name);
            debug!(directory = %name, status = status.as_str(), "classified");
            match status {
                DirectoryStatus::Withdrawn => {
                    self.summary.directories_withdrawn += 1;
                    info!(directory = %name, "skipping participant marked as withdrawn");
                }
                DirectoryStatus::Active => {
                    self.summary.directories_active += 1;
                    if let Err(e) = self.ingest_participant(&path) {
                        warn!(directory = %name, error = %format!("{:#}", e), "could not ingest participant directory");
                    }
                }
                DirectoryStatus::Invalid => {
                    self.summary.directories_invalid += 1;
                    warn!(directory = %name, "directory name does not follow naming convention, skipping");
                }
            }
        }
        Ok(())
    }

    #[instrument(level = "debug", skip(self, dir), fields(dir = %dir.display()))]
    fn ingest_participant(&mut self, dir: &Path) -> Result<()> {
        let entries = fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))?;

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "could not read directory entry");
                    continue;
                }
            };
            let file_name = entry.file_name().to_string_lossy().into_owned();

            let FileMatch::Matched {
                participant_id,
                raw_table,
                ..
            } = classify_file(&file_name)
            else {
                self.summary.files_unmatched += 1;
                warn!(file = %file_name, "file name does not follow naming convention, skipping");
                continue;
            };

            let table = normalize_table_name(&raw_table);
            if !self.config.whitelist.contains(&table) {
                self.summary.files_not_whitelisted += 1;
                debug!(file = %file_name, table = %table, "table not whitelisted");
                continue;
            }

            self.ingest_candidate(Candidate {
                path: entry.path(),
                file_name,
                participant_id,
                table,
            });
        }
        Ok(())
    }

    fn ingest_candidate(&mut self, c: Candidate) {
        let key = IngestedRow::key_for(
            &self.config.aws.database,
            &c.table,
            &c.participant_id,
            &c.file_name,
        );
        if self.history.as_ref().is_some_and(|h| h.contains(&key)) {
            self.summary.files_already_ingested += 1;
            info!(file = %c.file_name, table = %c.table, "already ingested, skipping");
            return;
        }

        match self.load_and_write(&c) {
            Ok(outcome) => {
                self.summary.files_ingested += 1;
                self.summary.rows_written += outcome.rows;
                self.record(&c, outcome.rows);
            }
            Err(e) => {
                self.summary.files_failed += 1;
                error!(
                    table = %c.table,
                    pid = %c.participant_id,
                    file = %c.file_name,
                    error = %format!("{:#}", e),
                    "could not write table"
                );
            }
        }
    }

    #[instrument(level = "info", skip(self, c), fields(table = %c.table, pid = %c.participant_id))]
    fn load_and_write(&mut self, c: &Candidate) -> Result<WriteOutcome> {
        info!(file = %c.file_name, "ingesting");

        let batch = load_csv(&c.path)?;
        let batch = tag_participant(&batch, &c.participant_id)?;
        let batch = match &self.config.typer {
            Some(rules) => typer::apply_rules(batch, &c.table, rules),
            None => batch,
        };
        describe_columns(&c.table, &batch);

        self.sink.write_dataset(DatasetWrite {
            batch,
            path: table_path(&self.config.aws.s3_path, &c.table),
            database: self.config.aws.database.clone(),
            table: c.table.clone(),
            partition_cols: vec![PID_COLUMN.to_string()],
        })
    }

    fn record(&mut self, c: &Candidate, rows: usize) {
        let Some(history) = self.history.as_deref_mut() else {
            return;
        };
        let row = IngestedRow {
            database: self.config.aws.database.clone(),
            table: c.table.clone(),
            participant_id: c.participant_id.clone(),
            source_file: c.file_name.clone(),
            rows: rows as u64,
            ingested_at: Utc::now(),
        };
        if let Err(e) = history.add(&row) {
            warn!(file = %c.file_name, error = %e, "could not record ingest history");
        }
    }
}
