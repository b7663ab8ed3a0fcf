// src/sink/catalog.rs
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tracing::debug;

pub const CATALOG_FILE: &str = "_catalog.json";

/// A single non-partition column as registered in the catalog.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq, Hash)]
pub struct CatalogColumn {
    pub name: String,
    pub ty: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct CatalogTable {
    pub database: String,
    pub table: String,
    pub location: String,
    pub partition_keys: Vec<String>,
    pub columns: Vec<CatalogColumn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// JSON-file table catalog keyed by `database.table`.
#[derive(Debug)]
pub struct Catalog {
    path: PathBuf,
    tables: BTreeMap<String, CatalogTable>,
}

fn key(database: &str, table: &str) -> String {
    format!("{}.{}", database, table)
}

impl Catalog {
    /// Open the catalog at `path`, starting empty if the file doesn't exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let tables = if path.exists() {
            let f = fs::File::open(&path)
                .with_context(|| format!("opening catalog {}", path.display()))?;
            serde_json::from_reader(f)
                .with_context(|| format!("parsing catalog {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, tables })
    }

    pub fn get(&self, database: &str, table: &str) -> Option<&CatalogTable> {
        self.tables.get(&key(database, table))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Work out the entry a write would leave behind, without touching disk.
    ///
    /// Returns the entry and whether it is new. New columns are appended;
    /// a changed location, partition layout or column type is an error.
    pub fn plan(
        &self,
        database: &str,
        table: &str,
        location: &str,
        partition_keys: &[String],
        columns: &[CatalogColumn],
    ) -> Result<(CatalogTable, bool)> {
        let now = Utc::now();
        let Some(existing) = self.get(database, table) else {
            return Ok((
                CatalogTable {
                    database: database.to_string(),
                    table: table.to_string(),
                    location: location.to_string(),
                    partition_keys: partition_keys.to_vec(),
                    columns: columns.to_vec(),
                    created_at: now,
                    updated_at: now,
                },
                true,
            ));
        };

        if existing.location.trim_end_matches('/') != location.trim_end_matches('/') {
            bail!(
                "table {}.{} is registered at {}, not {}",
                database,
                table,
                existing.location,
                location
            );
        }
        if existing.partition_keys != partition_keys {
            bail!(
                "table {}.{} is partitioned by {:?}, not {:?}",
                database,
                table,
                existing.partition_keys,
                partition_keys
            );
        }

        let mut merged = existing.clone();
        for col in columns {
            match merged.columns.iter().find(|c| c.name == col.name) {
                Some(c) if c.ty != col.ty => bail!(
                    "column {} of {}.{} is {}, incoming data has {}",
                    col.name,
                    database,
                    table,
                    c.ty,
                    col.ty
                ),
                Some(_) => {}
                None => {
                    debug!(table, column = %col.name, "adding column to catalog entry");
                    merged.columns.push(col.clone());
                }
            }
        }
        merged.updated_at = now;
        Ok((merged, false))
    }

    /// Store `entry` and write the catalog back atomically.
    pub fn commit(&mut self, entry: CatalogTable) -> Result<()> {
        self.tables
            .insert(key(&entry.database, &entry.table), entry);
        self.save()
    }

    fn save(&self) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)
            .with_context(|| format!("creating catalog directory {}", dir.display()))?;

        let tmp_path = dir.join(format!(".{}.tmp", CATALOG_FILE));
        let mut tmp = fs::File::create(&tmp_path)
            .with_context(|| format!("creating {}", tmp_path.display()))?;
        serde_json::to_writer_pretty(&mut tmp, &self.tables).context("serializing catalog")?;
        tmp.write_all(b"\n")?;

        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!(
                "renaming {} -> {}",
                tmp_path.display(),
                self.path.display()
            )
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn col(name: &str, ty: &str) -> CatalogColumn {
        CatalogColumn {
            name: name.into(),
            ty: ty.into(),
        }
    }

    fn pid() -> Vec<String> {
        vec!["pid".to_string()]
    }

    #[test]
    fn create_then_append_with_new_column() -> Result<()> {
        let tmp = tempdir()?;
        let mut cat = Catalog::open(tmp.path().join(CATALOG_FILE))?;
        assert!(cat.is_empty());

        let (entry, created) = cat.plan("db", "sleep", "s3://b/d/sleep/", &pid(), &[col("score", "Int64")])?;
        assert!(created);
        cat.commit(entry)?;

        let (entry, created) = cat.plan(
            "db",
            "sleep",
            "s3://b/d/sleep",
            &pid(),
            &[col("score", "Int64"), col("note", "Utf8")],
        )?;
        assert!(!created);
        assert_eq!(entry.columns, vec![col("score", "Int64"), col("note", "Utf8")]);
        cat.commit(entry)?;

        // survives a reopen
        let reopened = Catalog::open(tmp.path().join(CATALOG_FILE))?;
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get("db", "sleep").unwrap().columns.len(), 2);
        Ok(())
    }

    #[test]
    fn conflicting_type_or_location_is_rejected() -> Result<()> {
        let tmp = tempdir()?;
        let mut cat = Catalog::open(tmp.path().join(CATALOG_FILE))?;
        let (entry, _) = cat.plan("db", "sleep", "s3://b/d/sleep/", &pid(), &[col("score", "Int64")])?;
        cat.commit(entry)?;

        assert!(cat
            .plan("db", "sleep", "s3://b/d/sleep/", &pid(), &[col("score", "Utf8")])
            .is_err());
        assert!(cat
            .plan("db", "sleep", "s3://b/other/sleep/", &pid(), &[col("score", "Int64")])
            .is_err());
        assert!(cat
            .plan("db", "sleep", "s3://b/d/sleep/", &[], &[col("score", "Int64")])
            .is_err());
        // another database is another table
        assert!(cat
            .plan("db2", "sleep", "s3://b/other/sleep/", &pid(), &[])?
            .1);
        Ok(())
    }
}
