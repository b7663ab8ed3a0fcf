// src/config.rs
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use crate::typer::TyperRules;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_WHITELIST_PATH: &str = "whitelist.txt";
pub const DEFAULT_SINK_ROOT: &str = "staging";

/// Everything a run needs, built once at startup and only ever borrowed.
#[derive(Debug, Clone)]
pub struct Config {
    pub whitelist: Whitelist,
    pub aws: AwsConfig,
    /// `None` when the typer is switched off.
    pub typer: Option<TyperRules>,
    /// Local directory the dataset sink writes under.
    pub sink_root: PathBuf,
    /// Ingest history location; no dedupe across runs when unset.
    pub history_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsConfig {
    /// Catalog database the tables are registered in.
    pub database: String,
    /// Storage root for table data, with or without a trailing `/`.
    pub s3_path: String,
}

/// Canonical (already normalized) table names that may be ingested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    tables: HashSet<String>,
}

impl Whitelist {
    /// One name per line; surrounding whitespace is trimmed, blank lines skipped.
    pub fn parse(contents: &str) -> Self {
        let tables = contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        Self { tables }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading whitelist {}", path.display()))?;
        Ok(Self::parse(&contents))
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains(table)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Whitelist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            tables: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(rename = "AWS")]
    aws: Option<RawAws>,
    #[serde(default)]
    typer: RawTyper,
    #[serde(default)]
    sink: RawSink,
    #[serde(default)]
    history: RawHistory,
}

#[derive(Debug, Deserialize)]
struct RawAws {
    aws_database: Option<String>,
    aws_s3_data: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTyper {
    enabled: Option<bool>,
    #[serde(default)]
    columns: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSink {
    root: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct RawHistory {
    dir: Option<PathBuf>,
}

impl Config {
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(config_path: P, whitelist_path: Q) -> Result<Self> {
        let config_path = config_path.as_ref();
        let contents = fs::read_to_string(config_path)
            .with_context(|| format!("reading config file {}", config_path.display()))?;
        let whitelist = Whitelist::load(whitelist_path)?;
        Self::from_toml_str(&contents, whitelist)
            .with_context(|| format!("loading config file {}", config_path.display()))
    }

    pub fn from_toml_str(contents: &str, whitelist: Whitelist) -> Result<Self> {
        let raw: RawConfig = toml::from_str(contents).context("parsing config TOML")?;

        let Some(aws) = raw.aws else {
            bail!("malformed config file: missing [AWS] section");
        };
        let (database, s3_path) = match (aws.aws_database, aws.aws_s3_data) {
            (Some(db), Some(path)) => (db, path),
            (None, _) => bail!("malformed config file section [AWS]: missing aws_database"),
            (_, None) => bail!("malformed config file section [AWS]: missing aws_s3_data"),
        };
        if s3_path.is_empty() {
            bail!("malformed config file section [AWS]: aws_s3_data is empty");
        }

        let typer = match raw.typer.enabled {
            Some(false) => None,
            _ => Some(TyperRules::default().with_overrides(raw.typer.columns)),
        };

        Ok(Self {
            whitelist,
            aws: AwsConfig { database, s3_path },
            typer,
            sink_root: raw
                .sink
                .root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SINK_ROOT)),
            history_dir: raw.history.dir,
        })
    }
}
