use anyhow::{Context, Result};
use clap::Parser;
use ppid_ingest::{
    config::{Config, DEFAULT_CONFIG_PATH, DEFAULT_WHITELIST_PATH},
    history::IngestHistory,
    ingest,
    sink::{DryRunSink, ParquetDatasetSink},
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Ingest participant CSV exports into partitioned tables.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Directory holding the `PPID <n> Data` folders
    directory: PathBuf,

    /// TOML config with the `[AWS]` section
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// One table name per line
    #[arg(long, default_value = DEFAULT_WHITELIST_PATH)]
    whitelist: PathBuf,

    /// Walk and load everything but write nothing
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_target(false)
        .init();

    let args = Args::parse();

    // ─── 2) config & whitelist ───────────────────────────────────────
    let config = Config::load(&args.config, &args.whitelist)?;
    info!(
        database = %config.aws.database,
        s3_path = %config.aws.s3_path,
        tables = config.whitelist.len(),
        typer = config.typer.is_some(),
        "configuration loaded"
    );

    let mut history = match &config.history_dir {
        Some(dir) => {
            let h = IngestHistory::new_ingested(dir)
                .with_context(|| format!("opening ingest history {}", dir.display()))?;
            info!(dir = %dir.display(), known = h.len(), "ingest history loaded");
            Some(h)
        }
        None => None,
    };

    // ─── 3) walk & ingest ────────────────────────────────────────────
    let summary = if args.dry_run {
        let mut sink = DryRunSink::default();
        ingest::run(&args.directory, &config, &mut sink, None)?
    } else {
        let mut sink = ParquetDatasetSink::open(&config.sink_root)?;
        info!(root = %config.sink_root.display(), "writing datasets");
        ingest::run(&args.directory, &config, &mut sink, history.as_mut())?
    };

    info!(?summary, "done");
    Ok(())
}
