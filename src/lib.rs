pub mod config;
pub mod history;
pub mod ingest;
pub mod naming;
pub mod process;
pub mod sink;
pub mod typer;
