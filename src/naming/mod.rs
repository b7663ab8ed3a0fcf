// src/naming/mod.rs
pub mod directory;
pub mod file;
pub mod table;

pub use directory::{classify_directory, DirectoryStatus};
pub use file::{classify_file, FileMatch};
pub use table::normalize_table_name;
