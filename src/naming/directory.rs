// src/naming/directory.rs
use once_cell::sync::Lazy;
use regex::Regex;

static ACTIVE_DIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^PPID [0-9]+ Data$").expect("active dir pattern should compile"));
static WITHDRAWN_DIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^PPID [0-9]+ Data - withdrew$").expect("withdrawn dir pattern should compile")
});

/// What a top-level participant folder name says about its participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DirectoryStatus {
    /// `PPID <n> Data`: descend and ingest.
    Active,
    /// `PPID <n> Data - withdrew`: skip without complaint.
    Withdrawn,
    /// Anything else.
    Invalid,
}

impl DirectoryStatus {
    pub fn as_str(&self) -> &str {
        match self {
            DirectoryStatus::Active => "active",
            DirectoryStatus::Withdrawn => "withdrawn",
            DirectoryStatus::Invalid => "invalid",
        }
    }
}

/// Classify a participant folder name. The withdrawn pattern is checked first.
pub fn classify_directory(name: &str) -> DirectoryStatus {
    if WITHDRAWN_DIR.is_match(name) {
        DirectoryStatus::Withdrawn
    } else if ACTIVE_DIR.is_match(name) {
        DirectoryStatus::Active
    } else {
        DirectoryStatus::Invalid
    }
}
