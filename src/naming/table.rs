// src/naming/table.rs

/// Fold a raw filename table tag into its catalog identifier: every space and
/// hyphen becomes an underscore, nothing else changes.
pub fn normalize_table_name(raw: &str) -> String {
    raw.replace([' ', '-'], "_")
}
