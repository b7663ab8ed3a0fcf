// src/naming/file.rs
use once_cell::sync::Lazy;
use regex::Regex;

/// `tag1_tag2_pid_table name.csv`; the table segment may hold letters,
/// digits, spaces and hyphens.
static DATA_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\w+)_(\w+)_(\w+)_([0-9a-zA-Z \-]+)\.csv$")
        .expect("data file pattern should compile")
});

/// Result of matching one export filename against the naming grammar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileMatch {
    Matched {
        /// The two leading tag segments, in order.
        tags: Vec<String>,
        /// Third segment.
        participant_id: String,
        /// Fourth segment without the `.csv` extension, not yet normalized.
        raw_table: String,
    },
    Unmatched,
}

pub fn classify_file(name: &str) -> FileMatch {
    let Some(caps) = DATA_FILE.captures(name) else {
        return FileMatch::Unmatched;
    };

    FileMatch::Matched {
        tags: vec![caps[1].to_string(), caps[2].to_string()],
        participant_id: caps[3].to_string(),
        raw_table: caps[4].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matched(name: &str) -> (Vec<String>, String, String) {
        match classify_file(name) {
            FileMatch::Matched {
                tags,
                participant_id,
                raw_table,
            } => (tags, participant_id, raw_table),
            FileMatch::Unmatched => panic!("{} should match", name),
        }
    }

    #[test]
    fn extracts_pid_and_table() {
        let (tags, pid, table) = matched("a_b_001_sleep.csv");
        assert_eq!(tags, vec!["a", "b"]);
        assert_eq!(pid, "001");
        assert_eq!(table, "sleep");
    }

    #[test]
    fn table_segment_allows_spaces_and_hyphens() {
        let (_, pid, table) = matched("oura_export_P17_sleep periods.csv");
        assert_eq!(pid, "P17");
        assert_eq!(table, "sleep periods");

        let (_, _, table) = matched("x_y_42_heart-rate v2.csv");
        assert_eq!(table, "heart-rate v2");
    }

    #[test]
    fn greedy_tags_take_the_last_three_underscores() {
        // `\w` includes `_`, so extra leading tags fold into the first group
        let (tags, pid, table) = matched("study_2024_oura_123_activity.csv");
        assert_eq!(tags, vec!["study_2024", "oura"]);
        assert_eq!(pid, "123");
        assert_eq!(table, "activity");
    }

    #[test]
    fn rejects_bad_names() {
        for name in [
            "bad name.csv",
            "a_b_sleep.csv",
            "a_b_001_sleep.CSV",
            "a_b_001_sleep.txt",
            "a_b_001_sleep.csv.bak",
            "a_b_001_.csv",
            "a_b_001_sleep!.csv",
            "a b_c_001_sleep.csv",
        ] {
            assert_eq!(classify_file(name), FileMatch::Unmatched, "{}", name);
        }
    }
}
