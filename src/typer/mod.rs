// src/typer/mod.rs
//! Sampling-based type correction for a fixed set of table/column pairs.
pub mod sniff;

use anyhow::{anyhow, Result};
use arrow::{
    array::{Array, ArrayRef, AsArray, TimestampMillisecondBuilder},
    datatypes::{DataType, TimeUnit},
    record_batch::RecordBatch,
};
use serde::Deserialize;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, info, warn};

use crate::process::{date_parser, with_column};
pub use sniff::{sample, sniff, CellValue, TypeHint};

/// Which column of which table gets sniffed.
///
/// Inference is not attempted on arbitrary columns: every table/column pair
/// that needs it has to be listed here (or in the `[typer.columns]` config
/// table).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct TyperRules {
    columns: BTreeMap<String, String>,
}

impl Default for TyperRules {
    fn default() -> Self {
        let columns = [
            ("activity", "summary_date"),
            ("sleep", "summary_date"),
            ("sleep_periods", "day"),
        ]
        .into_iter()
        .map(|(t, c)| (t.to_string(), c.to_string()))
        .collect();
        Self { columns }
    }
}

impl TyperRules {
    pub fn empty() -> Self {
        Self {
            columns: BTreeMap::new(),
        }
    }

    /// Add or replace entries, keeping the rest.
    pub fn with_overrides(mut self, overrides: BTreeMap<String, String>) -> Self {
        self.columns.extend(overrides);
        self
    }

    pub fn column_for(&self, table: &str) -> Option<&str> {
        self.columns.get(table).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Convert a whole column according to `hint`. Fails if any non-null value
/// does not parse.
pub fn convert_column(arr: &ArrayRef, hint: TypeHint) -> Result<ArrayRef> {
    match hint {
        TypeHint::DateTime => {
            if arr.data_type() != &DataType::Utf8 {
                return Err(anyhow!(
                    "cannot parse {} column as date-time",
                    arr.data_type()
                ));
            }
            let sarr = arr.as_string::<i32>();
            let mut b = TimestampMillisecondBuilder::with_capacity(sarr.len());
            for (row, opt) in sarr.iter().enumerate() {
                match opt {
                    None => b.append_null(),
                    Some(s) => {
                        let ms = date_parser::parse_datetime_millis(s).ok_or_else(|| {
                            anyhow!("value {:?} at row {} is not a date-time", s, row)
                        })?;
                        b.append_value(ms);
                    }
                }
            }
            Ok(Arc::new(b.finish()) as ArrayRef)
        }
    }
}

pub fn hint_data_type(hint: TypeHint) -> DataType {
    match hint {
        TypeHint::DateTime => DataType::Timestamp(TimeUnit::Millisecond, None),
    }
}

/// Convert `column` of `batch` using `hint`.
///
/// Returns `None` (after logging a warning) when the conversion fails; the
/// caller keeps the batch it already has.
pub fn smart_type(
    batch: &RecordBatch,
    column: &str,
    hint: TypeHint,
    example: &CellValue,
) -> Option<RecordBatch> {
    let arr = batch.column_by_name(column)?;
    let from = arr.data_type().clone();

    let converted = match convert_column(arr, hint) {
        Ok(c) => c,
        Err(e) => {
            warn!(
                column,
                example = ?example,
                error = %e,
                "automatic type conversion failed"
            );
            return None;
        }
    };

    match with_column(batch, column, converted) {
        Ok(out) => {
            info!(
                column,
                from = %from,
                to = %hint_data_type(hint),
                "automatically updated column type"
            );
            Some(out)
        }
        Err(e) => {
            warn!(column, error = %e, "could not substitute converted column");
            None
        }
    }
}

/// Apply the typer rule for `table`, if there is one. Always hands back a
/// usable batch: the converted one, or the original.
pub fn apply_rules(batch: RecordBatch, table: &str, rules: &TyperRules) -> RecordBatch {
    let Some(column) = rules.column_for(table) else {
        return batch;
    };
    let Some(example) = sample(&batch, column) else {
        debug!(table, column, "no sample available, leaving column as-is");
        return batch;
    };
    let Some(hint) = sniff(&example) else {
        debug!(table, column, example = ?example, "sample did not match any pattern");
        return batch;
    };

    smart_type(&batch, column, hint, &example).unwrap_or(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::{
        array::{Int64Array, StringArray, TimestampMillisecondArray},
        datatypes::{Field, Schema},
    };

    fn batch(col: &str, values: Vec<Option<&str>>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new(col, DataType::Utf8, true),
            Field::new("score", DataType::Int64, true),
        ]));
        let n = values.len() as i64;
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(values)) as ArrayRef,
                Arc::new(Int64Array::from_iter_values(0..n)) as ArrayRef,
            ],
        )
        .unwrap()
    }

    #[test]
    fn default_rules() {
        let rules = TyperRules::default();
        assert_eq!(rules.column_for("activity"), Some("summary_date"));
        assert_eq!(rules.column_for("sleep"), Some("summary_date"));
        assert_eq!(rules.column_for("sleep_periods"), Some("day"));
        assert_eq!(rules.column_for("readiness"), None);
        assert_eq!(rules.len(), 3);
    }

    #[test]
    fn overrides_extend_and_replace() {
        let rules = TyperRules::default().with_overrides(BTreeMap::from([
            ("readiness".to_string(), "summary_date".to_string()),
            ("sleep".to_string(), "bedtime_start".to_string()),
        ]));
        assert_eq!(rules.column_for("readiness"), Some("summary_date"));
        assert_eq!(rules.column_for("sleep"), Some("bedtime_start"));
        assert_eq!(rules.column_for("activity"), Some("summary_date"));
    }

    #[test]
    fn converts_dispatched_column() {
        let b = batch(
            "summary_date",
            vec![Some("2024-01-15"), None, Some("2024-01-16")],
        );
        let out = apply_rules(b, "sleep", &TyperRules::default());

        let field = out.schema().field_with_name("summary_date").unwrap().clone();
        assert_eq!(
            field.data_type(),
            &DataType::Timestamp(TimeUnit::Millisecond, None)
        );
        // column order is kept
        assert_eq!(out.schema().field(0).name(), "summary_date");

        let ts = out
            .column(0)
            .as_any()
            .downcast_ref::<TimestampMillisecondArray>()
            .unwrap();
        assert_eq!(ts.value(0), 1_705_276_800_000);
        assert!(ts.is_null(1));
        assert_eq!(ts.value(2), 1_705_276_800_000 + 86_400_000);
    }

    #[test]
    fn failed_parse_keeps_original_column() {
        // passes the format check, fails the calendar
        let b = batch("summary_date", vec![Some("2024-02-31"), Some("2024-03-01")]);
        let out = apply_rules(b.clone(), "activity", &TyperRules::default());
        assert_eq!(out, b);
    }

    #[test]
    fn later_garbage_fails_whole_column() {
        let b = batch("day", vec![Some("2024-01-15"), Some("not a date")]);
        let out = apply_rules(b.clone(), "sleep_periods", &TyperRules::default());
        assert_eq!(out.column(0).data_type(), &DataType::Utf8);
    }

    #[test]
    fn untouched_without_rule_or_match() {
        let rules = TyperRules::default();

        let b = batch("summary_date", vec![Some("2024-01-15")]);
        assert_eq!(apply_rules(b.clone(), "readiness", &rules), b);

        // first value decides, even when later ones look like dates
        let b = batch("summary_date", vec![Some("n/a"), Some("2024-01-15")]);
        assert_eq!(apply_rules(b.clone(), "sleep", &rules), b);

        // rule names a column the file doesn't have
        let b = batch("other", vec![Some("2024-01-15")]);
        assert_eq!(apply_rules(b.clone(), "sleep", &rules), b);

        assert_eq!(
            apply_rules(batch("summary_date", vec![Some("2024-01-15")]), "sleep", &TyperRules::empty())
                .column(0)
                .data_type(),
            &DataType::Utf8
        );
    }

    #[test]
    fn non_text_column_is_not_converted() {
        let arr: ArrayRef = Arc::new(Int64Array::from(vec![20240115]));
        assert!(convert_column(&arr, TypeHint::DateTime).is_err());
    }
}
