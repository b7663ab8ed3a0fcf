// src/typer/sniff.rs
use arrow::{
    array::{Array, AsArray},
    datatypes::{DataType, Float64Type, Int64Type},
    record_batch::RecordBatch,
    util::display::array_value_to_string,
};
use once_cell::sync::Lazy;
use regex::Regex;

/// A richer type that a textual column looks like it should be.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeHint {
    /// Parse the column as a date-time.
    DateTime,
}

/// Format checks only. A match says "looks like", not "is valid".
static PATTERNS: Lazy<Vec<(Regex, TypeHint)>> = Lazy::new(|| {
    vec![(
        Regex::new(r"^\b(\d{4})-(0[1-9]|1[0-2])-(0[1-9]|1[0-9]|2[0-9]|3[01])\b")
            .expect("date pattern should compile"),
        TypeHint::DateTime,
    )]
});

/// One cell lifted out of an Arrow column.
#[derive(Clone, Debug, PartialEq)]
pub enum CellValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    /// Any other Arrow type, rendered for display.
    Other(String),
}

impl CellValue {
    pub fn from_array(arr: &dyn Array, row: usize) -> Self {
        if arr.is_null(row) {
            return CellValue::Null;
        }
        match arr.data_type() {
            DataType::Utf8 => CellValue::Text(arr.as_string::<i32>().value(row).to_string()),
            DataType::LargeUtf8 => CellValue::Text(arr.as_string::<i64>().value(row).to_string()),
            DataType::Int64 => CellValue::Integer(arr.as_primitive::<Int64Type>().value(row)),
            DataType::Float64 => CellValue::Float(arr.as_primitive::<Float64Type>().value(row)),
            DataType::Boolean => CellValue::Boolean(arr.as_boolean().value(row)),
            other => CellValue::Other(
                array_value_to_string(arr, row).unwrap_or_else(|_| other.to_string()),
            ),
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            CellValue::Null => "null",
            CellValue::Text(_) => "str",
            CellValue::Integer(_) => "int",
            CellValue::Float(_) => "float",
            CellValue::Boolean(_) => "bool",
            CellValue::Other(_) => "other",
        }
    }
}

/// First element of `column`, or `None` when the column is missing or empty.
///
/// Always position 0. Callers that want a representative value should not
/// read anything into the word "sample".
pub fn sample(batch: &RecordBatch, column: &str) -> Option<CellValue> {
    let arr = batch.column_by_name(column)?;
    if arr.is_empty() {
        return None;
    }
    Some(CellValue::from_array(arr.as_ref(), 0))
}

/// Test one example value against the pattern library. Only text can match.
pub fn sniff(value: &CellValue) -> Option<TypeHint> {
    let CellValue::Text(text) = value else {
        return None;
    };
    PATTERNS
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, hint)| *hint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::{
        array::{ArrayRef, Float64Array, Int64Array, StringArray},
        datatypes::{Field, Schema},
    };
    use std::sync::Arc;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn sniffs_iso_dates() {
        assert_eq!(sniff(&text("2024-01-15")), Some(TypeHint::DateTime));
        assert_eq!(sniff(&text("1999-12-31")), Some(TypeHint::DateTime));
        // prefix match, like a timestamp
        assert_eq!(
            sniff(&text("2024-01-15T08:30:00+00:00")),
            Some(TypeHint::DateTime)
        );
        // format only, not calendar validity
        assert_eq!(sniff(&text("2024-02-31")), Some(TypeHint::DateTime));
    }

    #[test]
    fn rejects_out_of_range_and_non_dates() {
        assert_eq!(sniff(&text("2024-13-40")), None);
        assert_eq!(sniff(&text("2024-00-10")), None);
        assert_eq!(sniff(&text("2024-01-32")), None);
        assert_eq!(sniff(&text("15/01/2024")), None);
        assert_eq!(sniff(&text("on 2024-01-15")), None);
        assert_eq!(sniff(&text("20240115")), None);
        assert_eq!(sniff(&text("")), None);
    }

    #[test]
    fn non_text_never_matches() {
        assert_eq!(sniff(&CellValue::Integer(42)), None);
        assert_eq!(sniff(&CellValue::Float(2024.0)), None);
        assert_eq!(sniff(&CellValue::Null), None);
        assert_eq!(sniff(&CellValue::Other("2024-01-15".into())), None);
    }

    #[test]
    fn sample_reads_position_zero() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("day", DataType::Utf8, true),
            Field::new("steps", DataType::Int64, true),
            Field::new("score", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![None, Some("2024-01-02")])) as ArrayRef,
                Arc::new(Int64Array::from(vec![10, 20])) as ArrayRef,
                Arc::new(Float64Array::from(vec![0.5, 1.5])) as ArrayRef,
            ],
        )
        .unwrap();

        assert_eq!(sample(&batch, "day"), Some(CellValue::Null));
        assert_eq!(sample(&batch, "steps"), Some(CellValue::Integer(10)));
        assert_eq!(sample(&batch, "score"), Some(CellValue::Float(0.5)));
        assert_eq!(sample(&batch, "missing"), None);
    }

    #[test]
    fn sample_of_empty_column_is_absent() {
        let schema = Arc::new(Schema::new(vec![Field::new("day", DataType::Utf8, true)]));
        let batch = RecordBatch::new_empty(schema);
        assert_eq!(sample(&batch, "day"), None);
    }
}
