//! Log records and metric samples to Canonical Tables.
//!
//! The column layout is fixed: `timestamp`, then `line` (logs) or `value`
//! (metrics), then every label observed in the result set, sorted by name.
//! Records missing a label get a null in that column.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::error_handling::TableError;
use crate::loki::types::{LogRecord, MetricSample};
use crate::table::{CanonicalTable, Column, ColumnType, Value};

pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const LINE_COLUMN: &str = "line";
pub const VALUE_COLUMN: &str = "value";

/// Output column name for each label; a label clashing with a fixed column
/// is prefixed with `label_` until it no longer clashes.
fn label_columns<'a>(
    labels: impl Iterator<Item = &'a BTreeMap<String, String>>,
    fixed: &[&str],
) -> Vec<(String, String)> {
    let names: BTreeSet<&String> = labels.flat_map(|l| l.keys()).collect();
    let mut taken: BTreeSet<String> = fixed.iter().map(|s| s.to_string()).collect();
    taken.extend(names.iter().map(|s| s.to_string()));

    names
        .into_iter()
        .map(|label| {
            let mut column = label.clone();
            if fixed.contains(&label.as_str()) {
                column = format!("label_{}", label);
                while taken.contains(&column) {
                    column = format!("label_{}", column);
                }
                taken.insert(column.clone());
            }
            (label.clone(), column)
        })
        .collect()
}

fn build<T>(
    records: &[T],
    payload: Column,
    timestamp: impl Fn(&T) -> DateTime<Utc>,
    labels: impl Fn(&T) -> &BTreeMap<String, String>,
    value: impl Fn(&T) -> Value,
) -> Result<CanonicalTable, TableError> {
    let mapping = label_columns(
        records.iter().map(|r| labels(r)),
        &[TIMESTAMP_COLUMN, payload.name.as_str()],
    );

    let mut columns = vec![Column::new(TIMESTAMP_COLUMN, ColumnType::Timestamp), payload];
    columns.extend(
        mapping
            .iter()
            .map(|(_, column)| Column::new(column.clone(), ColumnType::Text)),
    );

    let mut ordered: Vec<&T> = records.iter().collect();
    ordered.sort_by_key(|r| timestamp(*r));

    let rows = ordered
        .into_iter()
        .map(|record| {
            let record_labels = labels(record);
            let mut row = Vec::with_capacity(columns.len());
            row.push(Value::Timestamp(timestamp(record)));
            row.push(value(record));
            row.extend(mapping.iter().map(|(label, _)| {
                record_labels
                    .get(label)
                    .map_or(Value::Null, |v| Value::Text(v.clone()))
            }));
            row
        })
        .collect();
    CanonicalTable::try_new(columns, rows)
}

/// Table of log lines, ascending by timestamp.
pub fn logs_to_table(records: &[LogRecord]) -> Result<CanonicalTable, TableError> {
    build(
        records,
        Column::new(LINE_COLUMN, ColumnType::Text),
        |r| r.timestamp,
        |r| &r.labels,
        |r| Value::Text(r.line.clone()),
    )
}

/// Table of metric samples, ascending by timestamp. Non-finite samples are null.
pub fn metrics_to_table(samples: &[MetricSample]) -> Result<CanonicalTable, TableError> {
    build(
        samples,
        Column::new(VALUE_COLUMN, ColumnType::Float),
        |s| s.timestamp,
        |s| &s.labels,
        |s| {
            if s.value.is_finite() {
                Value::Float(s.value)
            } else {
                Value::Null
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_logs_union_labels_and_sort_by_time() {
        let records = vec![
            LogRecord {
                timestamp: at(5),
                labels: labels(&[("job", "api"), ("level", "warn")]),
                line: "late".to_string(),
            },
            LogRecord {
                timestamp: at(1),
                labels: labels(&[("host", "a"), ("job", "db")]),
                line: "early".to_string(),
            },
        ];
        let table = logs_to_table(&records).unwrap();
        let names: Vec<&str> = table.column_names().collect();
        assert_eq!(names, ["timestamp", "line", "host", "job", "level"]);
        assert_eq!(table.value(0, "line"), Some(&Value::Text("early".to_string())));
        assert_eq!(table.value(0, "level"), Some(&Value::Null));
        assert_eq!(table.value(1, "host"), Some(&Value::Null));
        assert_eq!(table.value(1, "job"), Some(&Value::Text("api".to_string())));
    }

    #[test]
    fn test_equal_timestamps_keep_input_order() {
        let records: Vec<LogRecord> = ["first", "second", "third"]
            .iter()
            .map(|line| LogRecord {
                timestamp: at(0),
                labels: BTreeMap::new(),
                line: line.to_string(),
            })
            .collect();
        let table = logs_to_table(&records).unwrap();
        let lines: Vec<String> = table.column_values(1).map(|v| v.to_string()).collect();
        assert_eq!(lines, ["first", "second", "third"]);
    }

    #[test]
    fn test_colliding_labels_are_prefixed() {
        let samples = vec![MetricSample {
            timestamp: at(0),
            labels: labels(&[("value", "v"), ("timestamp", "t"), ("label_value", "x")]),
            value: 1.0,
        }];
        let table = metrics_to_table(&samples).unwrap();
        let names: Vec<&str> = table.column_names().collect();
        assert_eq!(
            names,
            ["timestamp", "value", "label_value", "label_timestamp", "label_label_value"]
        );
        assert_eq!(table.value(0, "label_value"), Some(&Value::Text("x".to_string())));
        assert_eq!(
            table.value(0, "label_label_value"),
            Some(&Value::Text("v".to_string()))
        );
        assert_eq!(table.value(0, "value"), Some(&Value::Float(1.0)));
    }

    #[test]
    fn test_empty_results_keep_fixed_columns() {
        let table = metrics_to_table(&[]).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.column_names().collect::<Vec<_>>(), ["timestamp", "value"]);
    }

    #[test]
    fn test_non_finite_samples_are_null() {
        let samples = vec![MetricSample {
            timestamp: at(0),
            labels: BTreeMap::new(),
            value: f64::NAN,
        }];
        let table = metrics_to_table(&samples).unwrap();
        assert_eq!(table.value(0, "value"), Some(&Value::Null));
    }
}
