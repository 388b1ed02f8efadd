//! Tests for the file sinks and artifact naming through the writer.

use chrono::{TimeZone, Utc};
use sensor_export::codec::CodecOptions;
use sensor_export::export::{
    write_tables, ArtifactKind, ExportFormat, ExportedTable, WriteOptions,
};
use sensor_export::table::TableOrigin;
use sensor_export::{CanonicalTable, Column, ColumnType, Value};
use tempfile::TempDir;

#[path = "helpers.rs"]
mod helpers;

use helpers::{file_names, read_csv};

fn readings() -> ExportedTable {
    let t0 = Utc.with_ymd_and_hms(2024, 3, 10, 6, 0, 0).unwrap();
    let table = CanonicalTable::try_new(
        vec![
            Column::new("timestamp", ColumnType::Timestamp),
            Column::new("value", ColumnType::Float),
            Column::new("price", ColumnType::Decimal),
            Column::new("note", ColumnType::Text),
        ],
        vec![
            vec![
                Value::Timestamp(t0),
                Value::Float(f64::NAN),
                Value::Decimal("10.000000000000000001".parse().unwrap()),
                Value::Text("say \"hi\", then leave".to_string()),
            ],
            vec![
                Value::Timestamp(t0 + chrono::Duration::milliseconds(1500)),
                Value::Float(2.5),
                Value::Null,
                Value::Null,
            ],
        ],
    )
    .expect("valid table");
    ExportedTable {
        kind: ArtifactKind::Merged,
        sources: vec!["rain gauge".to_string(), "wind".to_string()],
        table,
        origin: TableOrigin::Sensor,
    }
}

fn options(dir: &TempDir) -> WriteOptions {
    WriteOptions {
        out_dir: dir.path().to_path_buf(),
        stamp: None,
        codec: CodecOptions::default(),
    }
}

#[test]
fn test_csv_quotes_and_renders_nulls_empty() {
    let out = TempDir::new().expect("temp dir");
    let outcome = write_tables(&[readings()], &[ExportFormat::Csv], &options(&out));

    assert!(outcome.failures.is_empty());
    let records = read_csv(&out.path().join("merged_rain_gauge-wind.csv"));
    assert_eq!(records[0], ["timestamp", "value", "price", "note"]);
    assert_eq!(records[1][0], "2024-03-10T06:00:00Z");
    assert_eq!(records[1][2], "10.000000000000000001");
    assert_eq!(records[1][3], "say \"hi\", then leave");
    assert_eq!(records[2], ["2024-03-10T06:00:01.500Z", "2.5", "", ""]);
}

#[test]
fn test_jsonl_one_object_per_row() {
    let out = TempDir::new().expect("temp dir");
    write_tables(&[readings()], &[ExportFormat::Json], &options(&out));

    let text = std::fs::read_to_string(out.path().join("merged_rain_gauge-wind.jsonl"))
        .expect("jsonl artifact");
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).expect("valid json line"))
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["value"], serde_json::Value::Null);
    assert_eq!(lines[0]["price"], "10.000000000000000001");
    assert_eq!(lines[1]["value"], 2.5);
    assert_eq!(lines[1]["note"], serde_json::Value::Null);
    let keys: Vec<&String> = lines[0].as_object().unwrap().keys().collect();
    assert_eq!(keys, ["timestamp", "value", "price", "note"]);
}

#[test]
fn test_excel_artifact_is_a_zip_container() {
    let out = TempDir::new().expect("temp dir");
    let outcome = write_tables(&[readings()], &[ExportFormat::Excel], &options(&out));

    assert_eq!(outcome.artifacts.len(), 1);
    assert_eq!(outcome.artifacts[0].rows, 2);
    let bytes = std::fs::read(&outcome.artifacts[0].path).expect("xlsx artifact");
    assert_eq!(&bytes[..2], b"PK");
}

#[test]
fn test_timestamped_names_and_missing_out_dir_is_created() {
    let out = TempDir::new().expect("temp dir");
    let nested = out.path().join("a").join("b");
    let stamp = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 58).unwrap();
    let options = WriteOptions {
        out_dir: nested.clone(),
        stamp: Some(stamp),
        codec: CodecOptions::default(),
    };

    let outcome = write_tables(&[readings()], &[ExportFormat::Csv], &options);

    assert!(outcome.failures.is_empty());
    assert_eq!(
        file_names(&nested),
        ["merged_rain_gauge-wind_20241231_235958.csv"]
    );
}
