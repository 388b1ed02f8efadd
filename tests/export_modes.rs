//! End-to-end tests of the three export modes against an in-memory sensor store.

use sensor_export::export::{ExportFormat, ExportPlan};
use sensor_export::storage::TabularFetcher;
use sensor_export::{classify, export_with, run_export, ErrorKind, ExportConfig};
use tempfile::TempDir;

#[path = "helpers.rs"]
mod helpers;

use helpers::{config_for, create_sensor_database, file_names, read_csv};

fn with_sensors(out: &TempDir, sensors: &str) -> ExportConfig {
    ExportConfig {
        sensors: vec![sensors.to_string()],
        ..config_for(out.path())
    }
}

async fn export(config: &ExportConfig) -> anyhow::Result<sensor_export::ExportReport> {
    let db = create_sensor_database().await;
    let plan = config.plan()?;
    export_with(config, &plan, Some(&db as &dyn TabularFetcher), None).await
}

#[tokio::test]
async fn test_merge_aligns_sources_on_timestamp() {
    let out = TempDir::new().expect("temp dir");
    let config = ExportConfig {
        merge: true,
        ..with_sensors(&out, "temperature,pressure")
    };

    let report = export(&config).await.expect("merge export");

    assert!(report.is_success());
    assert_eq!(report.tables, 1);
    assert_eq!(report.rows, 4);
    let records = read_csv(&out.path().join("merged_temperature-pressure.csv"));
    assert_eq!(
        records[0],
        ["timestamp", "temperature_value", "temperature_station", "pressure_value"]
    );
    let values: Vec<(&str, &str)> = records[1..]
        .iter()
        .map(|r| (r[1].as_str(), r[3].as_str()))
        .collect();
    assert_eq!(
        values,
        [("20.5", ""), ("21", "1013.25"), ("21.5", "1012"), ("", "1011.5")]
    );
}

#[tokio::test]
async fn test_separate_writes_one_artifact_per_source() {
    let out = TempDir::new().expect("temp dir");
    let config = ExportConfig {
        separate: true,
        ..with_sensors(&out, "temperature, pressure")
    };

    let report = export(&config).await.expect("separate export");

    assert_eq!(report.tables, 2);
    assert_eq!(
        file_names(out.path()),
        ["separate_pressure.csv", "separate_temperature.csv"]
    );
    let temperature = read_csv(&out.path().join("separate_temperature.csv"));
    assert_eq!(temperature[0], ["timestamp", "value", "station"]);
    assert_eq!(temperature.len(), 4);
    assert_eq!(temperature[3][2], "");
}

#[tokio::test]
async fn test_combined_keeps_shared_columns_with_provenance() {
    let out = TempDir::new().expect("temp dir");
    let config = with_sensors(&out, "temperature,pressure");

    let report = export(&config).await.expect("combined export");

    assert_eq!(report.rows, 6);
    let records = read_csv(&out.path().join("combined_temperature-pressure.csv"));
    assert_eq!(records[0], ["timestamp", "value", "source_id"]);
    let sources: Vec<&str> = records[1..].iter().map(|r| r[2].as_str()).collect();
    assert_eq!(
        sources,
        ["temperature", "temperature", "temperature", "pressure", "pressure", "pressure"]
    );
}

#[tokio::test]
async fn test_merge_without_ordering_key_writes_nothing() {
    let out = TempDir::new().expect("temp dir");
    let config = ExportConfig {
        merge: true,
        ..with_sensors(&out, "temperature,door")
    };

    let err = export(&config).await.expect_err("door has no timestamp");

    assert_eq!(classify(&err), ErrorKind::MissingOrderingKey);
    assert!(format!("{:#}", err).contains("door"));
    assert!(file_names(out.path()).is_empty());
}

#[tokio::test]
async fn test_combined_without_common_columns_is_fatal() {
    let out = TempDir::new().expect("temp dir");
    let config = with_sensors(&out, "temperature,door");

    let err = export(&config).await.expect_err("no shared columns");

    assert_eq!(classify(&err), ErrorKind::NoCommonColumns);
    assert!(file_names(out.path()).is_empty());
}

#[tokio::test]
async fn test_custom_ordering_key_merges_on_that_column() {
    let out = TempDir::new().expect("temp dir");
    let config = ExportConfig {
        separate: true,
        ordering_key: "opened_at".to_string(),
        ..with_sensors(&out, "door")
    };

    let report = export(&config).await.expect("separate export");

    assert_eq!(report.rows, 2);
    let door = read_csv(&out.path().join("separate_door.csv"));
    assert_eq!(door[0], ["opened_at", "open"]);
    assert_eq!(door[1][1], "true");
    assert_eq!(door[2][1], "false");
}

#[tokio::test]
async fn test_query_override_exports_single_table() {
    let out = TempDir::new().expect("temp dir");
    let config = ExportConfig {
        query: Some("SELECT station, COUNT(*) AS readings FROM temperature GROUP BY station ORDER BY station".to_string()),
        ..config_for(out.path())
    };

    let report = export(&config).await.expect("query export");

    assert_eq!(report.tables, 1);
    let records = read_csv(&out.path().join("query.csv"));
    assert_eq!(records[0], ["station", "readings"]);
    assert_eq!(records[1], ["", "1"]);
    assert_eq!(records[2], ["north", "2"]);
}

#[tokio::test]
async fn test_failed_format_does_not_block_others() {
    let out = TempDir::new().expect("temp dir");
    let config = ExportConfig {
        merge: true,
        formats: vec![ExportFormat::Csv, ExportFormat::Bufr, ExportFormat::Json],
        ..with_sensors(&out, "temperature,pressure")
    };

    let report = export(&config).await.expect("export runs");

    // temperature_station is text, which BUFR cannot carry.
    assert!(!report.is_success());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].format, ExportFormat::Bufr);
    assert_eq!(report.failures[0].kind, ErrorKind::UnsupportedFieldType);
    assert_eq!(
        file_names(out.path()),
        ["merged_temperature-pressure.csv", "merged_temperature-pressure.jsonl"]
    );
}

#[tokio::test]
async fn test_numeric_merge_writes_scientific_formats() {
    let out = TempDir::new().expect("temp dir");
    let config = ExportConfig {
        separate: true,
        formats: vec![ExportFormat::Bufr, ExportFormat::Grib],
        ..with_sensors(&out, "pressure")
    };

    let report = export(&config).await.expect("export runs");

    assert!(report.is_success(), "{:?}", report.failures);
    assert_eq!(
        file_names(out.path()),
        ["separate_pressure.bufr", "separate_pressure.grib2"]
    );
}

#[tokio::test]
async fn test_conflicting_modes_fail_before_connecting() {
    let out = TempDir::new().expect("temp dir");
    let config = ExportConfig {
        merge: true,
        separate: true,
        // Would fail to connect if it were ever reached.
        database: sensor_export::config::DatabaseConfig {
            url: Some("postgres://nobody@127.0.0.1:1/none".to_string()),
            ..Default::default()
        },
        ..with_sensors(&out, "temperature")
    };

    let err = run_export(config).await.expect_err("conflicting modes");

    assert_eq!(classify(&err), ErrorKind::ConfigurationConflict);
    assert!(file_names(out.path()).is_empty());
}

#[tokio::test]
async fn test_nothing_requested_is_a_configuration_error() {
    let out = TempDir::new().expect("temp dir");
    let err = ExportPlan::resolve(&config_for(out.path()).plan_request()).unwrap_err();
    assert!(err.to_string().to_lowercase().contains("nothing"));
}
