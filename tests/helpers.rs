// Shared test helpers for sensor fixtures and output inspection.
//
// This module provides common utilities used across multiple test files to reduce duplication.

use std::path::Path;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use sensor_export::config::ExportConfig;
use sensor_export::storage::SensorDatabase;

/// Creates an in-memory sensor store with three tables:
/// - `temperature(timestamp, value, station)`: minutes 0, 1, 2
/// - `pressure(timestamp, value)`: minutes 1, 2, 3
/// - `door(opened_at, open)`: no `timestamp` column
#[allow(dead_code)] // Used by other test files
pub async fn create_sensor_pool() -> SqlitePool {
    // One connection: every connection to `sqlite::memory:` is a separate database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test database pool");

    for statement in [
        "CREATE TABLE temperature (timestamp DATETIME, value REAL, station TEXT)",
        "CREATE TABLE pressure (timestamp DATETIME, value REAL)",
        "CREATE TABLE door (opened_at DATETIME, open BOOLEAN)",
        "INSERT INTO temperature VALUES
            ('2024-01-01 00:00:00', 20.5, 'north'),
            ('2024-01-01 00:01:00', 21.0, 'north'),
            ('2024-01-01 00:02:00', 21.5, NULL)",
        "INSERT INTO pressure VALUES
            ('2024-01-01 00:01:00', 1013.25),
            ('2024-01-01 00:02:00', 1012.0),
            ('2024-01-01 00:03:00', 1011.5)",
        "INSERT INTO door VALUES ('2024-01-01 00:00:30', 1), ('2024-01-01 00:05:00', 0)",
    ] {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .expect("Failed to seed sensor tables");
    }
    pool
}

#[allow(dead_code)]
pub async fn create_sensor_database() -> SensorDatabase {
    SensorDatabase::Sqlite(create_sensor_pool().await)
}

/// Config writing untimestamped artifacts into `out_dir`.
#[allow(dead_code)]
pub fn config_for(out_dir: &Path) -> ExportConfig {
    ExportConfig {
        out_dir: out_dir.to_path_buf(),
        timestamped: false,
        ..Default::default()
    }
}

/// All records of a CSV file, header included.
#[allow(dead_code)]
pub fn read_csv(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .expect("Failed to open CSV artifact");
    reader
        .records()
        .map(|r| {
            r.expect("Failed to read CSV record")
                .iter()
                .map(str::to_string)
                .collect()
        })
        .collect()
}

/// File names in `dir`, sorted.
#[allow(dead_code)]
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("Failed to read output directory")
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
