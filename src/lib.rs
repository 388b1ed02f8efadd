//! sensor_export library: time-series export for sensor tables and log streams
//!
//! This library reads heterogeneous relational sensor tables (PostgreSQL or
//! SQLite) and Loki log/metric streams, reconciles their schemas, shapes them
//! into one of three output layouts (wide merge on a time key, per-source
//! passthrough, common-column long format) and writes CSV, line-delimited
//! JSON, spreadsheet, BUFR and GRIB2 artifacts.
//!
//! # Example
//!
//! ```no_run
//! use sensor_export::{run_export, ExportConfig, ExportFormat};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExportConfig {
//!     sensors: vec!["temperature,pressure".to_string()],
//!     merge: true,
//!     formats: vec![ExportFormat::Csv, ExportFormat::Bufr],
//!     ..Default::default()
//! };
//!
//! let report = run_export(config).await?;
//! println!("Wrote {} artifact(s) with {} row(s)",
//!          report.artifacts.len(), report.rows);
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Use `#[tokio::main]` in your application
//! or ensure you're calling library functions within an async context.

pub mod codec;
pub mod config;
pub mod error_handling;
pub mod export;
pub mod initialization;
pub mod loki;
pub mod merge;
pub mod reconcile;
mod run;
pub mod storage;
pub mod table;

// Re-export public API
pub use config::{ExportConfig, LogFormat, LogLevel, Opt};
pub use error_handling::{classify, ErrorKind};
pub use export::{ExportFormat, ExportMode, ExportPlan};
pub use run::{
    describe_sensor, export_with, fetch_log_table, fetch_sources, list_sensors, loki_labels,
    preview_labels, run_export, ExportReport, LabelPreview,
};
pub use table::{CanonicalTable, Column, ColumnType, TabularSource, Value};
