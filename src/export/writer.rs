//! Per-format artifact writer.
//!
//! Every artifact is written to a temp file in the output directory and
//! renamed into place only once the sink succeeded, so a failed format
//! leaves nothing behind. Formats are isolated: one failing format is
//! recorded and the others are still written.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::codec::{BufrCodec, CodecOptions, GribCodec, ScientificFormat};
use crate::error_handling::{classify, ErrorKind};
use crate::export::csv::write_csv;
use crate::export::excel::write_excel;
use crate::export::jsonl::write_jsonl;
use crate::export::naming::artifact_file_name;
use crate::export::types::{ExportFormat, ExportedTable};
use crate::table::{CanonicalTable, TableOrigin};

/// Where and how artifacts are written.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub out_dir: PathBuf,
    /// Time component of artifact names; `None` suppresses it.
    pub stamp: Option<DateTime<Utc>>,
    pub codec: CodecOptions,
}

/// A file that was written.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    pub format: ExportFormat,
    pub rows: usize,
}

/// A format that could not be written for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatFailure {
    pub format: ExportFormat,
    /// Artifact name that was not produced.
    pub target: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Everything one [`write_tables`] call did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOutcome {
    pub artifacts: Vec<Artifact>,
    pub failures: Vec<FormatFailure>,
    /// Formats not applicable to a table, with the artifact name they would have had.
    pub skipped: Vec<(ExportFormat, String)>,
}

impl WriteOutcome {
    pub fn extend(&mut self, other: WriteOutcome) {
        self.artifacts.extend(other.artifacts);
        self.failures.extend(other.failures);
        self.skipped.extend(other.skipped);
    }
}

/// Serializes `table` in `format` to `output`.
fn serialize<W: Write>(
    table: &CanonicalTable,
    format: ExportFormat,
    codec: &CodecOptions,
    mut output: W,
) -> Result<usize> {
    match format {
        ExportFormat::Csv => write_csv(table, output),
        ExportFormat::Json => write_jsonl(table, output),
        ExportFormat::Excel => write_excel(table, output),
        ExportFormat::Bufr | ExportFormat::Grib => {
            let bytes = match format {
                ExportFormat::Bufr => BufrCodec::new(codec.clone()).encode(table)?,
                _ => GribCodec::new(codec.clone()).encode(table)?,
            };
            output
                .write_all(&bytes)
                .with_context(|| format!("Failed to write {} output", format.label()))?;
            output.flush()?;
            Ok(table.row_count())
        }
    }
}

/// Writes one artifact atomically.
fn write_artifact(
    table: &CanonicalTable,
    format: ExportFormat,
    codec: &CodecOptions,
    path: &Path,
) -> Result<usize> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;

    let rows = {
        let writer = BufWriter::new(temp.as_file_mut());
        serialize(table, format, codec, writer)?
    };
    temp.as_file()
        .sync_all()
        .with_context(|| format!("Failed to sync {}", path.display()))?;
    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to move output into place: {}", path.display()))?;
    Ok(rows)
}

/// Writes every table in every requested format.
///
/// Failures are collected per (table, format) and never abort the others.
/// BUFR and GRIB are skipped for log-store tables.
pub fn write_tables(
    tables: &[ExportedTable],
    formats: &[ExportFormat],
    options: &WriteOptions,
) -> WriteOutcome {
    let mut outcome = WriteOutcome::default();

    if let Err(e) = fs::create_dir_all(&options.out_dir) {
        let err = anyhow::Error::new(e).context(format!(
            "Failed to create output directory {}",
            options.out_dir.display()
        ));
        for exported in tables {
            for format in formats {
                let target =
                    artifact_file_name(exported.kind, &exported.sources, *format, options.stamp);
                error!("❌ {} {}: {:#}", format.label(), target, err);
                outcome.failures.push(FormatFailure {
                    format: *format,
                    target,
                    kind: ErrorKind::Io,
                    message: format!("{:#}", err),
                });
            }
        }
        return outcome;
    }

    for exported in tables {
        for format in formats {
            let name = artifact_file_name(exported.kind, &exported.sources, *format, options.stamp);

            if format.is_scientific() && exported.origin == TableOrigin::LogStream {
                warn!("⚠️ Skipping {} format for log-store data ({})", format.label(), name);
                outcome.skipped.push((*format, name));
                continue;
            }

            let path = options.out_dir.join(&name);
            match write_artifact(&exported.table, *format, &options.codec, &path) {
                Ok(rows) => {
                    info!("✅ Wrote {} ({} rows) to {}", format.label(), rows, path.display());
                    outcome.artifacts.push(Artifact {
                        path,
                        format: *format,
                        rows,
                    });
                }
                Err(err) => {
                    let kind = classify(&err);
                    error!("❌ Failed to write {} file {}: {:#}", format.label(), name, err);
                    outcome.failures.push(FormatFailure {
                        format: *format,
                        target: name,
                        kind,
                        message: format!("{:#}", err),
                    });
                }
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::types::ArtifactKind;
    use crate::table::{Column, ColumnType, Value};
    use tempfile::TempDir;

    fn options(dir: &Path) -> WriteOptions {
        WriteOptions {
            out_dir: dir.to_path_buf(),
            stamp: None,
            codec: CodecOptions::default(),
        }
    }

    fn exported(columns: Vec<Column>, rows: Vec<Vec<Value>>, origin: TableOrigin) -> ExportedTable {
        ExportedTable {
            kind: ArtifactKind::Separate,
            sources: vec!["s".to_string()],
            table: CanonicalTable::try_new(columns, rows).expect("valid"),
            origin,
        }
    }

    #[test]
    fn test_unsupported_format_fails_alone() {
        let dir = TempDir::new().expect("temp dir");
        let table = exported(
            vec![
                Column::new("timestamp", ColumnType::Integer),
                Column::new("note", ColumnType::Text),
            ],
            vec![vec![Value::Integer(1), Value::Text("x".to_string())]],
            TableOrigin::Sensor,
        );

        let outcome = write_tables(
            &[table],
            &[ExportFormat::Bufr, ExportFormat::Csv],
            &options(dir.path()),
        );

        assert_eq!(outcome.artifacts.len(), 1);
        assert_eq!(outcome.artifacts[0].format, ExportFormat::Csv);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].kind, ErrorKind::UnsupportedFieldType);
        assert!(!dir.path().join("separate_s.bufr").exists());

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(leftovers, vec!["separate_s.csv".to_string()]);
    }

    #[test]
    fn test_scientific_formats_skipped_for_log_tables() {
        let dir = TempDir::new().expect("temp dir");
        let table = exported(
            vec![Column::new("timestamp", ColumnType::Integer)],
            vec![vec![Value::Integer(1)]],
            TableOrigin::LogStream,
        );
        let outcome = write_tables(
            &[table],
            &[ExportFormat::Grib, ExportFormat::Json],
            &options(dir.path()),
        );
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.artifacts.len(), 1);
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn test_output_directory_is_created() {
        let dir = TempDir::new().expect("temp dir");
        let nested = dir.path().join("a").join("b");
        let table = exported(
            vec![Column::new("timestamp", ColumnType::Integer)],
            vec![],
            TableOrigin::Sensor,
        );
        let outcome = write_tables(&[table], &[ExportFormat::Csv], &options(&nested));
        assert_eq!(outcome.artifacts.len(), 1);
        assert!(nested.join("separate_s.csv").exists());
    }
}
