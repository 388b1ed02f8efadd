//! Export types and options.

use clap::ValueEnum;
use strum_macros::EnumIter as EnumIterMacro;

use crate::table::{CanonicalTable, TableOrigin, TabularSource};

/// Output file formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, EnumIterMacro)]
pub enum ExportFormat {
    /// Comma-separated values with a header row
    Csv,
    /// Line-delimited JSON, one object per row
    Json,
    /// Spreadsheet (.xlsx), one worksheet
    Excel,
    /// WMO BUFR edition 4 coded messages (sensor data only)
    Bufr,
    /// WMO GRIB edition 2 gridded fields (sensor data only)
    Grib,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "jsonl",
            ExportFormat::Excel => "xlsx",
            ExportFormat::Bufr => "bufr",
            ExportFormat::Grib => "grib2",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "CSV",
            ExportFormat::Json => "JSON",
            ExportFormat::Excel => "Excel",
            ExportFormat::Bufr => "BUFR",
            ExportFormat::Grib => "GRIB",
        }
    }

    /// Binary scientific formats, which only apply to sensor tables.
    pub fn is_scientific(&self) -> bool {
        matches!(self, ExportFormat::Bufr | ExportFormat::Grib)
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// What produced a table; the first component of its artifact names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Merged,
    Separate,
    Combined,
    Query,
    LokiLogs,
    LokiMetrics,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Merged => "merged",
            ArtifactKind::Separate => "separate",
            ArtifactKind::Combined => "combined",
            ArtifactKind::Query => "query",
            ArtifactKind::LokiLogs => "loki_logs",
            ArtifactKind::LokiMetrics => "loki_metrics",
        }
    }
}

/// A Canonical Table ready for serialization, with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedTable {
    pub kind: ArtifactKind,
    /// Contributing source names, used for artifact naming.
    pub sources: Vec<String>,
    pub table: CanonicalTable,
    pub origin: TableOrigin,
}

impl ExportedTable {
    /// Wraps a fetched source unchanged.
    pub fn passthrough(kind: ArtifactKind, source: TabularSource) -> Self {
        let origin = source.origin();
        let sources = match kind {
            ArtifactKind::Query | ArtifactKind::LokiLogs | ArtifactKind::LokiMetrics => Vec::new(),
            _ => vec![source.name().to_string()],
        };
        Self {
            kind,
            sources,
            table: source.into_table(),
            origin,
        }
    }
}
