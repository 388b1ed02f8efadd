//! Error type definitions.
//!
//! This module defines the error types used throughout the application, one
//! enum per layer, plus [`ErrorKind`], the layer-independent taxonomy used in
//! reports and log lines.

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

use crate::table::ColumnType;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),
}

/// Invalid or contradictory options, detected before anything is fetched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Two mutually exclusive export modes were requested together.
    #[error("--{first} and --{second} are mutually exclusive; choose one export mode")]
    ConflictingModes {
        /// First flag seen
        first: &'static str,
        /// Conflicting flag
        second: &'static str,
    },

    /// A mode flag was combined with a custom query, which yields exactly one table.
    #[error("--{flag} cannot be combined with --query; a custom query exports a single table")]
    ModeWithQuery {
        /// The mode flag that was given
        flag: &'static str,
    },

    /// Neither sensors, a query, nor a log-store query was requested.
    #[error("nothing to export: pass --sensors, --query, --loki-query or --loki-metrics")]
    NothingToExport,

    /// Both log and metric queries were requested in one invocation.
    #[error("--loki-query and --loki-metrics are mutually exclusive")]
    ConflictingLokiQueries,

    /// A source name was empty after splitting the sensor list.
    #[error("empty sensor name in --sensors")]
    EmptySourceName,

    /// The same source was listed twice.
    #[error("sensor '{0}' is listed more than once")]
    DuplicateSource(String),

    /// A timestamp argument could not be parsed.
    #[error("invalid timestamp '{0}': expected RFC 3339, 'YYYY-MM-DD HH:MM:SS' or 'YYYY-MM-DD'")]
    InvalidTimestamp(String),

    /// The start of the time range is after its end.
    #[error("--start-time {start} is after --end-time {end}")]
    InvalidTimeRange {
        /// Requested start
        start: String,
        /// Requested end
        end: String,
    },
}

/// Failures of the Export Mode Engine.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Merge-on-key requested but a source lacks the ordering key.
    #[error("source '{source_name}' has no ordering key column '{key}'; merge-on-key export needs it in every source (try --separate)")]
    MissingOrderingKey {
        /// Offending source
        source_name: String,
        /// Declared ordering key
        key: String,
    },

    /// Combined-long requested but the sources share no usable columns.
    #[error("sources [{}] share no common columns besides '{key}' (or lack '{key}' entirely); use --merge or --separate instead", .sources.join(", "))]
    NoCommonColumns {
        /// Sources participating in the export
        sources: Vec<String>,
        /// Declared ordering key
        key: String,
    },

    /// Two sources yield the same `{source}_{column}` name in a wide merge.
    #[error("merged column '{column}' is produced by both source '{first_source}' and source '{second_source}'; rename one of the columns or use --separate")]
    DuplicateOutputColumn {
        /// Clashing output column
        column: String,
        /// Source that claimed the name first
        first_source: String,
        /// Source whose column collides with it
        second_source: String,
    },

    /// Same-named column with incompatible types, escalated by strict mode.
    #[error("type conflict on column '{column}': {detail}")]
    TypeConflict {
        /// Column name
        column: String,
        /// Per-source types
        detail: String,
    },

    /// Structural problem while building an output table.
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Violations of the Canonical Table invariants.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    /// A row has a different number of values than the table has columns.
    #[error("row {row} has {actual} values but the table declares {expected} columns")]
    ArityMismatch {
        /// Row index
        row: usize,
        /// Declared column count
        expected: usize,
        /// Values in the row
        actual: usize,
    },

    /// Two columns share a name.
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),

    /// A value does not match its column's declared type.
    #[error("row {row}, column '{column}': expected {expected}, found {found}")]
    TypeMismatch {
        /// Row index
        row: usize,
        /// Column name
        column: String,
        /// Declared type
        expected: ColumnType,
        /// Type of the offending value
        found: ColumnType,
    },
}

/// Failures of the BUFR/GRIB codec layer.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The column's type has no representation in the format.
    #[error("{format} cannot encode column '{column}' of type {column_type}")]
    UnsupportedFieldType {
        /// Format name
        format: &'static str,
        /// Column name
        column: String,
        /// Column type
        column_type: ColumnType,
    },

    /// Input ended before a complete message was read.
    #[error("{format} input truncated: {context}")]
    Truncated {
        /// Format name
        format: &'static str,
        /// What was being read
        context: String,
    },

    /// Input is not a well-formed message.
    #[error("malformed {format} message: {detail}")]
    Malformed {
        /// Format name
        format: &'static str,
        /// Description
        detail: String,
    },

    /// A value cannot be packed within the format's limits.
    #[error("{format} cannot pack column '{column}': {reason}")]
    ValueOutOfRange {
        /// Format name
        format: &'static str,
        /// Column name
        column: String,
        /// Why
        reason: String,
    },

    /// The table exceeds a structural limit of the format.
    #[error("{format} limit exceeded: {detail}")]
    LimitExceeded {
        /// Format name
        format: &'static str,
        /// Which limit
        detail: String,
    },

    /// The decoded data violates a Canonical Table invariant.
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Error types for relational store operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQL execution error.
    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),

    /// A table or column name is not a plain identifier.
    #[error("invalid identifier '{0}': only letters, digits and '_' are allowed")]
    InvalidIdentifier(String),

    /// The requested source does not exist.
    #[error("unknown sensor table '{0}'")]
    UnknownSource(String),

    /// A column's SQL type has no Canonical Table equivalent.
    #[error("column '{column}' of '{source_name}' has unsupported SQL type {sql_type}")]
    UnsupportedColumnType {
        /// Source name
        source_name: String,
        /// Column name
        column: String,
        /// Database type name
        sql_type: String,
    },

    /// A stored value cannot be read as its column's type.
    #[error("column '{column}' of '{source_name}' holds '{value}', which is not a valid {expected}")]
    InvalidValue {
        /// Source name
        source_name: String,
        /// Column name
        column: String,
        /// The raw value
        value: String,
        /// Expected type
        expected: ColumnType,
    },

    /// The connection URL names no supported backend.
    #[error("unsupported database URL '{0}': expected postgres://, postgresql:// or sqlite:")]
    UnsupportedUrl(String),

    /// The fetched rows could not form a valid table.
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Error types for the Loki HTTP API.
#[derive(Error, Debug)]
pub enum LokiError {
    /// Transport or decoding failure.
    #[error("Loki request failed: {0}")]
    Http(#[from] ReqwestError),

    /// The server answered with a non-success status.
    #[error("Loki returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// The base URL could not be joined with an API path.
    #[error("invalid Loki URL: {0}")]
    Url(#[from] url::ParseError),

    /// The response did not have the expected shape.
    #[error("unexpected Loki response: {0}")]
    Malformed(String),

    /// A timestamp in the response could not be interpreted.
    #[error("invalid Loki timestamp '{0}'")]
    InvalidTimestamp(String),

    /// The converted records could not form a valid table.
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Layer-independent classification of export failures.
///
/// Every error surfaced by an export invocation maps onto one of these kinds,
/// which is what the report and the summary line print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum ErrorKind {
    ConfigurationConflict,
    MissingOrderingKey,
    NoCommonColumns,
    TypeConflict,
    UnsupportedFieldType,
    EmptyResult,
    Fetch,
    Io,
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigurationConflict => "Configuration conflict",
            ErrorKind::MissingOrderingKey => "Missing ordering key",
            ErrorKind::NoCommonColumns => "No common columns",
            ErrorKind::TypeConflict => "Type conflict",
            ErrorKind::UnsupportedFieldType => "Unsupported field type",
            ErrorKind::EmptyResult => "Empty result",
            ErrorKind::Fetch => "Fetch failure",
            ErrorKind::Io => "I/O failure",
            ErrorKind::Other => "Other failure",
        }
    }

    /// Whether this kind aborts the export (or the affected format).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ErrorKind::EmptyResult | ErrorKind::TypeConflict)
    }
}

impl ExportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExportError::MissingOrderingKey { .. } => ErrorKind::MissingOrderingKey,
            ExportError::NoCommonColumns { .. } => ErrorKind::NoCommonColumns,
            ExportError::TypeConflict { .. } => ErrorKind::TypeConflict,
            ExportError::DuplicateOutputColumn { .. } | ExportError::Table(_) => ErrorKind::Other,
        }
    }
}

impl CodecError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CodecError::UnsupportedFieldType { .. } => ErrorKind::UnsupportedFieldType,
            _ => ErrorKind::Other,
        }
    }

    pub(crate) fn malformed(format: &'static str, detail: impl Into<String>) -> Self {
        CodecError::Malformed {
            format,
            detail: detail.into(),
        }
    }

    pub(crate) fn truncated(format: &'static str, context: impl Into<String>) -> Self {
        CodecError::Truncated {
            format,
            context: context.into(),
        }
    }

    pub(crate) fn limit(format: &'static str, detail: impl Into<String>) -> Self {
        CodecError::LimitExceeded {
            format,
            detail: detail.into(),
        }
    }
}

/// Classifies an error chain produced by the run pipeline.
///
/// Walks the `anyhow` chain and returns the kind of the first typed error found.
pub fn classify(err: &anyhow::Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<ExportError>() {
            return e.kind();
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return ErrorKind::ConfigurationConflict;
        }
        if let Some(e) = cause.downcast_ref::<CodecError>() {
            return e.kind();
        }
        if cause.downcast_ref::<DatabaseError>().is_some()
            || cause.downcast_ref::<LokiError>().is_some()
        {
            return ErrorKind::Fetch;
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return ErrorKind::Io;
        }
    }
    ErrorKind::Other
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_all_error_kinds_have_string_representation() {
        for kind in ErrorKind::iter() {
            assert!(!kind.as_str().is_empty(), "{:?} should have a label", kind);
        }
    }

    #[test]
    fn test_empty_result_and_type_conflict_are_not_fatal() {
        assert!(!ErrorKind::EmptyResult.is_fatal());
        assert!(!ErrorKind::TypeConflict.is_fatal());
        assert!(ErrorKind::NoCommonColumns.is_fatal());
        assert!(ErrorKind::UnsupportedFieldType.is_fatal());
    }

    #[test]
    fn test_missing_ordering_key_names_source() {
        let err = ExportError::MissingOrderingKey {
            source_name: "pressure".to_string(),
            key: "timestamp".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("pressure"));
        assert!(msg.contains("timestamp"));
        assert_eq!(err.kind(), ErrorKind::MissingOrderingKey);
    }

    #[test]
    fn test_no_common_columns_suggests_alternatives() {
        let err = ExportError::NoCommonColumns {
            sources: vec!["a".to_string(), "b".to_string()],
            key: "timestamp".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("a, b"));
        assert!(msg.contains("--merge"));
        assert!(msg.contains("--separate"));
    }

    #[test]
    fn test_classify_walks_context_chain() {
        let err = anyhow::Error::new(CodecError::UnsupportedFieldType {
            format: "BUFR",
            column: "status".to_string(),
            column_type: ColumnType::Text,
        })
        .context("Failed to write BUFR file");
        assert_eq!(classify(&err), ErrorKind::UnsupportedFieldType);

        let err = anyhow::Error::new(ConfigError::NothingToExport).context("resolving plan");
        assert_eq!(classify(&err), ErrorKind::ConfigurationConflict);

        let err = anyhow::anyhow!("something else");
        assert_eq!(classify(&err), ErrorKind::Other);
    }
}
