//! Configuration types and CLI options.
//!
//! [`Opt`] is the clap surface of the binary; [`ExportConfig`] is the library
//! configuration it converts into, usable without any CLI dependency.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::{Parser, ValueEnum};

use crate::codec::{CodecOptions, DEFAULT_FLOAT_PRECISION};
use crate::config::constants::{
    DEFAULT_DB_HOST, DEFAULT_DB_NAME, DEFAULT_DB_PORT, DEFAULT_LOKI_LIMIT, DEFAULT_LOKI_STEP,
    DEFAULT_LOKI_URL, DEFAULT_ORDERING_KEY, DEFAULT_OUT_DIR, DEFAULT_SECRETS_DIR,
    DEFAULT_TIMEOUT_SECS,
};
use crate::config::credentials::{CredentialSource, DbCredentials};
use crate::error_handling::ConfigError;
use crate::export::{EngineOptions, ExportFormat, ExportPlan, PlanRequest, WriteOptions};

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted:
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Parses a CLI timestamp as UTC.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]` (also with a `T`
/// separator) and a bare `YYYY-MM-DD` (midnight).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ConfigError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
        .ok_or_else(|| ConfigError::InvalidTimestamp(raw.to_string()))
}

/// Command-line options.
///
/// # Examples
///
/// ```bash
/// # Two sensors merged on their timestamps, as CSV and BUFR
/// sensor_export --sensors temperature,pressure --merge --format csv bufr
///
/// # One file per sensor for the last day
/// sensor_export --sensors temperature,humidity --separate --start-time 2024-06-01
///
/// # Loki logs only
/// sensor_export --loki-query '{job="gateway"}' --format json
/// ```
#[derive(Debug, Parser)]
#[command(
    name = "sensor_export",
    about = "Query and export relational sensor data and Loki logs and metrics."
)]
pub struct Opt {
    /// Comma-separated sensor tables to export
    #[arg(long)]
    pub sensors: Option<String>,

    /// Custom SQL query, exported as a single table (overrides --sensors)
    #[arg(long)]
    pub query: Option<String>,

    /// Merge sensors into one wide table aligned on the ordering key
    #[arg(long)]
    pub merge: bool,

    /// Write one file per sensor
    #[arg(long)]
    pub separate: bool,

    /// Output formats
    #[arg(long, value_enum, num_args = 1.., default_values_t = [ExportFormat::Csv])]
    pub format: Vec<ExportFormat>,

    /// Output directory (created if missing)
    #[arg(long, value_parser, default_value = DEFAULT_OUT_DIR)]
    pub out_dir: PathBuf,

    /// Leave the time component out of file names
    #[arg(long)]
    pub no_timestamp: bool,

    /// Earliest ordering-key value to export (inclusive)
    #[arg(long, value_parser = parse_timestamp)]
    pub start_time: Option<DateTime<Utc>>,

    /// Latest ordering-key value to export (inclusive)
    #[arg(long, value_parser = parse_timestamp)]
    pub end_time: Option<DateTime<Utc>>,

    /// Export at most this many (most recent) rows per sensor
    #[arg(long)]
    pub limit: Option<u32>,

    /// Column sensors are aligned on
    #[arg(long, default_value = DEFAULT_ORDERING_KEY)]
    pub ordering_key: String,

    /// Fail on same-named columns with incompatible types instead of coercing
    #[arg(long)]
    pub strict_types: bool,

    /// Decimal digits kept for float columns in BUFR/GRIB output
    #[arg(long, default_value_t = DEFAULT_FLOAT_PRECISION, value_parser = clap::value_parser!(u8).range(0..=18))]
    pub float_precision: u8,

    /// List the available sensor tables and exit
    #[arg(long)]
    pub list_sensors: bool,

    /// Show the columns of one sensor table and exit
    #[arg(long, value_name = "SENSOR")]
    pub describe: Option<String>,

    /// Database URL (postgres://... or sqlite:...); overrides the connection flags below
    #[arg(long)]
    pub db_url: Option<String>,

    /// PostgreSQL host
    #[arg(long, default_value = DEFAULT_DB_HOST)]
    pub host: String,

    /// PostgreSQL port
    #[arg(long, default_value_t = DEFAULT_DB_PORT)]
    pub port: u16,

    /// PostgreSQL database name
    #[arg(long, default_value = DEFAULT_DB_NAME)]
    pub dbname: String,

    /// Database user (falls back to the secrets directory, then DB_USER)
    #[arg(long)]
    pub user: Option<String>,

    /// Database password (falls back to the secrets directory, then DB_PASSWORD)
    #[arg(long)]
    pub password: Option<String>,

    /// Directory holding db_user.txt and db_password.txt
    #[arg(long, value_parser, default_value = DEFAULT_SECRETS_DIR)]
    pub secrets_dir: PathBuf,

    /// Loki server URL
    #[arg(long, default_value = DEFAULT_LOKI_URL)]
    pub loki_url: String,

    /// LogQL log query to export
    #[arg(long)]
    pub loki_query: Option<String>,

    /// LogQL metric query to export
    #[arg(long)]
    pub loki_metrics: Option<String>,

    /// Show Loki readiness and labels, then exit
    #[arg(long)]
    pub loki_labels: bool,

    /// Maximum log lines for --loki-query
    #[arg(long, default_value_t = DEFAULT_LOKI_LIMIT)]
    pub loki_limit: u32,

    /// Step of --loki-metrics range queries (e.g. 30s, 1m, 1h)
    #[arg(long, default_value = DEFAULT_LOKI_STEP)]
    pub loki_step: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_seconds: u64,

    /// Log level: error|warn|info|debug|trace
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Log format: plain|json
    #[arg(long, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,
}

/// Where the relational store lives.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Full connection URL; wins over the individual fields.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub credentials: DbCredentials,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: DEFAULT_DB_HOST.to_string(),
            port: DEFAULT_DB_PORT,
            dbname: DEFAULT_DB_NAME.to_string(),
            credentials: DbCredentials::default(),
        }
    }
}

/// Library configuration (no CLI dependencies).
///
/// # Examples
///
/// ```no_run
/// use sensor_export::ExportConfig;
///
/// let config = ExportConfig {
///     sensors: vec!["temperature".to_string(), "pressure".to_string()],
///     merge: true,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Sensor tables; entries may themselves be comma-separated.
    pub sensors: Vec<String>,
    pub query: Option<String>,
    pub merge: bool,
    pub separate: bool,
    pub formats: Vec<ExportFormat>,
    pub out_dir: PathBuf,
    /// Put the export time in artifact names.
    pub timestamped: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub ordering_key: String,
    pub strict_types: bool,
    pub float_precision: u8,
    pub database: DatabaseConfig,
    pub loki_url: String,
    pub loki_query: Option<String>,
    pub loki_metrics: Option<String>,
    pub loki_limit: u32,
    pub loki_step: String,
    pub timeout_seconds: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            sensors: Vec::new(),
            query: None,
            merge: false,
            separate: false,
            formats: vec![ExportFormat::Csv],
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            timestamped: true,
            start_time: None,
            end_time: None,
            limit: None,
            ordering_key: DEFAULT_ORDERING_KEY.to_string(),
            strict_types: false,
            float_precision: DEFAULT_FLOAT_PRECISION,
            database: DatabaseConfig::default(),
            loki_url: DEFAULT_LOKI_URL.to_string(),
            loki_query: None,
            loki_metrics: None,
            loki_limit: DEFAULT_LOKI_LIMIT,
            loki_step: DEFAULT_LOKI_STEP.to_string(),
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ExportConfig {
    pub fn plan_request(&self) -> PlanRequest {
        PlanRequest {
            sensors: self.sensors.clone(),
            query: self.query.clone(),
            merge: self.merge,
            separate: self.separate,
            loki_query: self.loki_query.clone(),
            loki_metrics: self.loki_metrics.clone(),
            loki_limit: self.loki_limit,
            loki_step: self.loki_step.clone(),
        }
    }

    /// Resolves what to export; also rejects an inverted time range.
    pub fn plan(&self) -> Result<ExportPlan, ConfigError> {
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start > end {
                return Err(ConfigError::InvalidTimeRange {
                    start: start.to_rfc3339(),
                    end: end.to_rfc3339(),
                });
            }
        }
        ExportPlan::resolve(&self.plan_request())
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            ordering_key: self.ordering_key.clone(),
            strict_types: self.strict_types,
        }
    }

    /// Writer settings for an export started at `started`.
    pub fn write_options(&self, started: DateTime<Utc>) -> WriteOptions {
        WriteOptions {
            out_dir: self.out_dir.clone(),
            stamp: self.timestamped.then_some(started),
            codec: CodecOptions {
                float_precision: self.float_precision,
            },
        }
    }
}

impl From<&Opt> for DatabaseConfig {
    /// Resolves credentials from the flags, then the secrets directory, then the environment.
    fn from(opt: &Opt) -> Self {
        let credentials = DbCredentials::resolve(&[
            CredentialSource::CommandLine {
                user: opt.user.clone(),
                password: opt.password.clone(),
            },
            CredentialSource::SecretFiles(opt.secrets_dir.clone()),
            CredentialSource::Environment,
        ]);
        Self {
            url: opt.db_url.clone(),
            host: opt.host.clone(),
            port: opt.port,
            dbname: opt.dbname.clone(),
            credentials,
        }
    }
}

impl From<&Opt> for ExportConfig {
    fn from(opt: &Opt) -> Self {
        Self {
            sensors: opt.sensors.iter().cloned().collect(),
            query: opt.query.clone(),
            merge: opt.merge,
            separate: opt.separate,
            formats: opt.format.clone(),
            out_dir: opt.out_dir.clone(),
            timestamped: !opt.no_timestamp,
            start_time: opt.start_time,
            end_time: opt.end_time,
            limit: opt.limit,
            ordering_key: opt.ordering_key.clone(),
            strict_types: opt.strict_types,
            float_precision: opt.float_precision,
            database: DatabaseConfig::from(opt),
            loki_url: opt.loki_url.clone(),
            loki_query: opt.loki_query.clone(),
            loki_metrics: opt.loki_metrics.clone(),
            loki_limit: opt.loki_limit,
            loki_step: opt.loki_step.clone(),
            timeout_seconds: opt.timeout_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(
            log::LevelFilter::from(LogLevel::Error),
            log::LevelFilter::Error
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Warn),
            log::LevelFilter::Warn
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Info),
            log::LevelFilter::Info
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Debug),
            log::LevelFilter::Debug
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Trace),
            log::LevelFilter::Trace
        );
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-06-01T12:30:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-06-01T14:30:00+02:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-06-01 12:30:00").unwrap(), expected);
        assert_eq!(parse_timestamp(" 2024-06-01T12:30:00 ").unwrap(), expected);
        assert_eq!(
            parse_timestamp("2024-06-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_timestamp("2024-06-01 12:30:00.250")
                .unwrap()
                .timestamp_subsec_millis(),
            250
        );
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert_eq!(
            parse_timestamp("yesterday"),
            Err(ConfigError::InvalidTimestamp("yesterday".to_string()))
        );
        assert!(parse_timestamp("2024-13-01").is_err());
    }

    #[test]
    fn test_inverted_time_range_is_rejected_before_planning() {
        let config = ExportConfig {
            sensors: vec!["a".to_string()],
            start_time: Some(Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap()),
            end_time: Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        assert!(matches!(
            config.plan(),
            Err(ConfigError::InvalidTimeRange { .. })
        ));
    }

    #[test]
    fn test_write_options_honour_timestamp_flag() {
        let started = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut config = ExportConfig {
            float_precision: 2,
            ..Default::default()
        };
        assert_eq!(config.write_options(started).stamp, Some(started));
        assert_eq!(config.write_options(started).codec.float_precision, 2);
        config.timestamped = false;
        assert_eq!(config.write_options(started).stamp, None);
    }

    #[test]
    fn test_opt_converts_into_export_config() {
        let opt = Opt::parse_from([
            "sensor_export",
            "--sensors",
            "temperature,pressure",
            "--merge",
            "--format",
            "csv",
            "bufr",
            "--no-timestamp",
            "--user",
            "reader",
            "--password",
            "secret",
        ]);
        let config = ExportConfig::from(&opt);
        assert_eq!(config.sensors, vec!["temperature,pressure".to_string()]);
        assert!(config.merge);
        assert_eq!(config.formats, vec![ExportFormat::Csv, ExportFormat::Bufr]);
        assert!(!config.timestamped);
        assert_eq!(config.database.credentials.user.as_deref(), Some("reader"));
        assert_eq!(
            config.database.credentials.password.as_deref(),
            Some("secret")
        );
    }
}
