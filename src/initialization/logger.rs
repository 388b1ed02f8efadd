//! Logger initialization.
//!
//! Plain output is colored and meant for a terminal; JSON output emits one
//! object per record for log shippers.

use std::io::Write;

use colored::*;
use env_logger::fmt::Formatter;
use log::{Level, LevelFilter, Record};

use crate::config::LogFormat;
use crate::error_handling::InitializationError;

/// Dependencies whose debug output drowns the export's own messages.
const QUIET_DEPENDENCIES: &[&str] = &["sqlx", "reqwest", "hyper", "hyper_util", "rustls"];

/// Installs the global logger.
///
/// `RUST_LOG` is read first, then `level` overrides the global filter.
/// Database and HTTP crates never log below `info`.
///
/// # Arguments
///
/// * `level` - Minimum level for this crate and everything not capped
/// * `format` - [`LogFormat::Plain`] or [`LogFormat::Json`]
///
/// # Errors
///
/// Returns `InitializationError::LoggerError` if a logger is already installed.
///
/// # Examples
///
/// ```bash
/// # Debug output for a merge export
/// sensor_export --sensors rain,wind --merge --log-level debug
///
/// # Machine-readable records
/// sensor_export --loki-query '{job="api"}' --log-format json
/// ```
pub fn init_logger_with(level: LevelFilter, format: LogFormat) -> Result<(), InitializationError> {
    colored::control::set_override(true);

    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    for dependency in QUIET_DEPENDENCIES {
        builder.filter_module(dependency, LevelFilter::Info.min(level));
    }
    builder.filter_module(env!("CARGO_PKG_NAME"), level);

    match format {
        LogFormat::Json => builder.format(write_json_record),
        LogFormat::Plain => builder.format(write_plain_record),
    };

    builder.try_init()?;
    Ok(())
}

fn write_json_record(buf: &mut Formatter, record: &Record) -> std::io::Result<()> {
    let line = serde_json::json!({
        "ts": chrono::Utc::now().timestamp_millis(),
        "level": record.level().to_string(),
        "target": record.target(),
        "msg": record.args().to_string(),
    });
    writeln!(buf, "{}", line)
}

fn write_plain_record(buf: &mut Formatter, record: &Record) -> std::io::Result<()> {
    let (marker, level) = match record.level() {
        Level::Error => ("❌", "ERROR".red()),
        Level::Warn => ("⚠️", "WARN".yellow()),
        Level::Info => ("✔️", "INFO".green()),
        Level::Debug => ("🔍", "DEBUG".blue()),
        Level::Trace => ("🔬", "TRACE".purple()),
    };
    writeln!(
        buf,
        "{} {} [{}] {}",
        marker,
        record.target().cyan(),
        level,
        record.args()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    // Only one logger per process; a second install must fail cleanly.
    #[test]
    fn test_init_logger_plain_format() {
        let _ = init_logger_with(LevelFilter::Info, LogFormat::Plain);
        let again = init_logger_with(LevelFilter::Info, LogFormat::Plain);
        assert!(matches!(again, Err(InitializationError::LoggerError(_))));
    }

    #[test]
    fn test_init_logger_json_format() {
        let result = init_logger_with(LevelFilter::Debug, LogFormat::Json);
        if let Err(err) = result {
            assert!(matches!(err, InitializationError::LoggerError(_)));
        }
    }
}
